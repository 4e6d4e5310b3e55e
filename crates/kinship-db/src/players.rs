//! Player directory: last known name per identity.

use chrono::Utc;
use kinship_common::error::KinshipResult;
use kinship_common::models::{Identity, PlayerRecord, PlayerRef};
use uuid::Uuid;

use crate::codec::{from_document, to_document};
use crate::collections::PLAYERS;
use crate::document::{DocumentStore, Filter};
use crate::Database;

#[derive(Debug, Clone)]
pub struct PlayerDirectory {
    db: Database,
}

impl PlayerDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record or refresh an identity's name.
    pub async fn remember(&self, player: &Identity) -> KinshipResult<()> {
        let record = PlayerRecord {
            id: player.id,
            name: player.name.clone(),
            last_seen: Utc::now(),
        };
        let doc = to_document(&record)?;
        let filter = Filter::new().eq("playerUUID", player.id.to_string());
        if !self.db.update_one(PLAYERS, &filter, doc.clone()).await? {
            let inserted = self
                .db
                .insert_unique(PLAYERS, &player.id.to_string(), doc.clone())
                .await?;
            // Lost a race with another first sighting; refresh the winner.
            if !inserted {
                self.db.update_one(PLAYERS, &filter, doc).await?;
            }
        }
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> KinshipResult<Option<Identity>> {
        self.lookup(Filter::new().eq("playerUUID", id.to_string())).await
    }

    /// Case-insensitive name lookup.
    pub async fn find_by_name(&self, name: &str) -> KinshipResult<Option<Identity>> {
        self.lookup(Filter::new().eq_ignore_case("playerName", name)).await
    }

    pub async fn resolve(&self, player: &PlayerRef) -> KinshipResult<Option<Identity>> {
        match player {
            PlayerRef::Id(id) => self.find_by_id(*id).await,
            PlayerRef::Name(name) => self.find_by_name(name).await,
        }
    }

    async fn lookup(&self, filter: Filter) -> KinshipResult<Option<Identity>> {
        match self.db.find_one(PLAYERS, &filter).await? {
            Some(doc) => Ok(Some(from_document::<PlayerRecord>(doc)?.identity())),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remember_then_resolve_by_either_ref() {
        let players = PlayerDirectory::new(Database::memory());
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        players.remember(&alex).await.unwrap();

        assert_eq!(players.resolve(&PlayerRef::Id(alex.id)).await.unwrap(), Some(alex.clone()));
        assert_eq!(players.resolve(&"alex".into()).await.unwrap(), Some(alex.clone()));
        assert_eq!(players.find_by_name("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rename_replaces_the_record() {
        let players = PlayerDirectory::new(Database::memory());
        let id = Uuid::new_v4();
        players.remember(&Identity::new(id, "Old")).await.unwrap();
        players.remember(&Identity::new(id, "New")).await.unwrap();
        assert_eq!(players.find_by_id(id).await.unwrap().unwrap().name, "New");
        assert!(players.find_by_name("old").await.unwrap().is_none());
    }
}
