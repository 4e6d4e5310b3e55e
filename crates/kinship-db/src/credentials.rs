//! Web credentials, set from the in-world channel and checked by the session
//! registry when a web client authenticates.

use chrono::Utc;
use kinship_common::auth::{hash_password, verify_password, CredentialVerifier, Credentials};
use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::{Identity, WebCredential};
use kinship_common::validation::validate_password;
use uuid::Uuid;

use crate::codec::{from_document, to_document};
use crate::collections::WEB_CREDENTIALS;
use crate::document::{DocumentStore, Filter, FindOptions};
use crate::Database;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    db: Database,
}

impl CredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Set or replace the web password for `player`. Login names are unique:
    /// a credential left under the same name by another identity (after a
    /// rename in the world) is dropped.
    pub async fn set_password(&self, player: &Identity, password: &str) -> KinshipResult<()> {
        validate_password(password)?;

        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| KinshipError::Internal(e.into()))?
            .map_err(|e| KinshipError::Internal(anyhow::anyhow!("password hashing failed: {e}")))?;

        let record = WebCredential {
            player_id: player.id,
            player_name: player.name.clone(),
            password_hash,
            updated_at: Utc::now(),
        };
        let doc = to_document(&record)?;
        let stale = self
            .db
            .delete_many(
                WEB_CREDENTIALS,
                &Filter::new().eq_ignore_case("playerName", &player.name),
            )
            .await?;
        if stale > 0 {
            tracing::debug!(player = %player.id, stale, "Replaced credentials held under the same name");
        }

        let filter = Filter::new().eq("playerUUID", player.id.to_string());
        if !self.db.update_one(WEB_CREDENTIALS, &filter, doc.clone()).await?
            && !self
                .db
                .insert_unique(WEB_CREDENTIALS, &player.id.to_string(), doc.clone())
                .await?
        {
            self.db.update_one(WEB_CREDENTIALS, &filter, doc).await?;
        }

        tracing::info!(player = %player.id, "Web password updated");
        Ok(())
    }

    /// Turn web access off for `player`. Returns whether a password was set.
    pub async fn remove_password(&self, player: Uuid) -> KinshipResult<bool> {
        let removed = self
            .db
            .delete_many(
                WEB_CREDENTIALS,
                &Filter::new().eq("playerUUID", player.to_string()),
            )
            .await?;
        if removed > 0 {
            tracing::info!(player = %player, "Web password removed");
        }
        Ok(removed > 0)
    }
}

impl CredentialVerifier for CredentialStore {
    async fn verify(&self, credentials: &Credentials) -> KinshipResult<Option<Identity>> {
        let filter = Filter::new().eq_ignore_case("playerName", &credentials.username);
        let mut docs = self
            .db
            .find(WEB_CREDENTIALS, &filter, FindOptions::default().limit(2))
            .await?;
        if docs.len() > 1 {
            tracing::warn!(username = %credentials.username, "Login name is held by more than one identity");
            return Ok(None);
        }
        let Some(doc) = docs.pop() else {
            return Ok(None);
        };
        let record: WebCredential = from_document(doc)?;

        let password = credentials.password.clone();
        let hash = record.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| KinshipError::Internal(e.into()))?
            .unwrap_or_else(|e| {
                tracing::warn!(player = %record.player_id, error = %e, "Stored password hash is unreadable");
                false
            });

        Ok(valid.then(|| Identity::new(record.player_id, record.player_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn set_then_verify() {
        let store = CredentialStore::new(Database::memory());
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        store.set_password(&alex, "hunter22").await.unwrap();

        assert_eq!(store.verify(&creds("alex", "hunter22")).await.unwrap(), Some(alex.clone()));
        assert_eq!(store.verify(&creds("Alex", "wrong")).await.unwrap(), None);
        assert_eq!(store.verify(&creds("Blair", "hunter22")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn changing_password_replaces_the_old_one() {
        let store = CredentialStore::new(Database::memory());
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        store.set_password(&alex, "first").await.unwrap();
        store.set_password(&alex, "second").await.unwrap();
        assert!(store.verify(&creds("Alex", "first")).await.unwrap().is_none());
        assert!(store.verify(&creds("Alex", "second")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn short_password_is_rejected() {
        let store = CredentialStore::new(Database::memory());
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        assert!(store.set_password(&alex, "abc").await.is_err());
    }

    #[tokio::test]
    async fn removing_the_password_disables_login() {
        let store = CredentialStore::new(Database::memory());
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        store.set_password(&alex, "hunter22").await.unwrap();

        assert!(store.remove_password(alex.id).await.unwrap());
        assert!(store.verify(&creds("Alex", "hunter22")).await.unwrap().is_none());
        assert!(!store.remove_password(alex.id).await.unwrap());
    }

    #[tokio::test]
    async fn a_name_logs_in_as_its_latest_holder() {
        let store = CredentialStore::new(Database::memory());
        let old = Identity::new(Uuid::new_v4(), "Alex");
        let new = Identity::new(Uuid::new_v4(), "alex");
        store.set_password(&old, "oldpass").await.unwrap();
        store.set_password(&new, "newpass").await.unwrap();

        assert!(store.verify(&creds("Alex", "oldpass")).await.unwrap().is_none());
        assert_eq!(store.verify(&creds("ALEX", "newpass")).await.unwrap(), Some(new));
    }
}
