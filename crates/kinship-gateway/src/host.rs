//! The world host's side of the world channel.
//!
//! The host owns player presence: it reports joins and leaves, runs commands
//! on behalf of players standing in the world, and collects the lines the
//! world loop delivered to them.

use std::sync::Arc;

use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::Identity;
use serde_json::Value;
use uuid::Uuid;

use crate::commands::{Command, Origin};
use crate::router::Router;
use crate::world::{LocalRoster, WorldLine};

#[derive(Clone)]
pub struct WorldHost {
    router: Arc<Router>,
    roster: LocalRoster,
}

impl WorldHost {
    /// `roster` must be the one the running [`crate::LocalWorld`] reads.
    pub fn new(router: Arc<Router>, roster: LocalRoster) -> Self {
        Self { router, roster }
    }

    pub async fn join(&self, player: &Identity) -> KinshipResult<()> {
        self.roster.join(player.id);
        self.router.world_join(player).await?;
        tracing::info!(player = %player.id, name = %player.name, "Joined the world");
        Ok(())
    }

    /// Returns whether the player was in the world.
    pub async fn leave(&self, player: Uuid) -> KinshipResult<bool> {
        let was_present = self.roster.is_present(player);
        self.roster.leave(player);
        if let Some(identity) = self.router.players().find_by_id(player).await? {
            self.router.world_leave(&identity).await?;
        }
        Ok(was_present)
    }

    /// Run `command` as `player`, who must be in the world.
    pub async fn command(&self, player: Uuid, command: Command) -> KinshipResult<Value> {
        let identity = self.present(player).await?;
        self.router.execute(&Origin::World(identity), command).await
    }

    /// Lines waiting for `player`, oldest first. Taking them clears them.
    pub fn take_lines(&self, player: Uuid) -> Vec<WorldLine> {
        self.roster.take_lines(player)
    }

    async fn present(&self, player: Uuid) -> KinshipResult<Identity> {
        if !self.roster.is_present(player) {
            return Err(KinshipError::forbidden("Player is not in the world"));
        }
        self.router
            .players()
            .find_by_id(player)
            .await?
            .ok_or_else(|| KinshipError::not_found(format!("Player '{player}'")))
    }
}
