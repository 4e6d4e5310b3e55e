//! Player directory and web login credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Identity;

/// Last known name for an identity, used to resolve name-based commands
/// against players who are currently offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "playerUUID")]
    pub id: Uuid,
    #[serde(rename = "playerName")]
    pub name: String,
    #[serde(rename = "lastSeen", with = "chrono::serde::ts_milliseconds")]
    pub last_seen: DateTime<Utc>,
}

impl PlayerRecord {
    pub fn identity(&self) -> Identity {
        Identity::new(self.id, self.name.clone())
    }
}

/// Argon2 password hash a player set from inside the world for web login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebCredential {
    #[serde(rename = "playerUUID")]
    pub player_id: Uuid,
    #[serde(rename = "playerName")]
    pub player_name: String,
    #[serde(rename = "passwordHash")]
    pub password_hash: String,
    #[serde(rename = "updatedAt", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}
