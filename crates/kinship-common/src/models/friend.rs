//! Friend requests and friendship edges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Identity;

/// A one-directional pending friend offer. Resolution deletes the record,
/// so `pending` is the only status ever persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    #[serde(rename = "senderUUID")]
    pub sender_id: Uuid,
    #[serde(rename = "senderName")]
    pub sender_name: String,
    #[serde(rename = "targetUUID")]
    pub target_id: Uuid,
    #[serde(rename = "targetName")]
    pub target_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub status: RequestStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
}

impl FriendRequest {
    pub fn new(sender: &Identity, target: &Identity) -> Self {
        Self {
            sender_id: sender.id,
            sender_name: sender.name.clone(),
            target_id: target.id,
            target_name: target.name.clone(),
            timestamp: Utc::now(),
            status: RequestStatus::Pending,
        }
    }

    pub fn sender(&self) -> Identity {
        Identity::new(self.sender_id, self.sender_name.clone())
    }

    pub fn target(&self) -> Identity {
        Identity::new(self.target_id, self.target_name.clone())
    }
}

/// One directed friendship edge. Two edges (A→B, B→A) make one friendship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    #[serde(rename = "playerUUID")]
    pub owner_id: Uuid,
    #[serde(rename = "playerName")]
    pub owner_name: String,
    #[serde(rename = "friendUUID")]
    pub friend_id: Uuid,
    #[serde(rename = "friendName")]
    pub friend_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Friendship {
    /// Both edges of a new friendship, sharing one timestamp.
    pub fn pair(a: &Identity, b: &Identity) -> (Self, Self) {
        let now = Utc::now();
        let edge = |owner: &Identity, friend: &Identity| Self {
            owner_id: owner.id,
            owner_name: owner.name.clone(),
            friend_id: friend.id,
            friend_name: friend.name.clone(),
            timestamp: now,
        };
        (edge(a, b), edge(b, a))
    }

    pub fn friend(&self) -> Identity {
        Identity::new(self.friend_id, self.friend_name.clone())
    }
}

/// A friend as shown to a client, with live presence attached.
#[derive(Debug, Clone, Serialize)]
pub struct FriendView {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub since: DateTime<Utc>,
    pub online: bool,
}
