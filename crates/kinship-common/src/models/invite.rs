//! Group invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Group, Identity};

/// An offer for one identity to join one group.
///
/// At most one pending invite exists per (group, invitee). Resolution deletes
/// the record; the status is only reported back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInvite {
    #[serde(rename = "inviteId")]
    pub id: Uuid,
    #[serde(rename = "groupId")]
    pub group_id: Uuid,
    #[serde(rename = "groupName")]
    pub group_name: String,
    #[serde(rename = "inviterId")]
    pub inviter_id: Uuid,
    #[serde(rename = "inviterName")]
    pub inviter_name: String,
    #[serde(rename = "targetId")]
    pub target_id: Uuid,
    #[serde(rename = "targetName")]
    pub target_name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub status: InviteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
}

impl GroupInvite {
    pub fn new(group: &Group, inviter: &Identity, target: &Identity) -> Self {
        Self {
            id: crate::snowflake::generate_id(),
            group_id: group.id,
            group_name: group.name.clone(),
            inviter_id: inviter.id,
            inviter_name: inviter.name.clone(),
            target_id: target.id,
            target_name: target.name.clone(),
            timestamp: Utc::now(),
            status: InviteStatus::Pending,
        }
    }

    pub fn target(&self) -> Identity {
        Identity::new(self.target_id, self.target_name.clone())
    }

    pub fn inviter(&self) -> Identity {
        Identity::new(self.inviter_id, self.inviter_name.clone())
    }
}
