//! Group model: the named community container.
//!
//! Members, bans and settings are embedded in the group document; a mutation
//! rewrites the affected field as a whole, serialized per group by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{GroupMember, GroupRole, Identity};

/// A Kinship group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "groupId")]
    pub id: Uuid,

    #[serde(rename = "groupName")]
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "ownerId")]
    pub owner_id: Uuid,

    #[serde(rename = "ownerName")]
    pub owner_name: String,

    #[serde(rename = "createdDate", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Capacity; `members.len()` never exceeds it.
    #[serde(rename = "maxMembers")]
    pub max_members: u32,

    #[serde(rename = "isPrivate", default)]
    pub private: bool,

    #[serde(default)]
    pub settings: GroupSettings,

    pub members: Vec<GroupMember>,

    /// Direct-join code, if one has been generated.
    #[serde(rename = "inviteCode", default, skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,

    #[serde(rename = "bannedMembers", default)]
    pub banned: Vec<BanRecord>,
}

impl Group {
    pub fn new(
        owner: &Identity,
        name: &str,
        description: &str,
        max_members: u32,
        private: bool,
    ) -> Self {
        Self {
            id: crate::snowflake::generate_id(),
            name: name.to_string(),
            description: description.to_string(),
            owner_id: owner.id,
            owner_name: owner.name.clone(),
            created_at: Utc::now(),
            max_members,
            private,
            settings: GroupSettings::default(),
            members: vec![GroupMember::new(owner, GroupRole::Owner)],
            invite_code: None,
            banned: Vec::new(),
        }
    }

    pub fn member(&self, player_id: Uuid) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.player_id == player_id)
    }

    pub fn member_mut(&mut self, player_id: Uuid) -> Option<&mut GroupMember> {
        self.members.iter_mut().find(|m| m.player_id == player_id)
    }

    pub fn is_member(&self, player_id: Uuid) -> bool {
        self.member(player_id).is_some()
    }

    pub fn is_owner(&self, player_id: Uuid) -> bool {
        self.owner_id == player_id
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_members as usize
    }

    pub fn is_banned(&self, player_id: Uuid) -> bool {
        self.banned.iter().any(|b| b.player_id == player_id)
    }

    pub fn member_ids(&self) -> Vec<Uuid> {
        self.members.iter().map(|m| m.player_id).collect()
    }
}

/// Per-group behaviour switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GroupSettings {
    /// When off, only admins and the owner may invite.
    #[serde(rename = "allowInvites")]
    pub allow_invites: bool,
    /// When on, members may only invite their own friends.
    #[serde(rename = "friendsOnly")]
    pub friends_only: bool,
    /// When off, messages are delivered but not kept in history.
    #[serde(rename = "logMessages")]
    pub log_messages: bool,
    /// When off, web sessions neither receive nor post group messages.
    #[serde(rename = "webAccessEnabled")]
    pub web_access_enabled: bool,
    #[serde(rename = "joinMessage")]
    pub join_message: String,
    #[serde(rename = "leaveMessage")]
    pub leave_message: String,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            allow_invites: true,
            friends_only: false,
            log_messages: true,
            web_access_enabled: true,
            join_message: "Welcome to the group!".to_string(),
            leave_message: "Thanks for being part of the group!".to_string(),
        }
    }
}

/// Partial update of [`GroupSettings`]; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SettingsPatch {
    pub allow_invites: Option<bool>,
    pub friends_only: Option<bool>,
    pub log_messages: Option<bool>,
    pub web_access_enabled: Option<bool>,
    #[validate(length(max = 120))]
    pub join_message: Option<String>,
    #[validate(length(max = 120))]
    pub leave_message: Option<String>,
    pub private: Option<bool>,
    #[validate(length(max = 200))]
    pub description: Option<String>,
}

impl SettingsPatch {
    pub fn apply(self, group: &mut Group) {
        let s = &mut group.settings;
        if let Some(v) = self.allow_invites {
            s.allow_invites = v;
        }
        if let Some(v) = self.friends_only {
            s.friends_only = v;
        }
        if let Some(v) = self.log_messages {
            s.log_messages = v;
        }
        if let Some(v) = self.web_access_enabled {
            s.web_access_enabled = v;
        }
        if let Some(v) = self.join_message {
            s.join_message = v;
        }
        if let Some(v) = self.leave_message {
            s.leave_message = v;
        }
        if let Some(v) = self.private {
            group.private = v;
        }
        if let Some(v) = self.description {
            group.description = v;
        }
    }
}

/// A ban entry embedded in its group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanRecord {
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    #[serde(rename = "playerName", default)]
    pub player_name: String,
    #[serde(rename = "bannedBy")]
    pub banned_by: Uuid,
    #[serde(rename = "bannedAt", with = "chrono::serde::ts_milliseconds")]
    pub banned_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 3, max = 32, message = "Group name must be 3-32 characters"))]
    pub name: String,

    #[validate(length(max = 200, message = "Description can be at most 200 characters"))]
    #[serde(default)]
    pub description: Option<String>,

    /// Capacity; defaults to the configured group size.
    #[serde(default)]
    pub max_members: Option<u32>,

    #[serde(default)]
    pub private: Option<bool>,
}

/// Group as listed to clients (no member roster).
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub member_count: usize,
    pub max_members: u32,
    pub private: bool,
}

impl From<&Group> for GroupSummary {
    fn from(g: &Group) -> Self {
        Self {
            id: g.id,
            name: g.name.clone(),
            description: g.description.clone(),
            owner: g.owner_name.clone(),
            member_count: g.members.len(),
            max_members: g.max_members,
            private: g.private,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_group_has_owner_as_only_member() {
        let owner = Identity::new(Uuid::new_v4(), "Alex");
        let group = Group::new(&owner, "Squad", "", 2, false);
        assert_eq!(group.members.len(), 1);
        assert_eq!(group.members[0].role, GroupRole::Owner);
        assert!(group.is_owner(owner.id));
        assert!(!group.is_full());
    }

    #[test]
    fn settings_default_when_missing() {
        let owner = Identity::new(Uuid::new_v4(), "Alex");
        let mut doc = serde_json::to_value(Group::new(&owner, "Squad", "", 2, false)).unwrap();
        doc.as_object_mut().unwrap().remove("settings");
        let group: Group = serde_json::from_value(doc).unwrap();
        assert_eq!(group.settings, GroupSettings::default());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let owner = Identity::new(Uuid::new_v4(), "Alex");
        let mut group = Group::new(&owner, "Squad", "old", 2, false);
        SettingsPatch {
            web_access_enabled: Some(false),
            description: Some("new".into()),
            ..Default::default()
        }
        .apply(&mut group);
        assert!(!group.settings.web_access_enabled);
        assert!(group.settings.allow_invites);
        assert_eq!(group.description, "new");
    }
}
