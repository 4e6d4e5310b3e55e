//! Member model: one identity's membership in one group, and the role ladder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Identity;

/// Ordered permission tier. Higher priority acts on lower, never on equal or higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    #[serde(alias = "owner")]
    Owner,
    #[serde(alias = "admin")]
    Admin,
    #[serde(alias = "moderator")]
    Moderator,
    #[serde(alias = "member")]
    Member,
}

impl GroupRole {
    pub const fn priority(self) -> u8 {
        match self {
            Self::Owner => 100,
            Self::Admin => 75,
            Self::Moderator => 50,
            Self::Member => 25,
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Admin => "Admin",
            Self::Moderator => "Moderator",
            Self::Member => "Member",
        }
    }

    pub fn can_manage_group(self) -> bool {
        self.priority() >= Self::Admin.priority()
    }

    /// Whether this role meets a required minimum.
    pub fn at_least(self, required: GroupRole) -> bool {
        self.priority() >= required.priority()
    }

    /// Whether this role may act on a member holding `target`.
    pub fn outranks(self, target: GroupRole) -> bool {
        self.priority() > target.priority()
    }

    /// Next role up, never reaching `Owner` (ownership is not transferable by promotion).
    pub fn promoted(self) -> Option<GroupRole> {
        match self {
            Self::Member => Some(Self::Moderator),
            Self::Moderator => Some(Self::Admin),
            Self::Admin | Self::Owner => None,
        }
    }

    pub fn demoted(self) -> Option<GroupRole> {
        match self {
            Self::Admin => Some(Self::Moderator),
            Self::Moderator => Some(Self::Member),
            Self::Member | Self::Owner => None,
        }
    }
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for GroupRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "member" => Ok(Self::Member),
            other => Err(format!("unknown group role '{other}'")),
        }
    }
}

/// A member entry embedded in its group document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    #[serde(rename = "playerId")]
    pub player_id: Uuid,
    #[serde(rename = "playerName")]
    pub player_name: String,
    pub role: GroupRole,
    #[serde(rename = "joinedDate", with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    /// Posting is suppressed until this instant.
    #[serde(
        rename = "muteUntil",
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub mute_until: Option<DateTime<Utc>>,
    /// Derived from live presence; never persisted.
    #[serde(skip)]
    pub online: bool,
}

impl GroupMember {
    pub fn new(player: &Identity, role: GroupRole) -> Self {
        Self {
            player_id: player.id,
            player_name: player.name.clone(),
            role,
            joined_at: Utc::now(),
            mute_until: None,
            online: false,
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.player_id, self.player_name.clone())
    }

    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        self.mute_until.is_some_and(|until| until > now)
    }
}

/// A member as shown to clients, with presence filled in.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: Uuid,
    pub name: String,
    pub role: GroupRole,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    pub muted: bool,
    pub online: bool,
}

impl From<&GroupMember> for MemberView {
    fn from(m: &GroupMember) -> Self {
        Self {
            id: m.player_id,
            name: m.player_name.clone(),
            role: m.role,
            joined_at: m.joined_at,
            muted: m.is_muted_at(Utc::now()),
            online: m.online,
        }
    }
}
