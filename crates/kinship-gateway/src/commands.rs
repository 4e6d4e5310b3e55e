//! Commands accepted by the router from either channel.
//!
//! On the wire a command is `{"type": "...", "data": {...}}`; commands
//! without arguments may omit `data`.

use kinship_common::models::{CreateGroupRequest, GroupRef, Identity, PlayerRef, SettingsPatch};
use serde::Deserialize;
use uuid::Uuid;

/// Where a command came from.
#[derive(Debug, Clone)]
pub enum Origin {
    /// The in-world client; the host vouches for the identity.
    World(Identity),
    /// A web session; the identity is whatever the session authenticated as.
    Web { session_id: String },
}

impl Origin {
    pub fn web(session_id: impl Into<String>) -> Self {
        Self::Web {
            session_id: session_id.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Command {
    // === Friends ===
    FriendRequest {
        player: PlayerRef,
    },
    FriendAccept {
        player: PlayerRef,
    },
    FriendDeny {
        player: PlayerRef,
    },
    FriendCancel {
        player: PlayerRef,
    },
    FriendRemove {
        player: PlayerRef,
    },
    FriendMessage {
        player: PlayerRef,
        message: String,
    },
    GetFriends,
    GetFriendRequests,

    // === Group lifecycle and invites ===
    GroupCreate(CreateGroupRequest),
    GroupInvite {
        group: GroupRef,
        player: PlayerRef,
    },
    GroupInviteAccept {
        #[serde(default)]
        invite_id: Option<Uuid>,
        #[serde(default)]
        group: Option<GroupRef>,
    },
    GroupInviteReject {
        #[serde(default)]
        invite_id: Option<Uuid>,
        #[serde(default)]
        group: Option<GroupRef>,
    },
    GetGroupInvites,
    GroupJoinCode {
        code: String,
    },
    GroupInviteCode {
        group: GroupRef,
    },
    GroupLeave {
        group: GroupRef,
    },

    // === Moderation ===
    GroupKick {
        group: GroupRef,
        player: PlayerRef,
        #[serde(default)]
        reason: Option<String>,
    },
    GroupBan {
        group: GroupRef,
        player: PlayerRef,
        #[serde(default)]
        reason: Option<String>,
    },
    GroupUnban {
        group: GroupRef,
        player: PlayerRef,
    },
    GroupMute {
        group: GroupRef,
        player: PlayerRef,
        /// Defaults to an hour.
        #[serde(default)]
        minutes: Option<u32>,
    },
    GroupUnmute {
        group: GroupRef,
        player: PlayerRef,
    },
    GroupPromote {
        group: GroupRef,
        player: PlayerRef,
    },
    GroupDemote {
        group: GroupRef,
        player: PlayerRef,
    },
    GroupSettings {
        group: GroupRef,
        settings: SettingsPatch,
    },

    // === Group chat ===
    GroupMessage {
        group: GroupRef,
        message: String,
    },
    GroupMessageEdit {
        message_id: Uuid,
        message: String,
    },
    GroupReact {
        message_id: Uuid,
        emoji: String,
    },
    GroupAnnounce {
        group: GroupRef,
        message: String,
    },

    // === Queries ===
    GetGroups,
    GetGroup {
        group: GroupRef,
    },
    GetGroupMembers {
        group: GroupRef,
    },
    GetGroupMessages {
        group: GroupRef,
        #[serde(default)]
        limit: Option<u32>,
    },
    GroupSearch {
        #[serde(default)]
        query: String,
        #[serde(default)]
        limit: Option<u32>,
    },

    // === Account ===
    /// In-world only.
    SetWebPassword {
        password: String,
    },
    /// In-world only. Also closes the player's web sessions.
    RemoveWebPassword,
}

impl Command {
    /// Wire name, used for replies and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FriendRequest { .. } => "friend_request",
            Self::FriendAccept { .. } => "friend_accept",
            Self::FriendDeny { .. } => "friend_deny",
            Self::FriendCancel { .. } => "friend_cancel",
            Self::FriendRemove { .. } => "friend_remove",
            Self::FriendMessage { .. } => "friend_message",
            Self::GetFriends => "get_friends",
            Self::GetFriendRequests => "get_friend_requests",
            Self::GroupCreate(_) => "group_create",
            Self::GroupInvite { .. } => "group_invite",
            Self::GroupInviteAccept { .. } => "group_invite_accept",
            Self::GroupInviteReject { .. } => "group_invite_reject",
            Self::GetGroupInvites => "get_group_invites",
            Self::GroupJoinCode { .. } => "group_join_code",
            Self::GroupInviteCode { .. } => "group_invite_code",
            Self::GroupLeave { .. } => "group_leave",
            Self::GroupKick { .. } => "group_kick",
            Self::GroupBan { .. } => "group_ban",
            Self::GroupUnban { .. } => "group_unban",
            Self::GroupMute { .. } => "group_mute",
            Self::GroupUnmute { .. } => "group_unmute",
            Self::GroupPromote { .. } => "group_promote",
            Self::GroupDemote { .. } => "group_demote",
            Self::GroupSettings { .. } => "group_settings",
            Self::GroupMessage { .. } => "group_message",
            Self::GroupMessageEdit { .. } => "group_message_edit",
            Self::GroupReact { .. } => "group_react",
            Self::GroupAnnounce { .. } => "group_announce",
            Self::GetGroups => "get_groups",
            Self::GetGroup { .. } => "get_group",
            Self::GetGroupMembers { .. } => "get_group_members",
            Self::GetGroupMessages { .. } => "get_group_messages",
            Self::GroupSearch { .. } => "group_search",
            Self::SetWebPassword { .. } => "set_web_password",
            Self::RemoveWebPassword => "remove_web_password",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_commands_need_no_data() {
        let cmd: Command = serde_json::from_value(json!({"type": "get_friends"})).unwrap();
        assert_eq!(cmd.name(), "get_friends");
    }

    #[test]
    fn refs_accept_names_and_ids() {
        let id = Uuid::new_v4();
        let cmd: Command = serde_json::from_value(json!({
            "type": "group_invite",
            "data": {"group": id.to_string(), "player": "Blair"},
        }))
        .unwrap();
        match cmd {
            Command::GroupInvite { group, player } => {
                assert_eq!(group, GroupRef::Id(id));
                assert_eq!(player, PlayerRef::Name("Blair".into()));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn create_takes_the_request_body() {
        let cmd: Command = serde_json::from_value(json!({
            "type": "group_create",
            "data": {"name": "Squad", "max_members": 2},
        }))
        .unwrap();
        match cmd {
            Command::GroupCreate(req) => assert_eq!(req.max_members, Some(2)),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_value::<Command>(json!({"type": "self_destruct"})).is_err());
    }
}
