//! Web-channel event envelopes, shared between the gateway and the API.
//!
//! Outbound frames are `{id, type, data, timestamp}`; inbound frames are
//! `{type, data}`. Every outbound event carries an id so a client can
//! de-duplicate the same change arriving over several sessions.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Notification kinds fanned out to recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    FriendRequest,
    FriendAccepted,
    FriendDenied,
    FriendRemoved,
    FriendMessage,
    GroupInvite,
    GroupMemberJoined,
    GroupMemberLeft,
    GroupMemberKicked,
    GroupMemberBanned,
    GroupMemberMuted,
    GroupRoleChanged,
    GroupMessage,
    GroupMessageEdited,
    GroupMessageReaction,
    GroupSettingsUpdated,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FriendRequest => "friend_request",
            Self::FriendAccepted => "friend_accepted",
            Self::FriendDenied => "friend_denied",
            Self::FriendRemoved => "friend_removed",
            Self::FriendMessage => "friend_message",
            Self::GroupInvite => "group_invite",
            Self::GroupMemberJoined => "group_member_joined",
            Self::GroupMemberLeft => "group_member_left",
            Self::GroupMemberKicked => "group_member_kicked",
            Self::GroupMemberBanned => "group_member_banned",
            Self::GroupMemberMuted => "group_member_muted",
            Self::GroupRoleChanged => "group_role_changed",
            Self::GroupMessage => "group_message",
            Self::GroupMessageEdited => "group_message_edited",
            Self::GroupMessageReaction => "group_message_reaction",
            Self::GroupSettingsUpdated => "group_settings_updated",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbound frame delivered to a web session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    /// Event type, e.g. `group_message`, `response`, `connection`.
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl EventEnvelope {
    pub fn new(id: Uuid, event_type: impl fmt::Display, data: serde_json::Value) -> Self {
        Self {
            id,
            event_type: event_type.to_string(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Envelope with a fresh id, for frames that are not tied to a stored record.
    pub fn fresh(event_type: impl fmt::Display, data: serde_json::Value) -> Self {
        Self::new(crate::snowflake::generate_id(), event_type, data)
    }
}

/// Inbound frame from a web client.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
