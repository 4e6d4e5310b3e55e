//! Group chat messages.
//!
//! Messages live in their own collection keyed by `messageId` and reference
//! the group by id. History is read newest-first and bounded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::Identity;

/// A message posted to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    #[serde(rename = "messageId")]
    pub id: Uuid,

    #[serde(rename = "groupId")]
    pub group_id: Uuid,

    /// `None` for system messages.
    #[serde(rename = "senderUUID", default)]
    pub sender_id: Option<Uuid>,

    #[serde(rename = "senderName")]
    pub sender_name: String,

    pub content: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "messageType", default)]
    pub kind: MessageKind,

    #[serde(rename = "editedAt", default, with = "chrono::serde::ts_milliseconds_option")]
    pub edited_at: Option<DateTime<Utc>>,

    /// Emoji → players who reacted with it.
    #[serde(default)]
    pub reactions: BTreeMap<String, Vec<Uuid>>,

    #[serde(default)]
    pub source: MessageSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    System,
    Announcement,
}

/// Which channel a message was posted from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    #[default]
    World,
    Web,
    System,
}

impl GroupMessage {
    pub fn text(group_id: Uuid, sender: &Identity, content: &str, source: MessageSource) -> Self {
        Self::build(group_id, Some(sender), content, MessageKind::Text, source)
    }

    pub fn announcement(group_id: Uuid, sender: &Identity, content: &str, source: MessageSource) -> Self {
        Self::build(group_id, Some(sender), content, MessageKind::Announcement, source)
    }

    pub fn system(group_id: Uuid, content: &str) -> Self {
        Self::build(group_id, None, content, MessageKind::System, MessageSource::System)
    }

    fn build(
        group_id: Uuid,
        sender: Option<&Identity>,
        content: &str,
        kind: MessageKind,
        source: MessageSource,
    ) -> Self {
        Self {
            id: crate::snowflake::generate_id(),
            group_id,
            sender_id: sender.map(|s| s.id),
            sender_name: sender.map_or_else(|| "System".to_string(), |s| s.name.clone()),
            content: content.to_string(),
            timestamp: Utc::now(),
            kind,
            edited_at: None,
            reactions: BTreeMap::new(),
            source,
        }
    }

    /// Add `player` to `emoji` if absent, remove otherwise. Returns whether the
    /// reaction is now present. Empty emoji entries are dropped.
    pub fn toggle_reaction(&mut self, emoji: &str, player: Uuid) -> bool {
        let reactors = self.reactions.entry(emoji.to_string()).or_default();
        let added = if let Some(pos) = reactors.iter().position(|p| *p == player) {
            reactors.remove(pos);
            false
        } else {
            reactors.push(player);
            true
        };
        if reactors.is_empty() {
            self.reactions.remove(emoji);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_toggles_and_cleans_up() {
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        let mut msg = GroupMessage::text(Uuid::new_v4(), &alex, "hi", MessageSource::World);
        assert!(msg.toggle_reaction("👍", alex.id));
        assert_eq!(msg.reactions["👍"], vec![alex.id]);
        assert!(!msg.toggle_reaction("👍", alex.id));
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn system_messages_have_no_sender() {
        let msg = GroupMessage::system(Uuid::new_v4(), "Bea joined");
        assert!(msg.sender_id.is_none());
        assert_eq!(msg.kind, MessageKind::System);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["messageType"], "system");
        assert_eq!(json["source"], "system");
    }
}
