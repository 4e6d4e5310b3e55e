//! Group store: groups, membership, roles, invites, bans, mutes and history.
//!
//! Every mutation of a group document runs under that group's async lock:
//! load, check, write. Capacity and role checks therefore always see the
//! state they are about to overwrite. Locks are per process; there is a
//! single authoritative process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use kinship_common::config::AppConfig;
use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::{
    BanRecord, CreateGroupRequest, Group, GroupInvite, GroupMember, GroupMessage, GroupRef,
    GroupRole, Identity, InviteStatus, MessageKind, MessageSource, SettingsPatch,
};
use kinship_common::permissions::{invite_role, require_authority, require_member, require_role};
use kinship_common::validation::{
    validate_emoji, validate_group_name, validate_message, validate_request,
};
use rand::Rng;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::codec::{decode_all, from_document, set, to_document};
use crate::collections::{GROUPS, GROUP_INVITES, GROUP_MESSAGES};
use crate::document::{DocumentStore, Filter, FindOptions, SortOrder};
use crate::relationships::RelationshipStore;
use crate::Database;

pub const INVITE_CODE_LEN: usize = 8;
const INVITE_CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Limits and defaults applied by the group store.
#[derive(Debug, Clone)]
pub struct GroupPolicy {
    pub default_max_members: u32,
    pub max_members_limit: u32,
    pub max_groups_per_player: u32,
    /// Minimum role allowed to invite while a group has invites enabled.
    pub invite_role: GroupRole,
    pub history_limit: u32,
    pub search_limit: u32,
    pub max_message_length: u32,
}

impl Default for GroupPolicy {
    fn default() -> Self {
        Self {
            default_max_members: 20,
            max_members_limit: 100,
            max_groups_per_player: 5,
            invite_role: GroupRole::Member,
            history_limit: 100,
            search_limit: 50,
            max_message_length: 256,
        }
    }
}

impl GroupPolicy {
    pub fn from_config(config: &AppConfig) -> KinshipResult<Self> {
        let invite_role = config
            .groups
            .invite_role
            .parse::<GroupRole>()
            .map_err(KinshipError::validation)?;
        Ok(Self {
            default_max_members: config.groups.default_max_members,
            max_members_limit: config.groups.max_members_limit,
            max_groups_per_player: config.groups.max_groups_per_player,
            invite_role,
            history_limit: config.groups.history_limit,
            search_limit: config.groups.search_limit,
            max_message_length: config.limits.max_message_length,
        })
    }
}

/// Which pending invite an invitee is answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteSelector {
    Invite(Uuid),
    Group(GroupRef),
}

fn name_key(name: &str) -> String {
    format!("name:{}", name.trim().to_lowercase())
}

fn invite_key(group_id: Uuid, target: Uuid) -> String {
    format!("{group_id}:{target}")
}

fn group_filter(group_id: Uuid) -> Filter {
    Filter::new().eq("groupId", group_id.to_string())
}

fn message_filter(message_id: Uuid) -> Filter {
    Filter::new().eq("messageId", message_id.to_string())
}

fn random_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_CHARSET[rng.random_range(0..INVITE_CODE_CHARSET.len())] as char)
        .collect()
}

#[derive(Debug, Clone)]
pub struct GroupStore {
    db: Database,
    relationships: RelationshipStore,
    policy: GroupPolicy,
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl GroupStore {
    pub fn new(db: Database, relationships: RelationshipStore, policy: GroupPolicy) -> Self {
        Self {
            db,
            relationships,
            policy,
            locks: Arc::default(),
        }
    }

    pub fn policy(&self) -> &GroupPolicy {
        &self.policy
    }

    async fn lock(&self, group_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(group_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn load(&self, group_id: Uuid) -> KinshipResult<Group> {
        self.get_group(group_id)
            .await?
            .ok_or_else(|| KinshipError::not_found("Group"))
    }

    /// Overwrite the stored group. Callers hold the group's lock.
    async fn save(&self, group: &Group) -> KinshipResult<()> {
        if !self
            .db
            .update_one(GROUPS, &group_filter(group.id), to_document(group)?)
            .await?
        {
            return Err(KinshipError::not_found("Group"));
        }
        Ok(())
    }

    // === Lifecycle ===

    pub async fn create_group(&self, owner: &Identity, req: CreateGroupRequest) -> KinshipResult<Group> {
        validate_request(&req)?;
        validate_group_name(&req.name)?;

        let max_members = req.max_members.unwrap_or(self.policy.default_max_members);
        if !(2..=self.policy.max_members_limit).contains(&max_members) {
            return Err(KinshipError::validation(format!(
                "Group size must be between 2 and {}",
                self.policy.max_members_limit
            )));
        }

        let owned = self
            .db
            .count(GROUPS, &Filter::new().eq("ownerId", owner.id.to_string()))
            .await?;
        if owned >= u64::from(self.policy.max_groups_per_player) {
            return Err(KinshipError::full("Your group allowance"));
        }

        let group = Group::new(
            owner,
            req.name.trim(),
            req.description.as_deref().unwrap_or_default(),
            max_members,
            req.private.unwrap_or(false),
        );
        let inserted = self
            .db
            .insert_unique(GROUPS, &name_key(&group.name), to_document(&group)?)
            .await?;
        if !inserted {
            return Err(KinshipError::already_exists(format!("Group '{}'", group.name)));
        }

        tracing::info!(group = %group.id, owner = %owner.id, name = %group.name, "Group created");
        Ok(group)
    }

    // === Invites ===

    pub async fn invite(
        &self,
        group_id: Uuid,
        inviter: &Identity,
        invitee: &Identity,
    ) -> KinshipResult<GroupInvite> {
        if inviter.id == invitee.id {
            return Err(KinshipError::invalid_state("You cannot invite yourself"));
        }

        let _guard = self.lock(group_id).await;
        let group = self.load(group_id).await?;
        require_role(&group, inviter.id, invite_role(&group, self.policy.invite_role))?;

        if group.settings.friends_only
            && !self.relationships.are_friends(inviter.id, invitee.id).await?
        {
            return Err(KinshipError::forbidden(
                "This group only allows inviting your friends",
            ));
        }
        if group.is_member(invitee.id) {
            return Err(KinshipError::already_exists("Group membership"));
        }
        if group.is_banned(invitee.id) {
            return Err(KinshipError::forbidden(format!(
                "{} is banned from this group",
                invitee.name
            )));
        }

        let invite = GroupInvite::new(&group, inviter, invitee);
        let inserted = self
            .db
            .insert_unique(
                GROUP_INVITES,
                &invite_key(group.id, invitee.id),
                to_document(&invite)?,
            )
            .await?;
        if !inserted {
            return Err(KinshipError::already_exists("Pending invite"));
        }

        tracing::debug!(group = %group.id, inviter = %inviter.id, invitee = %invitee.id, "Invite created");
        Ok(invite)
    }

    async fn find_invite(
        &self,
        invitee: Uuid,
        selector: &InviteSelector,
    ) -> KinshipResult<Option<GroupInvite>> {
        let filter = Filter::new().eq("targetId", invitee.to_string());
        let filter = match selector {
            InviteSelector::Invite(id) => filter.eq("inviteId", id.to_string()),
            InviteSelector::Group(GroupRef::Id(id)) => filter.eq("groupId", id.to_string()),
            InviteSelector::Group(GroupRef::Name(name)) => filter.eq_ignore_case("groupName", name),
        };
        match self.db.find_one(GROUP_INVITES, &filter).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    async fn delete_invite(&self, group_id: Uuid, invitee: Uuid) -> KinshipResult<bool> {
        self.db
            .delete_one(
                GROUP_INVITES,
                &group_filter(group_id).eq("targetId", invitee.to_string()),
            )
            .await
    }

    /// Capacity is checked again here, not at invite time. A full group keeps
    /// the invite so it can be accepted once a slot frees up.
    pub async fn accept_invite(
        &self,
        invitee: &Identity,
        selector: &InviteSelector,
    ) -> KinshipResult<(Group, GroupInvite)> {
        let mut invite = self
            .find_invite(invitee.id, selector)
            .await?
            .ok_or_else(|| KinshipError::not_found("Invite"))?;

        let _guard = self.lock(invite.group_id).await;
        let mut group = self.load(invite.group_id).await?;

        if group.is_banned(invitee.id) {
            self.delete_invite(group.id, invitee.id).await?;
            return Err(KinshipError::Banned);
        }
        if group.is_member(invitee.id) {
            self.delete_invite(group.id, invitee.id).await?;
            return Err(KinshipError::already_exists("Group membership"));
        }
        if group.is_full() {
            return Err(KinshipError::full(format!("Group '{}'", group.name)));
        }

        group.members.push(GroupMember::new(invitee, GroupRole::Member));
        self.save(&group).await?;
        self.delete_invite(group.id, invitee.id).await?;

        invite.status = InviteStatus::Accepted;
        tracing::info!(group = %group.id, player = %invitee.id, "Invite accepted");
        Ok((group, invite))
    }

    /// `None` when there was nothing to reject.
    pub async fn reject_invite(
        &self,
        invitee: Uuid,
        selector: &InviteSelector,
    ) -> KinshipResult<Option<GroupInvite>> {
        let Some(mut invite) = self.find_invite(invitee, selector).await? else {
            return Ok(None);
        };
        self.delete_invite(invite.group_id, invitee).await?;
        invite.status = InviteStatus::Rejected;
        Ok(Some(invite))
    }

    pub async fn pending_invites(&self, invitee: Uuid) -> KinshipResult<Vec<GroupInvite>> {
        let docs = self
            .db
            .find(
                GROUP_INVITES,
                &Filter::new().eq("targetId", invitee.to_string()),
                FindOptions::sorted("timestamp", SortOrder::Ascending),
            )
            .await?;
        Ok(decode_all(GROUP_INVITES, docs))
    }

    // === Invite codes ===

    /// Replace the group's join code. ADMIN+.
    pub async fn generate_invite_code(&self, group_id: Uuid, actor: Uuid) -> KinshipResult<String> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        require_role(&group, actor, GroupRole::Admin)?;

        let mut code = random_invite_code();
        while self.get_group_by_invite_code(&code).await?.is_some() {
            code = random_invite_code();
        }
        group.invite_code = Some(code.clone());
        self.save(&group).await?;

        tracing::debug!(group = %group.id, actor = %actor, "Invite code regenerated");
        Ok(code)
    }

    pub async fn join_by_code(&self, player: &Identity, code: &str) -> KinshipResult<Group> {
        let code = code.trim().to_ascii_uppercase();
        let group_id = self
            .get_group_by_invite_code(&code)
            .await?
            .ok_or(KinshipError::InvalidCode)?
            .id;

        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        // The code may have been replaced while we waited for the lock.
        if group.invite_code.as_deref() != Some(code.as_str()) {
            return Err(KinshipError::InvalidCode);
        }
        if group.is_banned(player.id) {
            return Err(KinshipError::Banned);
        }
        if group.is_member(player.id) {
            return Err(KinshipError::already_exists("Group membership"));
        }
        if group.is_full() {
            return Err(KinshipError::full(format!("Group '{}'", group.name)));
        }

        group.members.push(GroupMember::new(player, GroupRole::Member));
        self.save(&group).await?;
        self.delete_invite(group.id, player.id).await?;

        tracing::info!(group = %group.id, player = %player.id, "Joined by invite code");
        Ok(group)
    }

    // === Membership ===

    /// Returns the group after removal and the departed member.
    pub async fn leave(&self, group_id: Uuid, player: Uuid) -> KinshipResult<(Group, GroupMember)> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        let member = require_member(&group, player)?.clone();
        if group.is_owner(player) {
            return Err(KinshipError::invalid_state(
                "The owner cannot leave the group",
            ));
        }

        group.members.retain(|m| m.player_id != player);
        self.save(&group).await?;
        tracing::info!(group = %group.id, player = %player, "Member left");
        Ok((group, member))
    }

    pub async fn kick(
        &self,
        group_id: Uuid,
        actor: Uuid,
        target: Uuid,
        reason: Option<&str>,
    ) -> KinshipResult<(Group, GroupMember)> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        let (_, kicked) = require_authority(&group, actor, target, GroupRole::Moderator)?;
        let kicked = kicked.clone();

        group.members.retain(|m| m.player_id != target);
        self.save(&group).await?;
        tracing::info!(group = %group.id, actor = %actor, target = %target, reason, "Member kicked");
        Ok((group, kicked))
    }

    /// Ban `target`, removing them if they are a member. Returns the removed
    /// member, if any.
    pub async fn ban(
        &self,
        group_id: Uuid,
        actor: Uuid,
        target: &Identity,
        reason: Option<String>,
    ) -> KinshipResult<(Group, Option<GroupMember>)> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;

        let removed = if group.is_member(target.id) {
            let (_, member) = require_authority(&group, actor, target.id, GroupRole::Admin)?;
            Some(member.clone())
        } else {
            require_role(&group, actor, GroupRole::Admin)?;
            None
        };
        if group.is_banned(target.id) {
            return Err(KinshipError::already_exists("Ban"));
        }

        group.members.retain(|m| m.player_id != target.id);
        group.banned.push(BanRecord {
            player_id: target.id,
            player_name: target.name.clone(),
            banned_by: actor,
            banned_at: Utc::now(),
            reason,
        });
        self.save(&group).await?;
        self.delete_invite(group.id, target.id).await?;

        tracing::info!(group = %group.id, actor = %actor, target = %target.id, "Player banned");
        Ok((group, removed))
    }

    /// `false` when the player was not banned.
    pub async fn unban(&self, group_id: Uuid, actor: Uuid, target: Uuid) -> KinshipResult<bool> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        require_role(&group, actor, GroupRole::Admin)?;
        if !group.is_banned(target) {
            return Ok(false);
        }
        group.banned.retain(|b| b.player_id != target);
        self.save(&group).await?;
        tracing::info!(group = %group.id, actor = %actor, target = %target, "Player unbanned");
        Ok(true)
    }

    pub async fn mute(
        &self,
        group_id: Uuid,
        actor: Uuid,
        target: Uuid,
        duration: Duration,
    ) -> KinshipResult<GroupMember> {
        if duration <= Duration::zero() {
            return Err(KinshipError::validation("Mute duration must be positive"));
        }
        self.set_mute(group_id, actor, target, Some(Utc::now() + duration))
            .await
    }

    pub async fn unmute(&self, group_id: Uuid, actor: Uuid, target: Uuid) -> KinshipResult<GroupMember> {
        self.set_mute(group_id, actor, target, None).await
    }

    async fn set_mute(
        &self,
        group_id: Uuid,
        actor: Uuid,
        target: Uuid,
        until: Option<chrono::DateTime<Utc>>,
    ) -> KinshipResult<GroupMember> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        require_authority(&group, actor, target, GroupRole::Moderator)?;

        let member = group
            .member_mut(target)
            .ok_or_else(|| KinshipError::not_found("Group member"))?;
        member.mute_until = until;
        let member = member.clone();
        self.save(&group).await?;
        tracing::info!(group = %group_id, actor = %actor, target = %target, muted = until.is_some(), "Mute changed");
        Ok(member)
    }

    /// One step up the ladder. Never reaches the actor's own rank.
    pub async fn promote(&self, group_id: Uuid, actor: Uuid, target: Uuid) -> KinshipResult<GroupMember> {
        self.change_role(group_id, actor, target, true).await
    }

    /// One step down the ladder. Never below MEMBER.
    pub async fn demote(&self, group_id: Uuid, actor: Uuid, target: Uuid) -> KinshipResult<GroupMember> {
        self.change_role(group_id, actor, target, false).await
    }

    async fn change_role(
        &self,
        group_id: Uuid,
        actor: Uuid,
        target: Uuid,
        up: bool,
    ) -> KinshipResult<GroupMember> {
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        let (acting, current) = require_authority(&group, actor, target, GroupRole::Admin)?;

        let new_role = if up {
            let role = current
                .role
                .promoted()
                .ok_or_else(|| KinshipError::invalid_state("This member cannot be promoted further"))?;
            if !acting.role.outranks(role) {
                return Err(KinshipError::forbidden(
                    "You cannot promote a member to your own rank",
                ));
            }
            role
        } else {
            current
                .role
                .demoted()
                .ok_or_else(|| KinshipError::invalid_state("This member already has the lowest role"))?
        };

        let member = group
            .member_mut(target)
            .ok_or_else(|| KinshipError::not_found("Group member"))?;
        member.role = new_role;
        let member = member.clone();
        self.save(&group).await?;
        tracing::info!(group = %group_id, actor = %actor, target = %target, role = %new_role, "Role changed");
        Ok(member)
    }

    pub async fn update_settings(
        &self,
        group_id: Uuid,
        actor: Uuid,
        patch: SettingsPatch,
    ) -> KinshipResult<Group> {
        validate_request(&patch)?;
        let _guard = self.lock(group_id).await;
        let mut group = self.load(group_id).await?;
        require_role(&group, actor, GroupRole::Admin)?;

        patch.apply(&mut group);
        self.save(&group).await?;
        tracing::info!(group = %group.id, actor = %actor, "Group settings updated");
        Ok(group)
    }

    // === Messages ===

    /// Post a chat message. The message is returned for fan-out even when the
    /// group does not keep history.
    pub async fn post_message(
        &self,
        group_id: Uuid,
        sender: &Identity,
        content: &str,
        source: MessageSource,
    ) -> KinshipResult<(Group, GroupMessage)> {
        self.post(group_id, sender, content, source, MessageKind::Text)
            .await
    }

    /// ADMIN+.
    pub async fn post_announcement(
        &self,
        group_id: Uuid,
        sender: &Identity,
        content: &str,
        source: MessageSource,
    ) -> KinshipResult<(Group, GroupMessage)> {
        self.post(group_id, sender, content, source, MessageKind::Announcement)
            .await
    }

    async fn post(
        &self,
        group_id: Uuid,
        sender: &Identity,
        content: &str,
        source: MessageSource,
        kind: MessageKind,
    ) -> KinshipResult<(Group, GroupMessage)> {
        validate_message(content, self.policy.max_message_length)?;
        let group = self.load(group_id).await?;

        let required = match kind {
            MessageKind::Announcement => GroupRole::Admin,
            _ => GroupRole::Member,
        };
        let member = require_role(&group, sender.id, required)?;
        if let Some(until) = member.mute_until.filter(|_| member.is_muted_at(Utc::now())) {
            return Err(KinshipError::Muted {
                until_ms: until.timestamp_millis(),
            });
        }
        require_channel(&group, source)?;

        let message = match kind {
            MessageKind::Announcement => GroupMessage::announcement(group.id, sender, content, source),
            _ => GroupMessage::text(group.id, sender, content, source),
        };
        if group.settings.log_messages {
            self.db.insert(GROUP_MESSAGES, to_document(&message)?).await?;
        }
        Ok((group, message))
    }

    pub async fn post_system_message(
        &self,
        group_id: Uuid,
        content: &str,
    ) -> KinshipResult<(Group, GroupMessage)> {
        let group = self.load(group_id).await?;
        let message = GroupMessage::system(group.id, content);
        if group.settings.log_messages {
            self.db.insert(GROUP_MESSAGES, to_document(&message)?).await?;
        }
        Ok((group, message))
    }

    async fn load_message(&self, message_id: Uuid) -> KinshipResult<GroupMessage> {
        match self.db.find_one(GROUP_MESSAGES, &message_filter(message_id)).await? {
            Some(doc) => from_document(doc),
            None => Err(KinshipError::not_found("Message")),
        }
    }

    /// Only the original sender may edit. Id, sender and timestamp are kept.
    pub async fn edit_message(
        &self,
        message_id: Uuid,
        editor: Uuid,
        content: &str,
        source: MessageSource,
    ) -> KinshipResult<GroupMessage> {
        validate_message(content, self.policy.max_message_length)?;
        let mut message = self.load_message(message_id).await?;
        if message.sender_id != Some(editor) {
            return Err(KinshipError::forbidden("You can only edit your own messages"));
        }

        let _guard = self.lock(message.group_id).await;
        require_channel(&self.load(message.group_id).await?, source)?;
        message.content = content.to_string();
        message.edited_at = Some(Utc::now().max(message.timestamp));

        let mut fields = set("content", &message.content)?;
        fields.extend(set("editedAt", &message.edited_at.map(|t| t.timestamp_millis()))?);
        self.db
            .update_one(GROUP_MESSAGES, &message_filter(message_id), fields)
            .await?;
        Ok(message)
    }

    /// Add or remove `reactor`'s `emoji`. Returns the message and whether the
    /// reaction is now present.
    pub async fn toggle_reaction(
        &self,
        message_id: Uuid,
        reactor: Uuid,
        emoji: &str,
        source: MessageSource,
    ) -> KinshipResult<(GroupMessage, bool)> {
        validate_emoji(emoji)?;
        let group_id = self.load_message(message_id).await?.group_id;

        let _guard = self.lock(group_id).await;
        let group = self.load(group_id).await?;
        require_member(&group, reactor)?;
        require_channel(&group, source)?;

        // Re-read under the lock so concurrent toggles do not overwrite each other.
        let mut message = self.load_message(message_id).await?;
        let added = message.toggle_reaction(emoji, reactor);
        self.db
            .update_one(
                GROUP_MESSAGES,
                &message_filter(message_id),
                set("reactions", &message.reactions)?,
            )
            .await?;
        Ok((message, added))
    }

    /// Up to `limit` most recent messages, oldest first. Capped by the
    /// configured history limit.
    pub async fn recent_messages(&self, group_id: Uuid, limit: u32) -> KinshipResult<Vec<GroupMessage>> {
        let limit = limit.min(self.policy.history_limit) as usize;
        let docs = self
            .db
            .find(
                GROUP_MESSAGES,
                &group_filter(group_id),
                FindOptions::sorted("messageId", SortOrder::Descending).limit(limit),
            )
            .await?;
        let mut messages: Vec<GroupMessage> = decode_all(GROUP_MESSAGES, docs);
        messages.reverse();
        Ok(messages)
    }

    // === Queries ===

    pub async fn get_group(&self, group_id: Uuid) -> KinshipResult<Option<Group>> {
        self.find_group(&group_filter(group_id)).await
    }

    pub async fn get_group_by_name(&self, name: &str) -> KinshipResult<Option<Group>> {
        self.find_group(&Filter::new().eq_ignore_case("groupName", name.trim()))
            .await
    }

    pub async fn get_group_by_invite_code(&self, code: &str) -> KinshipResult<Option<Group>> {
        self.find_group(&Filter::new().eq("inviteCode", code)).await
    }

    pub async fn resolve(&self, group: &GroupRef) -> KinshipResult<Group> {
        let found = match group {
            GroupRef::Id(id) => self.get_group(*id).await?,
            GroupRef::Name(name) => self.get_group_by_name(name).await?,
        };
        found.ok_or_else(|| KinshipError::not_found(format!("Group '{group}'")))
    }

    async fn find_group(&self, filter: &Filter) -> KinshipResult<Option<Group>> {
        match self.db.find_one(GROUPS, filter).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Groups `player` belongs to, by name.
    pub async fn groups_for(&self, player: Uuid) -> KinshipResult<Vec<Group>> {
        let docs = self
            .db
            .find(
                GROUPS,
                &Filter::new().elem_eq("members", "playerId", player.to_string()),
                FindOptions::sorted("groupName", SortOrder::Ascending),
            )
            .await?;
        Ok(decode_all(GROUPS, docs))
    }

    pub async fn member_of(&self, group_id: Uuid, player: Uuid) -> KinshipResult<Option<GroupMember>> {
        Ok(self
            .get_group(group_id)
            .await?
            .and_then(|g| g.member(player).cloned()))
    }

    /// Non-private groups whose name contains `query`, ignoring case.
    pub async fn search_public_groups(&self, query: &str, limit: u32) -> KinshipResult<Vec<Group>> {
        let limit = limit.min(self.policy.search_limit) as usize;
        let docs = self
            .db
            .find(
                GROUPS,
                &Filter::new()
                    .eq("isPrivate", false)
                    .contains_ignore_case("groupName", query.trim()),
                FindOptions::sorted("groupName", SortOrder::Ascending).limit(limit),
            )
            .await?;
        Ok(decode_all(GROUPS, docs))
    }
}

/// Web clients act on a group's chat only while it has web access enabled.
fn require_channel(group: &Group, source: MessageSource) -> KinshipResult<()> {
    if source == MessageSource::Web && !group.settings.web_access_enabled {
        return Err(KinshipError::forbidden("Web access is disabled for this group"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_common::error::ErrorKind;

    fn who(name: &str) -> Identity {
        Identity::new(Uuid::new_v4(), name)
    }

    fn store() -> GroupStore {
        let db = Database::memory();
        GroupStore::new(
            db.clone(),
            RelationshipStore::new(db, 50),
            GroupPolicy::default(),
        )
    }

    fn request(name: &str, max_members: u32) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.into(),
            description: None,
            max_members: Some(max_members),
            private: None,
        }
    }

    async fn join(store: &GroupStore, group: &Group, owner: &Identity, player: &Identity) {
        store.invite(group.id, owner, player).await.unwrap();
        store
            .accept_invite(player, &InviteSelector::Group(GroupRef::Id(group.id)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn names_are_unique_ignoring_case() {
        let store = store();
        let alex = who("Alex");
        store.create_group(&alex, request("Squad", 5)).await.unwrap();
        let err = store.create_group(&who("Blair"), request("squad", 5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert!(store.get_group_by_name("SQUAD").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn capacity_holds_on_accept() {
        let store = store();
        let (alex, blair, casey) = (who("Alex"), who("Blair"), who("Casey"));
        let group = store.create_group(&alex, request("Squad", 2)).await.unwrap();

        store.invite(group.id, &alex, &blair).await.unwrap();
        store.invite(group.id, &alex, &casey).await.unwrap();
        let (joined, invite) = store
            .accept_invite(&blair, &InviteSelector::Group(GroupRef::Name("squad".into())))
            .await
            .unwrap();
        assert_eq!(joined.members.len(), 2);
        assert_eq!(invite.status, InviteStatus::Accepted);

        let err = store
            .accept_invite(&casey, &InviteSelector::Group(GroupRef::Id(group.id)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Full);
        assert_eq!(store.get_group(group.id).await.unwrap().unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn one_pending_invite_per_invitee() {
        let store = store();
        let (alex, blair) = (who("Alex"), who("Blair"));
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        store.invite(group.id, &alex, &blair).await.unwrap();
        let err = store.invite(group.id, &alex, &blair).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.pending_invites(blair.id).await.unwrap().len(), 1);

        let rejected = store
            .reject_invite(blair.id, &InviteSelector::Group(GroupRef::Id(group.id)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rejected.status, InviteStatus::Rejected);
        assert!(store
            .reject_invite(blair.id, &InviteSelector::Group(GroupRef::Id(group.id)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn owner_cannot_leave() {
        let store = store();
        let alex = who("Alex");
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        let err = store.leave(group.id, alex.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        let group = store.get_group(group.id).await.unwrap().unwrap();
        assert_eq!(group.member(alex.id).unwrap().role, GroupRole::Owner);
    }

    #[tokio::test]
    async fn kick_requires_strictly_higher_rank() {
        let store = store();
        let (owner, admin, moderator) = (who("Owner"), who("Ada"), who("Mo"));
        let group = store.create_group(&owner, request("Squad", 5)).await.unwrap();
        join(&store, &group, &owner, &admin).await;
        join(&store, &group, &owner, &moderator).await;
        store.promote(group.id, owner.id, admin.id).await.unwrap();
        store.promote(group.id, owner.id, admin.id).await.unwrap();
        store.promote(group.id, owner.id, moderator.id).await.unwrap();

        let err = store.kick(group.id, moderator.id, admin.id, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let (group, kicked) = store.kick(group.id, admin.id, moderator.id, Some("spam")).await.unwrap();
        assert_eq!(kicked.player_id, moderator.id);
        assert!(!group.is_member(moderator.id));
    }

    #[tokio::test]
    async fn admin_cannot_promote_to_own_rank() {
        let store = store();
        let (owner, admin, member) = (who("Owner"), who("Ada"), who("Max"));
        let group = store.create_group(&owner, request("Squad", 5)).await.unwrap();
        join(&store, &group, &owner, &admin).await;
        join(&store, &group, &owner, &member).await;
        store.promote(group.id, owner.id, admin.id).await.unwrap();
        let promoted = store.promote(group.id, owner.id, admin.id).await.unwrap();
        assert_eq!(promoted.role, GroupRole::Admin);

        let moderator = store.promote(group.id, admin.id, member.id).await.unwrap();
        assert_eq!(moderator.role, GroupRole::Moderator);
        let err = store.promote(group.id, admin.id, member.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let demoted = store.demote(group.id, admin.id, member.id).await.unwrap();
        assert_eq!(demoted.role, GroupRole::Member);
        let err = store.demote(group.id, admin.id, member.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn muted_member_cannot_post_until_unmuted() {
        let store = store();
        let (owner, blair) = (who("Owner"), who("Blair"));
        let group = store.create_group(&owner, request("Squad", 5)).await.unwrap();
        join(&store, &group, &owner, &blair).await;

        store.mute(group.id, owner.id, blair.id, Duration::minutes(60)).await.unwrap();
        let err = store
            .post_message(group.id, &blair, "hello", MessageSource::World)
            .await
            .unwrap_err();
        assert!(matches!(err, KinshipError::Muted { .. }));

        store.unmute(group.id, owner.id, blair.id).await.unwrap();
        store
            .post_message(group.id, &blair, "hello", MessageSource::World)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ban_removes_and_blocks_rejoin() {
        let store = store();
        let (owner, blair) = (who("Owner"), who("Blair"));
        let group = store.create_group(&owner, request("Squad", 5)).await.unwrap();
        join(&store, &group, &owner, &blair).await;
        let code = store.generate_invite_code(group.id, owner.id).await.unwrap();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));

        let (group, removed) = store
            .ban(group.id, owner.id, &blair, Some("griefing".into()))
            .await
            .unwrap();
        assert_eq!(removed.map(|m| m.player_id), Some(blair.id));
        assert!(!group.is_member(blair.id));

        let err = store.join_by_code(&blair, &code.to_lowercase()).await.unwrap_err();
        assert!(matches!(err, KinshipError::Banned));
        assert_eq!(store.invite(group.id, &owner, &blair).await.unwrap_err().kind(), ErrorKind::Forbidden);

        assert!(store.unban(group.id, owner.id, blair.id).await.unwrap());
        store.join_by_code(&blair, &code).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_code_is_invalid() {
        let store = store();
        let err = store.join_by_code(&who("Alex"), "NOPE1234").await.unwrap_err();
        assert!(matches!(err, KinshipError::InvalidCode));
    }

    #[tokio::test]
    async fn disabled_invites_need_admin() {
        let store = store();
        let (owner, blair, casey) = (who("Owner"), who("Blair"), who("Casey"));
        let group = store.create_group(&owner, request("Squad", 5)).await.unwrap();
        join(&store, &group, &owner, &blair).await;
        store
            .update_settings(
                group.id,
                owner.id,
                SettingsPatch {
                    allow_invites: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let err = store.invite(group.id, &blair, &casey).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        store.invite(group.id, &owner, &casey).await.unwrap();
    }

    #[tokio::test]
    async fn edit_keeps_identity_and_moves_edited_at_forward() {
        let store = store();
        let alex = who("Alex");
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        let (_, original) = store
            .post_message(group.id, &alex, "helo", MessageSource::World)
            .await
            .unwrap();

        let edited = store.edit_message(original.id, alex.id, "hello", MessageSource::World).await.unwrap();
        assert_eq!(edited.id, original.id);
        assert_eq!(edited.sender_id, Some(alex.id));
        assert_eq!(edited.timestamp, original.timestamp);
        assert!(edited.edited_at.unwrap() >= edited.timestamp);

        let stored = store.recent_messages(group.id, 10).await.unwrap();
        assert_eq!(stored[0].content, "hello");
        assert!(stored[0].edited_at.is_some());

        let err = store.edit_message(original.id, Uuid::new_v4(), "x", MessageSource::World).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn history_is_optional_and_ordered() {
        let store = store();
        let alex = who("Alex");
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        for text in ["one", "two", "three"] {
            store.post_message(group.id, &alex, text, MessageSource::World).await.unwrap();
        }
        let recent: Vec<_> = store
            .recent_messages(group.id, 2)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(recent, vec!["two", "three"]);

        store
            .update_settings(
                group.id,
                alex.id,
                SettingsPatch {
                    log_messages: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let (_, unlogged) = store
            .post_message(group.id, &alex, "four", MessageSource::World)
            .await
            .unwrap();
        assert_eq!(unlogged.content, "four");
        assert_eq!(store.recent_messages(group.id, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reactions_toggle_for_members_only() {
        let store = store();
        let alex = who("Alex");
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        let (_, msg) = store
            .post_message(group.id, &alex, "gg", MessageSource::Web)
            .await
            .unwrap();
        let (updated, added) = store.toggle_reaction(msg.id, alex.id, "🎉", MessageSource::Web).await.unwrap();
        assert!(added);
        assert_eq!(updated.reactions["🎉"], vec![alex.id]);

        let err = store.toggle_reaction(msg.id, Uuid::new_v4(), "🎉", MessageSource::Web).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn search_skips_private_groups() {
        let store = store();
        let alex = who("Alex");
        store.create_group(&alex, request("Night Owls", 5)).await.unwrap();
        let mut hidden = request("Owl Club", 5);
        hidden.private = Some(true);
        store.create_group(&alex, hidden).await.unwrap();

        let found = store.search_public_groups("owl", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Night Owls");
        assert_eq!(store.groups_for(alex.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn group_allowance_is_enforced() {
        let db = Database::memory();
        let policy = GroupPolicy {
            max_groups_per_player: 1,
            ..GroupPolicy::default()
        };
        let store = GroupStore::new(db.clone(), RelationshipStore::new(db, 50), policy);
        let alex = who("Alex");
        store.create_group(&alex, request("First", 5)).await.unwrap();
        let err = store.create_group(&alex, request("Second", 5)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Full);
    }

    #[tokio::test]
    async fn code_join_respects_capacity() {
        let store = store();
        let (alex, blair, casey) = (who("Alex"), who("Blair"), who("Casey"));
        let group = store.create_group(&alex, request("Squad", 2)).await.unwrap();
        let code = store.generate_invite_code(group.id, alex.id).await.unwrap();

        let joined = store.join_by_code(&blair, &code).await.unwrap();
        assert_eq!(joined.members.len(), 2);

        let err = store.join_by_code(&casey, &code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Full);
        let group = store.get_group(group.id).await.unwrap().unwrap();
        assert_eq!(group.members.len(), 2);
        assert!(!group.is_member(casey.id));
    }

    #[tokio::test]
    async fn code_join_by_a_member_is_rejected() {
        let store = store();
        let (alex, blair) = (who("Alex"), who("Blair"));
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        join(&store, &group, &alex, &blair).await;
        let code = store.generate_invite_code(group.id, alex.id).await.unwrap();

        let err = store.join_by_code(&blair, &code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.get_group(group.id).await.unwrap().unwrap().members.len(), 2);
    }

    #[tokio::test]
    async fn member_of_finds_only_members() {
        let store = store();
        let (alex, blair) = (who("Alex"), who("Blair"));
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();

        let owner = store.member_of(group.id, alex.id).await.unwrap().unwrap();
        assert_eq!(owner.role, GroupRole::Owner);
        assert!(store.member_of(group.id, blair.id).await.unwrap().is_none());
        assert!(store.member_of(Uuid::new_v4(), alex.id).await.unwrap().is_none());

        join(&store, &group, &alex, &blair).await;
        let member = store.member_of(group.id, blair.id).await.unwrap().unwrap();
        assert_eq!(member.role, GroupRole::Member);
    }

    #[tokio::test]
    async fn web_edits_and_reactions_need_web_access() {
        let store = store();
        let alex = who("Alex");
        let group = store.create_group(&alex, request("Squad", 5)).await.unwrap();
        let (_, msg) = store
            .post_message(group.id, &alex, "gg", MessageSource::World)
            .await
            .unwrap();
        store
            .update_settings(
                group.id,
                alex.id,
                SettingsPatch {
                    web_access_enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = store
            .edit_message(msg.id, alex.id, "good game", MessageSource::Web)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = store
            .toggle_reaction(msg.id, alex.id, "🎉", MessageSource::Web)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(store.recent_messages(group.id, 10).await.unwrap()[0].reactions.is_empty());

        store
            .edit_message(msg.id, alex.id, "good game", MessageSource::World)
            .await
            .unwrap();
        store
            .toggle_reaction(msg.id, alex.id, "🎉", MessageSource::World)
            .await
            .unwrap();
    }
}
