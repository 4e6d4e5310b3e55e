//! Fan-out router.
//!
//! Every command, from either channel, goes through [`Router::dispatch`]:
//! resolve the acting identity, run the store operation, and on success
//! deliver the resulting event to every eligible recipient. In-world
//! recipients get a formatted line through the world loop; web recipients get
//! an [`EventEnvelope`] on each of their sessions. Failures go back to the
//! caller only and are logged here, once.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use kinship_common::auth::Credentials;
use kinship_common::config::AppConfig;
use kinship_common::envelope::{EventEnvelope, EventType};
use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::{
    FriendView, Group, GroupMember, GroupMessage, GroupRef, GroupSummary, Identity, MemberView,
    MessageKind, MessageSource, PlayerRef,
};
use kinship_common::ranks::RankProvider;
use kinship_common::snowflake::generate_id;
use kinship_common::validation::validate_message;
use kinship_db::groups::InviteSelector;
use kinship_db::{
    CredentialStore, Database, GroupPolicy, GroupStore, PlayerDirectory, RelationshipStore,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::commands::{Command, Origin};
use crate::format::LineFormats;
use crate::session::SessionRegistry;
use crate::world::{WorldHandle, WorldLine};

pub const DEFAULT_MUTE_MINUTES: u32 = 60;

/// Composes the stores, the session registry and the world handle.
#[derive(Clone)]
pub struct Router {
    relationships: RelationshipStore,
    groups: GroupStore,
    players: PlayerDirectory,
    credentials: CredentialStore,
    sessions: Arc<SessionRegistry>,
    world: WorldHandle,
    ranks: Arc<dyn RankProvider>,
    formats: LineFormats,
}

impl Router {
    pub fn new(
        db: Database,
        config: &AppConfig,
        sessions: Arc<SessionRegistry>,
        world: WorldHandle,
        ranks: Arc<dyn RankProvider>,
    ) -> KinshipResult<Self> {
        let relationships = RelationshipStore::new(db.clone(), config.friends.max_friends);
        let groups = GroupStore::new(
            db.clone(),
            relationships.clone(),
            GroupPolicy::from_config(config)?,
        );
        Ok(Self {
            relationships,
            groups,
            players: PlayerDirectory::new(db.clone()),
            credentials: CredentialStore::new(db),
            sessions,
            world,
            ranks,
            formats: LineFormats::new(config.formats.clone()),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn relationships(&self) -> &RelationshipStore {
        &self.relationships
    }

    pub fn groups(&self) -> &GroupStore {
        &self.groups
    }

    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    /// Authenticate a web session and remember the identity for name lookups.
    pub async fn authenticate(&self, session_id: &str, credentials: &Credentials) -> KinshipResult<Identity> {
        let result: KinshipResult<Identity> = async {
            let identity = self
                .sessions
                .authenticate(session_id, credentials, &self.credentials)
                .await?;
            self.players.remember(&identity).await?;
            Ok(identity)
        }
        .await;
        if let Err(e) = &result {
            log_failure("auth", &Origin::web(session_id), e);
        }
        result
    }

    /// Called by the host when a player enters the world. Remembers the name
    /// and tells the player about anything waiting for them.
    pub async fn world_join(&self, player: &Identity) -> KinshipResult<()> {
        self.players.remember(player).await?;

        let requests = self.relationships.pending_incoming(player.id).await?.len();
        let invites = self.groups.pending_invites(player.id).await?.len();
        let mut notices = Vec::new();
        if requests > 0 {
            notices.push(format!("You have {requests} pending friend request(s)."));
        }
        if invites > 0 {
            notices.push(format!("You have {invites} pending group invite(s)."));
        }
        for notice in notices {
            self.world.deliver(
                vec![player.id],
                WorldLine {
                    event_id: generate_id(),
                    text: self.formats.notice(&notice),
                },
            );
        }
        Ok(())
    }

    /// Called by the host when a player leaves the world. Stamps the
    /// player's last-seen time.
    pub async fn world_leave(&self, player: &Identity) -> KinshipResult<()> {
        self.players.remember(player).await?;
        tracing::debug!(player = %player.id, "Left the world");
        Ok(())
    }

    /// Run a command and build the reply for the originating channel:
    /// `{success: true, data}` or `{success: false, error}`.
    pub async fn dispatch(&self, origin: &Origin, command: Command) -> Value {
        match self.execute(origin, command).await {
            Ok(data) => json!({ "success": true, "data": data }),
            Err(e) => json!({ "success": false, "error": e.body() }),
        }
    }

    /// Run a command, returning the typed result. Failures are logged here.
    pub async fn execute(&self, origin: &Origin, command: Command) -> KinshipResult<Value> {
        let op = command.name();
        let result = self.handle(origin, command).await;
        if let Err(e) = &result {
            log_failure(op, origin, e);
        }
        result
    }

    async fn handle(&self, origin: &Origin, command: Command) -> KinshipResult<Value> {
        let (actor, source) = self.actor(origin).await?;
        match command {
            // === Friends ===
            Command::FriendRequest { player } => {
                let target = self.player(&player).await?;
                let request = self.relationships.send_request(&actor, &target).await?;
                self.notify(
                    &target,
                    EventType::FriendRequest,
                    generate_id(),
                    json!({ "from": actor }),
                    Some(format!("{} sent you a friend request.", actor.name)),
                )
                .await;
                Ok(serde_json::to_value(request)?)
            }
            Command::FriendAccept { player } => {
                let sender = self.player(&player).await?;
                let edge = self.relationships.accept(&actor, sender.id).await?;
                self.notify(
                    &sender,
                    EventType::FriendAccepted,
                    generate_id(),
                    json!({ "player": actor }),
                    Some(format!("{} accepted your friend request.", actor.name)),
                )
                .await;
                Ok(serde_json::to_value(edge)?)
            }
            Command::FriendDeny { player } => {
                let sender = self.player(&player).await?;
                let denied = self.relationships.deny(actor.id, sender.id).await?;
                if denied {
                    self.notify(
                        &sender,
                        EventType::FriendDenied,
                        generate_id(),
                        json!({ "player": actor }),
                        None,
                    )
                    .await;
                }
                Ok(json!({ "denied": denied }))
            }
            Command::FriendCancel { player } => {
                let target = self.player(&player).await?;
                let cancelled = self.relationships.cancel(actor.id, target.id).await?;
                Ok(json!({ "cancelled": cancelled }))
            }
            Command::FriendRemove { player } => {
                let friend = self.player(&player).await?;
                let removed = self.relationships.remove(actor.id, friend.id).await?;
                if removed {
                    self.notify(
                        &friend,
                        EventType::FriendRemoved,
                        generate_id(),
                        json!({ "player": actor }),
                        None,
                    )
                    .await;
                }
                Ok(json!({ "removed": removed }))
            }
            Command::FriendMessage { player, message } => {
                self.friend_message(&actor, source, &player, &message).await
            }
            Command::GetFriends => self.friends_of(&actor).await,
            Command::GetFriendRequests => {
                let incoming = self.relationships.pending_incoming(actor.id).await?;
                let outgoing = self.relationships.pending_outgoing(actor.id).await?;
                Ok(json!({ "incoming": incoming, "outgoing": outgoing }))
            }

            // === Group lifecycle and invites ===
            Command::GroupCreate(request) => {
                let group = self.groups.create_group(&actor, request).await?;
                Ok(serde_json::to_value(group)?)
            }
            Command::GroupInvite { group, player } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let invite = self.groups.invite(group.id, &actor, &target).await?;
                self.notify(
                    &target,
                    EventType::GroupInvite,
                    invite.id,
                    serde_json::to_value(&invite)?,
                    Some(format!(
                        "{} invited you to join the group {}.",
                        actor.name, group.name
                    )),
                )
                .await;
                Ok(serde_json::to_value(invite)?)
            }
            Command::GroupInviteAccept { invite_id, group } => {
                let selector = invite_selector(invite_id, group)?;
                let (group, invite) = self.groups.accept_invite(&actor, &selector).await?;
                self.announce_join(&group, &actor).await;
                Ok(json!({ "group": GroupSummary::from(&group), "invite": invite }))
            }
            Command::GroupInviteReject { invite_id, group } => {
                let selector = invite_selector(invite_id, group)?;
                let rejected = self.groups.reject_invite(actor.id, &selector).await?;
                Ok(json!({ "rejected": rejected }))
            }
            Command::GetGroupInvites => {
                Ok(serde_json::to_value(self.groups.pending_invites(actor.id).await?)?)
            }
            Command::GroupJoinCode { code } => {
                let group = self.groups.join_by_code(&actor, &code).await?;
                self.announce_join(&group, &actor).await;
                Ok(serde_json::to_value(GroupSummary::from(&group))?)
            }
            Command::GroupInviteCode { group } => {
                let group = self.groups.resolve(&group).await?;
                let code = self.groups.generate_invite_code(group.id, actor.id).await?;
                Ok(json!({ "group": group.name, "code": code }))
            }
            Command::GroupLeave { group } => {
                let group = self.groups.resolve(&group).await?;
                let (group, member) = self.groups.leave(group.id, actor.id).await?;
                self.announce_departure(&group, &member, EventType::GroupMemberLeft, None)
                    .await;
                self.notify_line(actor.id, &group.settings.leave_message);
                Ok(json!({ "left": group.name }))
            }

            // === Moderation ===
            Command::GroupKick {
                group,
                player,
                reason,
            } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let (group, kicked) = self
                    .groups
                    .kick(group.id, actor.id, target.id, reason.as_deref())
                    .await?;
                self.announce_departure(&group, &kicked, EventType::GroupMemberKicked, Some(&actor))
                    .await;
                Ok(json!({ "kicked": kicked.identity() }))
            }
            Command::GroupBan {
                group,
                player,
                reason,
            } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let (group, removed) = self.groups.ban(group.id, actor.id, &target, reason).await?;
                match &removed {
                    Some(member) => {
                        self.announce_departure(&group, member, EventType::GroupMemberBanned, Some(&actor))
                            .await;
                    }
                    None => {
                        let data = json!({ "group": group.id, "player": target, "by": actor });
                        self.fan_out(&group, EventType::GroupMemberBanned, generate_id(), data, None)
                            .await;
                    }
                }
                Ok(json!({ "banned": target }))
            }
            Command::GroupUnban { group, player } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let unbanned = self.groups.unban(group.id, actor.id, target.id).await?;
                Ok(json!({ "unbanned": unbanned }))
            }
            Command::GroupMute {
                group,
                player,
                minutes,
            } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let minutes = minutes.unwrap_or(DEFAULT_MUTE_MINUTES);
                let member = self
                    .groups
                    .mute(group.id, actor.id, target.id, Duration::minutes(i64::from(minutes)))
                    .await?;
                self.announce_mute(&group, &member, &actor).await;
                Ok(serde_json::to_value(MemberView::from(&member))?)
            }
            Command::GroupUnmute { group, player } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let member = self.groups.unmute(group.id, actor.id, target.id).await?;
                self.announce_mute(&group, &member, &actor).await;
                Ok(serde_json::to_value(MemberView::from(&member))?)
            }
            Command::GroupPromote { group, player } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let member = self.groups.promote(group.id, actor.id, target.id).await?;
                self.announce_role(&group, &member, &actor).await;
                Ok(serde_json::to_value(MemberView::from(&member))?)
            }
            Command::GroupDemote { group, player } => {
                let group = self.groups.resolve(&group).await?;
                let target = self.player(&player).await?;
                let member = self.groups.demote(group.id, actor.id, target.id).await?;
                self.announce_role(&group, &member, &actor).await;
                Ok(serde_json::to_value(MemberView::from(&member))?)
            }
            Command::GroupSettings { group, settings } => {
                let group = self.groups.resolve(&group).await?;
                let group = self.groups.update_settings(group.id, actor.id, settings).await?;
                let data = json!({
                    "group": group.id,
                    "settings": group.settings,
                    "private": group.private,
                    "description": group.description,
                });
                self.fan_out(&group, EventType::GroupSettingsUpdated, generate_id(), data, None)
                    .await;
                Ok(serde_json::to_value(&group.settings)?)
            }

            // === Group chat ===
            Command::GroupMessage { group, message } => {
                let group = self.groups.resolve(&group).await?;
                let (group, message) = self
                    .groups
                    .post_message(group.id, &actor, &message, source)
                    .await?;
                self.fan_out_message(&group, &actor, &message).await;
                Ok(serde_json::to_value(message)?)
            }
            Command::GroupAnnounce { group, message } => {
                let group = self.groups.resolve(&group).await?;
                let (group, message) = self
                    .groups
                    .post_announcement(group.id, &actor, &message, source)
                    .await?;
                self.fan_out_message(&group, &actor, &message).await;
                Ok(serde_json::to_value(message)?)
            }
            Command::GroupMessageEdit {
                message_id,
                message,
            } => {
                let edited = self
                    .groups
                    .edit_message(message_id, actor.id, &message, source)
                    .await?;
                if let Some(group) = self.groups.get_group(edited.group_id).await? {
                    let data = serde_json::to_value(&edited)?;
                    self.fan_out(&group, EventType::GroupMessageEdited, generate_id(), data, None)
                        .await;
                }
                Ok(serde_json::to_value(edited)?)
            }
            Command::GroupReact { message_id, emoji } => {
                let (message, added) = self
                    .groups
                    .toggle_reaction(message_id, actor.id, &emoji, source)
                    .await?;
                if let Some(group) = self.groups.get_group(message.group_id).await? {
                    let data = json!({
                        "messageId": message.id,
                        "groupId": group.id,
                        "emoji": emoji,
                        "player": actor,
                        "added": added,
                        "reactions": message.reactions,
                    });
                    self.fan_out(&group, EventType::GroupMessageReaction, generate_id(), data, None)
                        .await;
                }
                Ok(json!({ "added": added, "reactions": message.reactions }))
            }

            // === Queries ===
            Command::GetGroups => {
                let groups = self.groups.groups_for(actor.id).await?;
                let summaries: Vec<GroupSummary> = groups.iter().map(GroupSummary::from).collect();
                Ok(serde_json::to_value(summaries)?)
            }
            Command::GetGroup { group } => {
                let group = self.groups.resolve(&group).await?;
                if group.is_member(actor.id) {
                    let members = self.member_views(&group).await;
                    Ok(json!({
                        "group": GroupSummary::from(&group),
                        "settings": group.settings,
                        "members": members,
                        "inviteCode": group.member(actor.id)
                            .filter(|m| m.role.can_manage_group())
                            .and(group.invite_code.clone()),
                    }))
                } else if !group.private {
                    Ok(json!({ "group": GroupSummary::from(&group) }))
                } else {
                    Err(KinshipError::forbidden("This group is private"))
                }
            }
            Command::GetGroupMembers { group } => {
                let group = self.groups.resolve(&group).await?;
                kinship_common::permissions::require_member(&group, actor.id)?;
                Ok(serde_json::to_value(self.member_views(&group).await)?)
            }
            Command::GetGroupMessages { group, limit } => {
                let group = self.groups.resolve(&group).await?;
                kinship_common::permissions::require_member(&group, actor.id)?;
                if source == MessageSource::Web && !group.settings.web_access_enabled {
                    return Err(KinshipError::forbidden("Web access is disabled for this group"));
                }
                let limit = limit.unwrap_or(self.groups.policy().history_limit);
                Ok(serde_json::to_value(self.groups.recent_messages(group.id, limit).await?)?)
            }
            Command::GroupSearch { query, limit } => {
                let limit = limit.unwrap_or(self.groups.policy().search_limit);
                let found = self.groups.search_public_groups(&query, limit).await?;
                let summaries: Vec<GroupSummary> = found.iter().map(GroupSummary::from).collect();
                Ok(serde_json::to_value(summaries)?)
            }

            // === Account ===
            Command::SetWebPassword { password } => {
                if source != MessageSource::World {
                    return Err(KinshipError::forbidden(
                        "Web passwords can only be set from in-world",
                    ));
                }
                self.credentials.set_password(&actor, &password).await?;
                Ok(json!({ "username": actor.name }))
            }
            Command::RemoveWebPassword => {
                if source != MessageSource::World {
                    return Err(KinshipError::forbidden(
                        "Web access can only be turned off from in-world",
                    ));
                }
                let removed = self.credentials.remove_password(actor.id).await?;
                let closed = self.sessions.unregister_player(actor.id).await;
                Ok(json!({ "removed": removed, "sessionsClosed": closed }))
            }
        }
    }

    /// The acting identity and the channel it acts through.
    async fn actor(&self, origin: &Origin) -> KinshipResult<(Identity, MessageSource)> {
        match origin {
            Origin::World(identity) => Ok((identity.clone(), MessageSource::World)),
            Origin::Web { session_id } => self
                .sessions
                .identity_of(session_id)
                .await
                .map(|identity| (identity, MessageSource::Web))
                .ok_or(KinshipError::Unauthenticated),
        }
    }

    async fn player(&self, player: &PlayerRef) -> KinshipResult<Identity> {
        self.players
            .resolve(player)
            .await?
            .ok_or_else(|| KinshipError::not_found(format!("Player '{player}'")))
    }

    /// Presence across both channels. A stopped world loop counts as nobody
    /// being in-world.
    async fn online(&self, players: Vec<Uuid>) -> HashSet<Uuid> {
        let mut online = match self.world.present(players.clone()).await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(error = %e, "Presence query failed");
                HashSet::new()
            }
        };
        for player in players {
            if self.sessions.is_online(player).await {
                online.insert(player);
            }
        }
        online
    }

    async fn friends_of(&self, actor: &Identity) -> KinshipResult<Value> {
        let edges = self.relationships.list(actor.id).await?;
        let online = self.online(edges.iter().map(|e| e.friend_id).collect()).await;
        let friends: Vec<FriendView> = edges
            .into_iter()
            .map(|e| FriendView {
                online: online.contains(&e.friend_id),
                id: e.friend_id,
                name: e.friend_name,
                since: e.timestamp,
            })
            .collect();
        Ok(serde_json::to_value(friends)?)
    }

    async fn member_views(&self, group: &Group) -> Vec<MemberView> {
        let online = self.online(group.member_ids()).await;
        group
            .members
            .iter()
            .map(|m| {
                let mut view = MemberView::from(m);
                view.online = online.contains(&m.player_id);
                view
            })
            .collect()
    }

    async fn friend_message(
        &self,
        actor: &Identity,
        source: MessageSource,
        player: &PlayerRef,
        message: &str,
    ) -> KinshipResult<Value> {
        validate_message(message, self.groups.policy().max_message_length)?;
        let target = self.player(player).await?;
        if !self.relationships.are_friends(actor.id, target.id).await? {
            return Err(KinshipError::forbidden("You can only message your friends"));
        }

        let in_world = match self.world.is_present(target.id).await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(error = %e, "Presence query failed");
                false
            }
        };
        let on_web = self.sessions.is_online(target.id).await;
        if !in_world && !on_web {
            return Err(KinshipError::not_found(format!(
                "Online player '{}'",
                target.name
            )));
        }

        let id = generate_id();
        let sender = self
            .formats
            .speaker(&self.ranks.decorate(actor), source == MessageSource::Web);
        let line = self
            .formats
            .private_message(&sender, &self.ranks.decorate(&target), message);
        self.world.deliver(
            vec![target.id, actor.id],
            WorldLine {
                event_id: id,
                text: line,
            },
        );

        let event = EventEnvelope::new(
            id,
            EventType::FriendMessage,
            json!({ "from": actor, "to": target, "message": message, "source": source }),
        );
        let delivered = self.sessions.send_to_player(target.id, &event).await;
        self.sessions.send_to_player(actor.id, &event).await;

        Ok(json!({ "id": id, "inWorld": in_world, "webSessions": delivered }))
    }

    // === Fan-out ===

    /// Deliver one event to one player on both channels.
    async fn notify(
        &self,
        player: &Identity,
        event_type: EventType,
        event_id: Uuid,
        data: Value,
        line: Option<String>,
    ) {
        if let Some(text) = line {
            self.world.deliver(
                vec![player.id],
                WorldLine {
                    event_id,
                    text: self.formats.notice(&text),
                },
            );
        }
        let event = EventEnvelope::new(event_id, event_type, data);
        self.sessions.send_to_player(player.id, &event).await;
    }

    fn notify_line(&self, player: Uuid, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.world.deliver(
            vec![player],
            WorldLine {
                event_id: generate_id(),
                text: self.formats.notice(text),
            },
        );
    }

    /// Deliver one event to every member of `group`. Web sessions are left
    /// out when the group has web access disabled.
    async fn fan_out(
        &self,
        group: &Group,
        event_type: EventType,
        event_id: Uuid,
        data: Value,
        line: Option<String>,
    ) {
        let recipients = group.member_ids();
        if group.settings.web_access_enabled {
            let event = EventEnvelope::new(event_id, event_type, data);
            for player in &recipients {
                self.sessions.send_to_player(*player, &event).await;
            }
        }
        if let Some(text) = line {
            self.world.deliver(recipients, WorldLine { event_id, text });
        }
    }

    async fn fan_out_message(&self, group: &Group, sender: &Identity, message: &GroupMessage) {
        let speaker = self
            .formats
            .speaker(&self.ranks.decorate(sender), message.source == MessageSource::Web);
        let line = match message.kind {
            MessageKind::Announcement => self.formats.announcement(&group.name, &speaker, &message.content),
            MessageKind::System => self.formats.system(&group.name, &message.content),
            MessageKind::Text => self.formats.group_message(&group.name, &speaker, &message.content),
        };
        let data = json!({ "groupName": group.name, "message": message });
        self.fan_out(group, EventType::GroupMessage, message.id, data, Some(line))
            .await;
    }

    async fn system_message(&self, group: &Group, text: &str) {
        match self.groups.post_system_message(group.id, text).await {
            Ok((group, message)) => {
                let line = self.formats.system(&group.name, &message.content);
                let data = json!({ "groupName": group.name, "message": message });
                self.fan_out(&group, EventType::GroupMessage, message.id, data, Some(line))
                    .await;
            }
            Err(e) => tracing::warn!(group = %group.id, error = %e, "System message failed"),
        }
    }

    async fn announce_join(&self, group: &Group, player: &Identity) {
        let data = json!({ "group": group.id, "groupName": group.name, "player": player });
        self.fan_out(group, EventType::GroupMemberJoined, generate_id(), data, None)
            .await;
        self.system_message(group, &format!("{} joined the group.", player.name))
            .await;
        self.notify_line(player.id, &group.settings.join_message);
    }

    /// Tell the remaining members and the departed player.
    async fn announce_departure(
        &self,
        group: &Group,
        member: &GroupMember,
        event_type: EventType,
        by: Option<&Identity>,
    ) {
        let departed = member.identity();
        let event_id = generate_id();
        let data = json!({
            "group": group.id,
            "groupName": group.name,
            "player": departed,
            "by": by,
        });
        self.fan_out(group, event_type, event_id, data.clone(), None)
            .await;

        let notice = match event_type {
            EventType::GroupMemberKicked => Some(format!("You were kicked from {}.", group.name)),
            EventType::GroupMemberBanned => Some(format!("You were banned from {}.", group.name)),
            _ => None,
        };
        self.notify(&departed, event_type, event_id, data, notice)
            .await;

        let text = match event_type {
            EventType::GroupMemberKicked => format!("{} was kicked from the group.", departed.name),
            EventType::GroupMemberBanned => format!("{} was banned from the group.", departed.name),
            _ => format!("{} left the group.", departed.name),
        };
        self.system_message(group, &text).await;
    }

    async fn announce_mute(&self, group: &Group, member: &GroupMember, by: &Identity) {
        let data = json!({
            "group": group.id,
            "player": member.identity(),
            "muteUntil": member.mute_until.map(|t| t.timestamp_millis()),
            "by": by,
        });
        let notice = match member.mute_until {
            Some(until) => format!(
                "You have been muted in {} until {}.",
                group.name,
                until.format("%Y-%m-%d %H:%M UTC")
            ),
            None => format!("You have been unmuted in {}.", group.name),
        };
        let event_id = generate_id();
        self.fan_out(group, EventType::GroupMemberMuted, event_id, data, None)
            .await;
        self.notify_line(member.player_id, &notice);
    }

    async fn announce_role(&self, group: &Group, member: &GroupMember, by: &Identity) {
        let data = json!({
            "group": group.id,
            "player": member.identity(),
            "role": member.role,
            "by": by,
        });
        let line = self.formats.system(
            &group.name,
            &format!("{} is now {}.", member.player_name, member.role),
        );
        self.fan_out(group, EventType::GroupRoleChanged, generate_id(), data, Some(line))
            .await;
    }
}

fn invite_selector(invite_id: Option<Uuid>, group: Option<GroupRef>) -> KinshipResult<InviteSelector> {
    match (invite_id, group) {
        (Some(id), _) => Ok(InviteSelector::Invite(id)),
        (None, Some(group)) => Ok(InviteSelector::Group(group)),
        (None, None) => Err(KinshipError::validation("Either invite_id or group is required")),
    }
}

/// One log line per failed command, with the operation and who asked.
fn log_failure(op: &str, origin: &Origin, error: &KinshipError) {
    let (channel, who) = match origin {
        Origin::World(identity) => ("world", identity.id.to_string()),
        Origin::Web { session_id } => ("web", session_id.clone()),
    };
    if error.is_transport() {
        tracing::error!(op, channel, origin = %who, error = %error, "Command failed");
    } else {
        tracing::debug!(op, channel, origin = %who, error = %error, "Command rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{LocalRoster, LocalWorld, WorldLoop};
    use kinship_common::ranks::NoRanks;

    async fn router() -> (Router, WorldLoop<LocalWorld>, LocalRoster) {
        let config = kinship_common::config::load("does-not-exist").unwrap();
        let roster = LocalRoster::default();
        let (world_loop, world) = WorldLoop::new(LocalWorld::new(roster.clone()), &config.world);
        let router = Router::new(
            Database::memory(),
            &config,
            Arc::new(SessionRegistry::new()),
            world,
            Arc::new(NoRanks),
        )
        .unwrap();
        (router, world_loop, roster)
    }

    fn command(value: Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn failures_are_wrapped_for_the_caller() {
        let (router, _loop, _) = router().await;
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        let reply = router
            .dispatch(
                &Origin::World(alex),
                command(json!({"type": "friend_request", "data": {"player": "Nobody"}})),
            )
            .await;
        assert_eq!(reply["success"], false);
        assert_eq!(reply["error"]["kind"], "not_found");
    }

    #[tokio::test]
    async fn unauthenticated_web_session_is_refused() {
        let (router, _loop, _) = router().await;
        let reply = router
            .dispatch(&Origin::web("ws-unknown"), command(json!({"type": "get_friends"})))
            .await;
        assert_eq!(reply["error"]["code"], "UNAUTHENTICATED");
    }

    #[tokio::test]
    async fn web_password_only_from_world() {
        let (router, _loop, _) = router().await;
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        let reply = router
            .dispatch(
                &Origin::World(alex.clone()),
                command(json!({"type": "set_web_password", "data": {"password": "hunter22"}})),
            )
            .await;
        assert_eq!(reply["success"], true);

        let sid = router.sessions().register(None).await;
        let creds = Credentials {
            username: "alex".into(),
            password: "hunter22".into(),
        };
        assert_eq!(router.authenticate(&sid, &creds).await.unwrap(), alex);

        let reply = router
            .dispatch(
                &Origin::web(sid),
                command(json!({"type": "set_web_password", "data": {"password": "other1"}})),
            )
            .await;
        assert_eq!(reply["error"]["kind"], "forbidden");
    }

    #[tokio::test]
    async fn world_join_lists_pending_items() {
        let (router, mut world_loop, roster) = router().await;
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        let blair = Identity::new(Uuid::new_v4(), "Blair");
        router.players().remember(&alex).await.unwrap();
        router.relationships().send_request(&alex, &blair).await.unwrap();

        roster.join(blair.id);
        router.world_join(&blair).await.unwrap();
        world_loop.tick();
        let lines = roster.lines_for(blair.id);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].text.contains("1 pending friend request"));
    }

    #[tokio::test]
    async fn removing_the_web_password_closes_sessions() {
        let (router, _loop, _) = router().await;
        let alex = Identity::new(Uuid::new_v4(), "Alex");
        let world = Origin::World(alex.clone());
        router
            .execute(&world, command(json!({"type": "set_web_password", "data": {"password": "hunter22"}})))
            .await
            .unwrap();
        let sid = router.sessions().register(None).await;
        let creds = Credentials {
            username: "Alex".into(),
            password: "hunter22".into(),
        };
        router.authenticate(&sid, &creds).await.unwrap();

        let reply = router
            .dispatch(&Origin::web(&sid), command(json!({"type": "remove_web_password"})))
            .await;
        assert_eq!(reply["error"]["kind"], "forbidden");

        let reply = router
            .execute(&world, command(json!({"type": "remove_web_password"})))
            .await
            .unwrap();
        assert_eq!(reply["removed"], true);
        assert_eq!(reply["sessionsClosed"], 1);
        assert!(router.sessions().identity_of(&sid).await.is_none());

        let again = router.sessions().register(None).await;
        let err = router.authenticate(&again, &creds).await.unwrap_err();
        assert!(matches!(err, KinshipError::Unauthenticated));
    }

    #[tokio::test]
    async fn world_leave_refreshes_the_directory() {
        let (router, _loop, _) = router().await;
        let id = Uuid::new_v4();
        router.world_join(&Identity::new(id, "Alex")).await.unwrap();
        router.world_leave(&Identity::new(id, "Alexa")).await.unwrap();
        let known = router.players().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(known.name, "Alexa");
    }
}
