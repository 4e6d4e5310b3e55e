//! Group routes: lifecycle, invites, moderation, and chat.
//!
//! `{group}` accepts a group id or a (case-insensitive) group name, and
//! `{player}` a player id or name.

use axum::{
    extract::{Extension, Path, Query, State},
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use kinship_common::{
    error::KinshipResult,
    models::{CreateGroupRequest, GroupRef, PlayerRef, SettingsPatch},
    validation::validate_request,
};
use kinship_gateway::Command;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::run;
use crate::{middleware::AuthContext, AppState};

/// Group routes.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/groups", get(list_my_groups).post(create_group))
        .route("/groups/search", get(search_groups))
        .route("/groups/{group}", get(get_group))
        .route("/groups/{group}/settings", patch(update_settings))
        .route("/groups/{group}/leave", post(leave_group))
        .route("/groups/{group}/invites", post(invite_player))
        .route("/groups/{group}/invite-code", post(regenerate_code))
        .route("/groups/{group}/messages", get(list_messages).post(post_message))
        .route("/groups/{group}/announcements", post(post_announcement))
        .route("/groups/{group}/members", get(list_members))
        .route("/groups/{group}/members/{player}/kick", post(kick_member))
        .route("/groups/{group}/members/{player}/ban", post(ban_member).delete(unban_member))
        .route("/groups/{group}/members/{player}/mute", post(mute_member).delete(unmute_member))
        .route("/groups/{group}/members/{player}/promote", post(promote_member))
        .route("/groups/{group}/members/{player}/demote", post(demote_member))
        .route("/invites", get(list_invites))
        .route("/invites/{invite_id}/accept", post(accept_invite))
        .route("/invites/{invite_id}/reject", post(reject_invite))
        .route("/invite-codes/{code}/join", post(join_via_code))
        .route("/messages/{message_id}", patch(edit_message))
        .route("/messages/{message_id}/reactions", post(react))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

#[derive(Deserialize)]
struct PlayerBody {
    player: PlayerRef,
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

#[derive(Deserialize)]
struct ReactionBody {
    emoji: String,
}

#[derive(Deserialize)]
struct ReasonQuery {
    reason: Option<String>,
}

#[derive(Deserialize)]
struct MuteQuery {
    minutes: Option<u32>,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<u32>,
}

fn group_ref(raw: &str) -> GroupRef {
    GroupRef::from(raw)
}

/// GET /api/v1/groups: groups the caller belongs to.
async fn list_my_groups(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GetGroups).await
}

/// POST /api/v1/groups
async fn create_group(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateGroupRequest>,
) -> KinshipResult<Json<Value>> {
    validate_request(&body)?;
    run(&state, &auth, Command::GroupCreate(body)).await
}

/// GET /api/v1/groups/search?q=...&limit=...: public groups only.
async fn search_groups(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupSearch {
        query: query.q,
        limit: query.limit,
    };
    run(&state, &auth, command).await
}

async fn get_group(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GetGroup { group: group_ref(&group) }).await
}

async fn update_settings(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(settings): Json<SettingsPatch>,
) -> KinshipResult<Json<Value>> {
    validate_request(&settings)?;
    let command = Command::GroupSettings {
        group: group_ref(&group),
        settings,
    };
    run(&state, &auth, command).await
}

async fn leave_group(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GroupLeave { group: group_ref(&group) }).await
}

// ── Invites ───────────────────────────────────────────────────────────────────

async fn invite_player(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(body): Json<PlayerBody>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupInvite {
        group: group_ref(&group),
        player: body.player,
    };
    run(&state, &auth, command).await
}

/// POST /api/v1/groups/{group}/invite-code: replaces any previous code.
async fn regenerate_code(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GroupInviteCode { group: group_ref(&group) }).await
}

/// GET /api/v1/invites: pending invites addressed to the caller.
async fn list_invites(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GetGroupInvites).await
}

async fn accept_invite(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(invite_id): Path<Uuid>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupInviteAccept {
        invite_id: Some(invite_id),
        group: None,
    };
    run(&state, &auth, command).await
}

async fn reject_invite(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(invite_id): Path<Uuid>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupInviteReject {
        invite_id: Some(invite_id),
        group: None,
    };
    run(&state, &auth, command).await
}

async fn join_via_code(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GroupJoinCode { code }).await
}

// ── Members & moderation ──────────────────────────────────────────────────────

async fn list_members(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GetGroupMembers { group: group_ref(&group) }).await
}

async fn kick_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
    Query(query): Query<ReasonQuery>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupKick {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
        reason: query.reason,
    };
    run(&state, &auth, command).await
}

async fn ban_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
    Query(query): Query<ReasonQuery>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupBan {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
        reason: query.reason,
    };
    run(&state, &auth, command).await
}

async fn unban_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupUnban {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
    };
    run(&state, &auth, command).await
}

/// POST /api/v1/groups/{group}/members/{player}/mute?minutes=N: defaults to an hour.
async fn mute_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
    Query(query): Query<MuteQuery>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupMute {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
        minutes: query.minutes,
    };
    run(&state, &auth, command).await
}

async fn unmute_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupUnmute {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
    };
    run(&state, &auth, command).await
}

async fn promote_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupPromote {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
    };
    run(&state, &auth, command).await
}

async fn demote_member(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((group, player)): Path<(String, String)>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupDemote {
        group: group_ref(&group),
        player: PlayerRef::from(player.as_str()),
    };
    run(&state, &auth, command).await
}

// ── Chat ──────────────────────────────────────────────────────────────────────

/// GET /api/v1/groups/{group}/messages?limit=N: oldest first.
async fn list_messages(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Query(query): Query<LimitQuery>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GetGroupMessages {
        group: group_ref(&group),
        limit: query.limit,
    };
    run(&state, &auth, command).await
}

async fn post_message(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(body): Json<MessageBody>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupMessage {
        group: group_ref(&group),
        message: body.message,
    };
    run(&state, &auth, command).await
}

async fn post_announcement(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(body): Json<MessageBody>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupAnnounce {
        group: group_ref(&group),
        message: body.message,
    };
    run(&state, &auth, command).await
}

async fn edit_message(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<MessageBody>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupMessageEdit {
        message_id,
        message: body.message,
    };
    run(&state, &auth, command).await
}

/// POST /api/v1/messages/{message_id}/reactions: toggles the caller's reaction.
async fn react(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReactionBody>,
) -> KinshipResult<Json<Value>> {
    let command = Command::GroupReact {
        message_id,
        emoji: body.emoji,
    };
    run(&state, &auth, command).await
}
