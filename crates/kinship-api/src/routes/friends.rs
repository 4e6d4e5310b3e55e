//! Friend routes: requests, the friend list, and private messages.

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use kinship_common::{error::KinshipResult, models::PlayerRef};
use kinship_gateway::Command;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::run;
use crate::{middleware::AuthContext, AppState};

/// Friend routes.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/friends", get(list_friends))
        .route("/friends/{player}", delete(remove_friend))
        .route("/friends/{player}/messages", post(message_friend))
        .route("/friends/requests", get(list_requests).post(send_request))
        .route("/friends/requests/{player}", delete(cancel_request))
        .route("/friends/requests/{player}/accept", post(accept_request))
        .route("/friends/requests/{player}/deny", post(deny_request))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ))
}

#[derive(Deserialize)]
struct SendRequestBody {
    player: PlayerRef,
}

#[derive(Deserialize)]
struct MessageBody {
    message: String,
}

/// GET /api/v1/friends
async fn list_friends(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GetFriends).await
}

/// GET /api/v1/friends/requests: incoming and outgoing.
async fn list_requests(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::GetFriendRequests).await
}

/// POST /api/v1/friends/requests
async fn send_request(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendRequestBody>,
) -> KinshipResult<Json<Value>> {
    run(&state, &auth, Command::FriendRequest { player: body.player }).await
}

async fn accept_request(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> KinshipResult<Json<Value>> {
    let player = PlayerRef::from(player.as_str());
    run(&state, &auth, Command::FriendAccept { player }).await
}

async fn deny_request(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> KinshipResult<Json<Value>> {
    let player = PlayerRef::from(player.as_str());
    run(&state, &auth, Command::FriendDeny { player }).await
}

/// DELETE /api/v1/friends/requests/{player}: withdraw an outgoing request.
async fn cancel_request(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> KinshipResult<Json<Value>> {
    let player = PlayerRef::from(player.as_str());
    run(&state, &auth, Command::FriendCancel { player }).await
}

/// DELETE /api/v1/friends/{player}
async fn remove_friend(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
) -> KinshipResult<Json<Value>> {
    let player = PlayerRef::from(player.as_str());
    run(&state, &auth, Command::FriendRemove { player }).await
}

/// POST /api/v1/friends/{player}/messages
async fn message_friend(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(player): Path<String>,
    Json(body): Json<MessageBody>,
) -> KinshipResult<Json<Value>> {
    let player = PlayerRef::from(player.as_str());
    run(
        &state,
        &auth,
        Command::FriendMessage {
            player,
            message: body.message,
        },
    )
    .await
}
