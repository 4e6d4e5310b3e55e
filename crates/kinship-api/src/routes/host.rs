//! World host ingress.
//!
//! The process running the world reports who is present and forwards the
//! commands its players type. Served on its own listener, on loopback by
//! default, and guarded by a shared token when one is configured.

use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::Identity;
use kinship_gateway::{Command, WorldHost};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::HostState;

pub fn router(state: Arc<HostState>) -> Router<Arc<HostState>> {
    Router::new()
        .route("/players/{player}/join", post(join))
        .route("/players/{player}/leave", post(leave))
        .route("/players/{player}/commands", post(run_command))
        .route("/players/{player}/lines", get(take_lines))
        .route_layer(middleware::from_fn_with_state(state, host_auth))
}

/// Require `Authorization: Bearer <host token>` when a token is configured.
async fn host_auth(
    State(state): State<Arc<HostState>>,
    request: Request,
    next: Next,
) -> Result<Response, KinshipError> {
    if let Some(token) = &state.token {
        let presented = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);
        if presented != Some(token.as_str()) {
            return Err(KinshipError::Unauthenticated);
        }
    }
    Ok(next.run(request).await)
}

#[derive(Deserialize)]
struct JoinBody {
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineView {
    event_id: Uuid,
    text: String,
}

fn host(state: &HostState) -> &WorldHost {
    &state.host
}

/// POST /host/v1/players/{player}/join
async fn join(
    State(state): State<Arc<HostState>>,
    Path(player): Path<Uuid>,
    Json(body): Json<JoinBody>,
) -> KinshipResult<Json<Value>> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(KinshipError::validation("Player name is required"));
    }
    let identity = Identity::new(player, name);
    host(&state).join(&identity).await?;
    Ok(Json(json!({ "success": true, "data": identity })))
}

/// POST /host/v1/players/{player}/leave
async fn leave(
    State(state): State<Arc<HostState>>,
    Path(player): Path<Uuid>,
) -> KinshipResult<Json<Value>> {
    let was_present = host(&state).leave(player).await?;
    Ok(Json(json!({ "success": true, "data": { "wasPresent": was_present } })))
}

/// POST /host/v1/players/{player}/commands
async fn run_command(
    State(state): State<Arc<HostState>>,
    Path(player): Path<Uuid>,
    Json(command): Json<Command>,
) -> KinshipResult<Json<Value>> {
    let data = host(&state).command(player, command).await?;
    Ok(Json(json!({ "success": true, "data": data })))
}

/// GET /host/v1/players/{player}/lines: lines to show in the world, once.
async fn take_lines(
    State(state): State<Arc<HostState>>,
    Path(player): Path<Uuid>,
) -> Json<Value> {
    let lines: Vec<LineView> = host(&state)
        .take_lines(player)
        .into_iter()
        .map(|line| LineView {
            event_id: line.event_id,
            text: line.text,
        })
        .collect();
    Json(json!({ "success": true, "data": lines }))
}
