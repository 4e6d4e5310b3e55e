//! API route modules.

pub mod auth;
pub mod friends;
pub mod groups;
pub mod health;
pub mod host;

use axum::Json;
use kinship_common::error::KinshipResult;
use kinship_gateway::Command;
use serde_json::{json, Value};

use crate::{middleware::AuthContext, AppState};

/// Run `command` as the caller and wrap the result like a gateway reply.
pub(crate) async fn run(
    state: &AppState,
    auth: &AuthContext,
    command: Command,
) -> KinshipResult<Json<Value>> {
    let data = state.router.execute(&auth.origin(), command).await?;
    Ok(Json(json!({ "success": true, "data": data })))
}
