//! Authentication routes: login and logout.
//!
//! There is no registration here. A player sets their web password from
//! in-world, then logs in with their player name. The returned token is the
//! session id and goes in `Authorization: Bearer <token>`.

use axum::{
    extract::{Extension, State},
    middleware,
    routing::post,
    Json, Router,
};
use kinship_common::{auth::Credentials, error::KinshipResult, models::Identity};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{middleware::AuthContext, AppState};

/// Auth router.
pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .route_layer(middleware::from_fn_with_state(
            state,
            crate::middleware::auth_middleware,
        ));

    Router::new()
        .route("/auth/login", post(login))
        .merge(protected)
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    player: Identity,
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Credentials>,
) -> KinshipResult<Json<LoginResponse>> {
    let sessions = state.router.sessions();
    let session_id = sessions.register(None).await;

    match state.router.authenticate(&session_id, &body).await {
        Ok(player) => Ok(Json(LoginResponse {
            token: session_id,
            player,
        })),
        Err(e) => {
            sessions.unregister(&session_id).await;
            Err(e)
        }
    }
}

/// POST /api/v1/auth/logout
async fn logout(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> Json<Value> {
    state.router.sessions().unregister(&auth.session_id).await;
    tracing::debug!(player = %auth.player.id, "Logged out");
    Json(json!({ "success": true }))
}
