//! Middleware: session authentication and security headers.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use kinship_common::error::KinshipError;
use kinship_common::models::Identity;
use kinship_gateway::Origin;
use std::sync::Arc;

use crate::AppState;

/// The authenticated web session behind a request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub session_id: String,
    pub player: Identity,
}

impl AuthContext {
    pub fn origin(&self) -> Origin {
        Origin::web(&self.session_id)
    }
}

/// Resolve `Authorization: Bearer <session id>` to an authenticated session.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, KinshipError> {
    let session_id = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(KinshipError::Unauthenticated)?
        .to_string();

    let player = state
        .router
        .sessions()
        .identity_of(&session_id)
        .await
        .ok_or(KinshipError::Unauthenticated)?;

    request
        .extensions_mut()
        .insert(AuthContext { session_id, player });

    Ok(next.run(request).await)
}

// ── Security headers ──────────────────────────────────────────────────────────

/// Headers applied to every response:
/// - `X-Content-Type-Options: nosniff`
/// - `X-Frame-Options: DENY`
/// - `Referrer-Policy: no-referrer`
/// - `Cache-Control: no-store` (responses carry per-session data)
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let h = response.headers_mut();

    macro_rules! set {
        ($name:expr, $val:expr) => {
            if let Ok(v) = $val.parse::<axum::http::HeaderValue>() {
                h.insert($name, v);
            }
        };
    }

    set!(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    set!(header::X_FRAME_OPTIONS, "DENY");
    set!(header::REFERRER_POLICY, "no-referrer");
    set!(header::CACHE_CONTROL, "no-store");

    response
}
