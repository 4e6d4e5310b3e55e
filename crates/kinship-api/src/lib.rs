//! # kinship-api
//!
//! REST API layer for Kinship. Each endpoint maps onto a router command run
//! on behalf of the caller's web session, so REST and WebSocket clients get
//! the same checks and trigger the same fan-out.
//!
//! [`build_host_router`] serves the separate ingress used by the world host.

pub mod middleware;
pub mod routes;

use axum::Router;
use kinship_gateway::{Router as CommandRouter, WorldHost};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<CommandRouter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(router: Arc<CommandRouter>) -> Self {
        Self {
            router,
            started_at: Instant::now(),
        }
    }
}

/// State of the world host ingress.
pub struct HostState {
    pub host: WorldHost,
    /// Shared secret; `None` leaves the ingress open to whoever can reach it.
    pub token: Option<String>,
}

impl HostState {
    pub fn new(host: WorldHost, token: Option<String>) -> Self {
        Self {
            host,
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

/// Build the world host ingress, mounted at `/host/v1`.
pub fn build_host_router(state: HostState) -> Router {
    let state = Arc::new(state);
    Router::new()
        .nest("/host/v1", routes::host::router(state.clone()))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api_routes = Router::new()
        .merge(routes::auth::router(state.clone()))
        .merge(routes::friends::router(state.clone()))
        .merge(routes::groups::router(state.clone()))
        .merge(routes::health::router());

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(state)
}
