//! # Kinship Server
//!
//! Main binary that wires everything into one process:
//! - document store (in-memory or SQLite)
//! - the authoritative world loop on its own thread
//! - REST API (HTTP)
//! - WebSocket gateway (real-time events)
//! - world host ingress (presence and in-world commands)

use clap::Parser;
use kinship_api::{build_host_router, build_router, AppState, HostState};
use kinship_db::Database;
use kinship_gateway::{
    GatewayState, LocalRoster, LocalWorld, Router, SessionRegistry, WorldHost, WorldLoop,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "kinship", version, about = "Friends and groups across the world and the web")]
struct Cli {
    /// Config file path, without extension.
    #[arg(long, env = "KINSHIP_CONFIG", default_value = "config")]
    config: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = kinship_common::config::load(&cli.config)?;

    // Initialize tracing (structured logging)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kinship=debug,tower_http=debug".into());
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }

    tracing::info!("Starting Kinship v{}", env!("CARGO_PKG_VERSION"));

    // Connect to the document store and run migrations
    let db = Database::connect(&config).await?;
    db.migrate().await?;

    let ranks = kinship_common::ranks::select(&config.ranks)?;

    // === Authoritative loop ===
    // Owns the world; async code reaches it only through the bounded task queue.
    let roster = LocalRoster::default();
    let (world_loop, world) = WorldLoop::new(LocalWorld::new(roster.clone()), &config.world);
    let _world_thread = world_loop.spawn()?;

    // === Fan-out router ===
    let sessions = Arc::new(SessionRegistry::with_rest_idle(Duration::from_secs(
        config.gateway.rest_session_idle_secs,
    )));
    let _sweeper =
        sessions.spawn_sweeper(Duration::from_secs(config.gateway.session_sweep_secs.max(1)));
    let router = Arc::new(Router::new(db, &config, sessions, world, ranks)?);

    // === World host ingress ===
    let host_addr = SocketAddr::new(config.host.bind.parse()?, config.host.port);
    if config.host.token.is_none() && !host_addr.ip().is_loopback() {
        tracing::warn!(%host_addr, "Host ingress is reachable off-host without a token");
    }
    let host_router = build_host_router(HostState::new(
        WorldHost::new(router.clone(), roster),
        config.host.token.clone(),
    ));

    // === REST API Server ===
    let api_router = build_router(AppState::new(router.clone()));
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.api_port);

    // === WebSocket Gateway ===
    let gateway_state = GatewayState::new(router, config.gateway.outbound_capacity);
    let gateway_router = kinship_gateway::build_router(gateway_state);
    let gateway_addr = SocketAddr::new(config.server.host.parse()?, config.server.gateway_port);

    tracing::info!("REST API listening on http://{api_addr}");
    tracing::info!("Gateway listening on ws://{gateway_addr}/ws");
    tracing::info!("Host ingress listening on http://{host_addr}/host/v1");

    // Run all listeners concurrently
    tokio::try_join!(
        // REST API
        async {
            let listener = tokio::net::TcpListener::bind(api_addr).await?;
            axum::serve(listener, api_router).await?;
            Ok::<_, anyhow::Error>(())
        },
        // WebSocket Gateway
        async {
            let listener = tokio::net::TcpListener::bind(gateway_addr).await?;
            axum::serve(listener, gateway_router).await?;
            Ok::<_, anyhow::Error>(())
        },
        // World host ingress
        async {
            let listener = tokio::net::TcpListener::bind(host_addr).await?;
            axum::serve(listener, host_router).await?;
            Ok::<_, anyhow::Error>(())
        },
    )?;

    Ok(())
}
