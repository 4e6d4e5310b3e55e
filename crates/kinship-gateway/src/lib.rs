//! # kinship-gateway
//!
//! Everything between the stores and the two delivery channels:
//! - [`session::SessionRegistry`]: web sessions and who they belong to
//! - [`world`]: the bounded bridge into the single-threaded world loop
//! - [`router::Router`]: runs commands and fans results out to both channels
//! - [`host::WorldHost`]: presence, commands and lines for the world host
//! - the `/ws` WebSocket endpoint for web clients
//!
//! Frames on the socket:
//! - Server → Client `connection` once, with the session id
//! - Client → Server `auth` with `{username, password}`
//! - Client → Server `ping`, answered by `pong`
//! - Client → Server any command frame, answered by a `response` frame
//!   `{request, success, data | error}`
//! - Server → Client event envelopes `{id, type, data, timestamp}`

pub mod commands;
pub mod format;
pub mod host;
pub mod router;
pub mod session;
pub mod world;

pub use commands::{Command, Origin};
pub use host::WorldHost;
pub use router::Router;
pub use session::SessionRegistry;
pub use world::{LocalRoster, LocalWorld, World, WorldHandle, WorldLine, WorldLoop};

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use kinship_common::auth::Credentials;
use kinship_common::envelope::{EventEnvelope, InboundFrame};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Gateway state.
#[derive(Clone)]
pub struct GatewayState {
    pub router: Arc<Router>,
    /// Per-session outbound queue size; events beyond it are dropped.
    pub outbound_capacity: usize,
}

impl GatewayState {
    pub fn new(router: Arc<Router>, outbound_capacity: usize) -> Self {
        Self {
            router,
            outbound_capacity: outbound_capacity.max(1),
        }
    }
}

/// Build the gateway WebSocket router.
pub fn build_router(state: GatewayState) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(ws_handler))
        .with_state(Arc::new(state))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// Reply frame for a request of type `request`.
fn response(request: &str, reply: Value) -> EventEnvelope {
    let mut data = json!({ "request": request });
    if let (Some(data), Value::Object(reply)) = (data.as_object_mut(), reply) {
        data.extend(reply);
    }
    EventEnvelope::fresh("response", data)
}

/// Handle a single WebSocket connection.
async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut sender, mut receiver) = socket.split();
    let router = state.router.clone();

    // Events from the fan-out router.
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<EventEnvelope>(state.outbound_capacity);
    // Replies to this connection's own requests.
    let (direct_tx, mut direct_rx) = mpsc::channel::<EventEnvelope>(64);

    let session_id = router.sessions().register(Some(outbound_tx)).await;

    let hello = EventEnvelope::fresh("connection", json!({ "sessionId": session_id }));
    let Ok(hello) = serde_json::to_string(&hello) else {
        router.sessions().unregister(&session_id).await;
        return;
    };
    if sender.send(Message::Text(hello.into())).await.is_err() {
        router.sessions().unregister(&session_id).await;
        return;
    }

    // ── Sender task ──────────────────────────────────────────────────────────
    // Merges fanned-out events and direct replies onto the single socket sender.
    let send_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(event) = outbound_rx.recv() => event,
                Some(direct) = direct_rx.recv() => direct,
                else => break,
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unserializable frame");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // ── Receive loop ─────────────────────────────────────────────────────────
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let Ok(raw) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                let Ok(frame) = serde_json::from_value::<InboundFrame>(raw.clone()) else {
                    continue;
                };
                let reply = match frame.frame_type.as_str() {
                    "ping" => EventEnvelope::fresh(
                        "pong",
                        json!({ "timestamp": chrono::Utc::now().timestamp_millis() }),
                    ),
                    "auth" => {
                        let result = match serde_json::from_value::<Credentials>(frame.data) {
                            Ok(credentials) => router.authenticate(&session_id, &credentials).await,
                            Err(e) => Err(kinship_common::error::KinshipError::validation(
                                e.to_string(),
                            )),
                        };
                        let reply = match result {
                            Ok(identity) => json!({ "success": true, "data": identity }),
                            Err(e) => json!({ "success": false, "error": e.body() }),
                        };
                        response("auth", reply)
                    }
                    request => {
                        let reply = match serde_json::from_value::<Command>(raw) {
                            Ok(command) => router.dispatch(&Origin::web(&session_id), command).await,
                            Err(e) => json!({
                                "success": false,
                                "error": kinship_common::error::KinshipError::validation(
                                    format!("Invalid request: {e}")
                                ).body(),
                            }),
                        };
                        response(request, reply)
                    }
                };
                if direct_tx.send(reply).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    let identity = router.sessions().unregister(&session_id).await;
    send_task.abort();
    tracing::info!(
        session = %session_id,
        player = ?identity.map(|i| i.id),
        "Client disconnected from gateway"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_frames_carry_the_request_name() {
        let frame = response("get_friends", json!({ "success": true, "data": [] }));
        assert_eq!(frame.event_type, "response");
        assert_eq!(frame.data["request"], "get_friends");
        assert_eq!(frame.data["success"], true);
    }
}
