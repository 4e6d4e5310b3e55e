//! Web session registry.
//!
//! One registry is built at startup and shared by `Arc` between the
//! WebSocket gateway, the REST API and the fan-out router. Locks are always
//! taken in the order `sessions` then `by_player`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use kinship_common::auth::{CredentialVerifier, Credentials};
use kinship_common::envelope::EventEnvelope;
use kinship_common::error::{KinshipError, KinshipResult};
use kinship_common::models::Identity;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// A secondary (web) connection. REST logins have no outbound queue.
#[derive(Debug)]
pub struct WebSession {
    pub session_id: String,
    pub identity: Option<Identity>,
    outbound: Option<mpsc::Sender<EventEnvelope>>,
    last_used: Mutex<Instant>,
}

impl WebSession {
    fn touch(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// REST sessions live only while they are used. A WebSocket session
    /// lives as long as its connection.
    fn is_expired(&self, rest_idle: Option<Duration>) -> bool {
        self.outbound.is_none() && rest_idle.is_some_and(|limit| self.idle_for() > limit)
    }
}

/// Tracks all web sessions and which identities they belong to.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// session_id → session
    sessions: RwLock<HashMap<String, WebSession>>,
    /// player → authenticated session ids (one player may hold several)
    by_player: RwLock<HashMap<Uuid, Vec<String>>>,
    /// Idle time after which a REST session is no longer accepted.
    rest_idle: Option<Duration>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose REST sessions expire after `rest_idle` without use.
    pub fn with_rest_idle(rest_idle: Duration) -> Self {
        Self {
            rest_idle: Some(rest_idle),
            ..Self::default()
        }
    }

    /// Register an unauthenticated session and return its id.
    pub async fn register(&self, outbound: Option<mpsc::Sender<EventEnvelope>>) -> String {
        let prefix = if outbound.is_some() { "ws" } else { "rest" };
        let session_id = format!("{prefix}-{}", Uuid::new_v4());
        let session = WebSession {
            session_id: session_id.clone(),
            identity: None,
            outbound,
            last_used: Mutex::new(Instant::now()),
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), session);
        tracing::debug!(session = %session_id, "Session registered");
        session_id
    }

    /// Check credentials and bind the session to the resulting identity.
    pub async fn authenticate<V: CredentialVerifier>(
        &self,
        session_id: &str,
        credentials: &Credentials,
        verifier: &V,
    ) -> KinshipResult<Identity> {
        if !self.sessions.read().await.contains_key(session_id) {
            return Err(KinshipError::Unauthenticated);
        }

        let identity = verifier
            .verify(credentials)
            .await?
            .ok_or(KinshipError::Unauthenticated)?;

        let mut sessions = self.sessions.write().await;
        // The session may have closed while credentials were checked.
        let session = sessions
            .get_mut(session_id)
            .ok_or(KinshipError::Unauthenticated)?;
        session.touch();
        let previous = session.identity.replace(identity.clone());

        let mut by_player = self.by_player.write().await;
        if let Some(previous) = previous {
            detach(&mut by_player, previous.id, session_id);
        }
        by_player
            .entry(identity.id)
            .or_default()
            .push(session_id.to_string());

        tracing::info!(session = %session_id, player = %identity.id, "Session authenticated");
        Ok(identity)
    }

    /// Forget a session. Events already queued for it may still be dropped.
    pub async fn unregister(&self, session_id: &str) -> Option<Identity> {
        let mut sessions = self.sessions.write().await;
        let identity = sessions.remove(session_id)?.identity;
        if let Some(identity) = &identity {
            detach(&mut *self.by_player.write().await, identity.id, session_id);
        }
        tracing::debug!(session = %session_id, "Session unregistered");
        identity
    }

    /// Authenticated session ids held by `player`.
    pub async fn sessions_for(&self, player: Uuid) -> Vec<String> {
        self.by_player
            .read()
            .await
            .get(&player)
            .cloned()
            .unwrap_or_default()
    }

    /// The identity behind a session. Counts as use of the session; an
    /// expired REST session resolves to nothing.
    pub async fn identity_of(&self, session_id: &str) -> Option<Identity> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(session_id)?;
        if session.is_expired(self.rest_idle) {
            return None;
        }
        session.touch();
        session.identity.clone()
    }

    /// Drop REST sessions idle for longer than the configured limit.
    /// Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.is_expired(self.rest_idle))
            .map(|s| s.session_id.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut by_player = self.by_player.write().await;
        for session_id in &expired {
            if let Some(identity) = sessions.remove(session_id).and_then(|s| s.identity) {
                detach(&mut by_player, identity.id, session_id);
            }
        }
        tracing::debug!(count = expired.len(), "Evicted idle REST sessions");
        expired.len()
    }

    /// Run [`Self::evict_idle`] every `period` on the runtime.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.evict_idle().await;
            }
        })
    }

    /// Forget every session of `player`. Returns how many were closed.
    pub async fn unregister_player(&self, player: Uuid) -> usize {
        let ids = self.sessions_for(player).await;
        for session_id in &ids {
            self.unregister(session_id).await;
        }
        ids.len()
    }

    /// Queue an event without waiting. Returns whether it was queued; a full
    /// or closed queue drops the event for this session only.
    pub async fn send(&self, session_id: &str, event: EventEnvelope) -> bool {
        let sessions = self.sessions.read().await;
        let Some(outbound) = sessions.get(session_id).and_then(|s| s.outbound.as_ref()) else {
            return false;
        };
        match outbound.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                tracing::warn!(session = %session_id, event = %event.event_type, "Outbound queue full, dropping event");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Send to every authenticated session of `player`. Returns how many
    /// sessions accepted the event.
    pub async fn send_to_player(&self, player: Uuid, event: &EventEnvelope) -> usize {
        let mut delivered = 0;
        for session_id in self.sessions_for(player).await {
            if self.send(&session_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Whether the player holds at least one authenticated session.
    pub async fn is_online(&self, player: Uuid) -> bool {
        self.by_player
            .read()
            .await
            .get(&player)
            .is_some_and(|sessions| !sessions.is_empty())
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

fn detach(by_player: &mut HashMap<Uuid, Vec<String>>, player: Uuid, session_id: &str) {
    if let Some(ids) = by_player.get_mut(&player) {
        ids.retain(|s| s != session_id);
        if ids.is_empty() {
            by_player.remove(&player);
        }
    }
}
