//! Registry of live streaming sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::params::SessionParams;

/// Bridge lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Upstream dial in progress
    Connecting,
    /// Both sockets open, frames relayed both ways
    Active,
    /// One side closed; remaining frames flushed to the other
    Draining,
    /// Both sockets closed
    Closed,
}

/// Registry entry for one session
#[derive(Debug, Clone)]
struct SessionEntry {
    params: SessionParams,
    state: BridgeState,
    started: Instant,
}

/// Public view of a live session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session id
    pub id: String,
    /// Current state
    pub state: BridgeState,
    /// Negotiated parameters
    pub params: SessionParams,
    /// Seconds since the session opened
    pub age_secs: u64,
}

/// Tracks every live bridge session.
///
/// Entries are owned by a [`SessionGuard`]; dropping the guard removes the
/// entry, so a bridge task that ends for any reason releases its slot.
/// [`SessionRegistry::shutdown`] cancels every guard's token, including
/// those of sessions opened afterwards.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in `Connecting` state
    pub fn open(self: &Arc<Self>, params: SessionParams) -> SessionGuard {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionEntry {
                params,
                state: BridgeState::Connecting,
                started: Instant::now(),
            },
        );
        SessionGuard {
            id,
            registry: Arc::clone(self),
            cancel: self.shutdown.child_token(),
        }
    }

    /// Ask every live session to close
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Number of live sessions
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// State of a session
    pub fn state(&self, id: Uuid) -> Option<BridgeState> {
        self.sessions.get(&id).map(|entry| entry.state)
    }

    /// Snapshot of all live sessions
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|entry| SessionInfo {
                id: entry.key().to_string(),
                state: entry.state,
                params: entry.params.clone(),
                age_secs: entry.started.elapsed().as_secs(),
            })
            .collect()
    }

    /// Wait until no session is live or `timeout` passes; returns whether it drained
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }
}

/// Ownership of one registry entry.
#[derive(Debug)]
pub struct SessionGuard {
    id: Uuid,
    registry: Arc<SessionRegistry>,
    cancel: CancellationToken,
}

impl SessionGuard {
    /// Session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancelled when the registry shuts down
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record a state transition
    pub fn transition(&self, state: BridgeState) {
        if let Some(mut entry) = self.registry.sessions.get_mut(&self.id) {
            tracing::debug!(session = %self.id, from = ?entry.state, to = ?state, "bridge state");
            entry.state = state;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.sessions.remove(&self.id);
    }
}
