//! Session registry
//!
//! Tracks live sessions using DashMap for thread-safe access. Sessions
//! never read each other's entries; the registry exists for logging and for
//! observing that every session is gone after teardown.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the registry knows about one live session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Client address
    pub peer: SocketAddr,
    /// Upstream address dialed for this session
    pub upstream: String,
    /// When the upstream connection was established
    pub started_at: Instant,
}

impl SessionInfo {
    #[must_use]
    pub fn new(peer: SocketAddr, upstream: impl Into<String>) -> Self {
        Self {
            peer,
            upstream: upstream.into(),
            started_at: Instant::now(),
        }
    }

    /// Get session age
    pub fn age(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Registry of live sessions keyed by session ID
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, SessionInfo>,
}

impl SessionRegistry {
    /// Create a new, empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new registry wrapped in Arc
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a session; it stays registered until the guard is dropped
    pub fn register(self: &Arc<Self>, session_id: &str, info: SessionInfo) -> SessionGuard {
        self.sessions.insert(session_id.to_string(), info);

        tracing::debug!(
            session_id = %session_id,
            active_sessions = self.sessions.len(),
            "Session registered"
        );

        SessionGuard {
            registry: Arc::clone(self),
            session_id: session_id.to_string(),
        }
    }

    fn remove(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            tracing::debug!(
                session_id = %session_id,
                active_sessions = self.sessions.len(),
                "Session removed"
            );
        }
    }

    /// Get a session by ID
    pub fn get(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions.get(session_id).map(|r| r.clone())
    }

    /// Number of live sessions
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

/// Removes its session from the registry when dropped
///
/// Held for the whole session, so removal happens on every exit path,
/// including a panic in the session task.
#[derive(Debug)]
pub struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.session_id);
    }
}
