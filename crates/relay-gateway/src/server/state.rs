//! Relay state
//!
//! Application state shared by every upgrade request.

use crate::session::{ForwardOptions, Session, SessionRegistry};
use relay_common::RelayConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Result of asking for a session slot
#[derive(Debug)]
pub enum Admission {
    /// No session limit is configured
    Unlimited,
    /// A slot was taken; it is released when the permit drops
    Admitted(OwnedSemaphorePermit),
    /// Every slot is in use
    Full,
}

/// Relay application state
///
/// Holds the shared dependencies for the relay server. Nothing in here is
/// touched on the data path of a session.
#[derive(Clone)]
pub struct RelayState {
    /// Relay configuration
    config: Arc<RelayConfig>,
    /// Live session registry
    registry: Arc<SessionRegistry>,
    /// Session slots, when a limit is configured
    admission: Option<Arc<Semaphore>>,
    /// Relay-wide shutdown; each session holds a child of it
    shutdown: CancellationToken,
    /// Tracks session tasks so shutdown can wait for them
    tracker: TaskTracker,
}

impl RelayState {
    /// Create a new relay state
    pub fn new(config: RelayConfig) -> Self {
        let admission = config
            .session
            .max_sessions
            .map(|limit| Arc::new(Semaphore::new(limit)));

        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new_shared(),
            admission,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Get the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get the relay-wide shutdown token
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Get the session task tracker
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Forwarding options derived from the session configuration
    pub fn forward_options(&self) -> ForwardOptions {
        ForwardOptions {
            chunk_size: self.config.session.chunk_size,
            idle_timeout: self.config.session.idle_timeout(),
        }
    }

    /// Try to take a session slot
    pub fn admit(&self) -> Admission {
        match &self.admission {
            None => Admission::Unlimited,
            Some(slots) => match Arc::clone(slots).try_acquire_owned() {
                Ok(permit) => Admission::Admitted(permit),
                Err(_) => Admission::Full,
            },
        }
    }

    /// Create a session for a newly accepted client
    pub fn new_session(&self, peer: SocketAddr) -> Session {
        Session::new(
            peer,
            self.config.upstream.clone(),
            self.forward_options(),
            Arc::clone(&self.registry),
            self.shutdown.clone(),
        )
    }
}

impl std::fmt::Debug for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayState")
            .field("upstream", &self.config.upstream.address)
            .field("active_sessions", &self.registry.active_count())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
