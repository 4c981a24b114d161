//! Session error types
//!
//! None of these leave the session that raised them; they only pick the
//! close code and end up in the teardown log line.

use crate::protocol::CloseCode;
use std::io;
use std::time::Duration;

/// Boxed error from the framed (WebSocket) side
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to set up a session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to connect to upstream {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Timed out connecting to upstream {addr} after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    #[error("Session cancelled before upstream connected")]
    Cancelled,
}

impl SessionError {
    /// Close code sent to the client for this failure
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::Dial { .. } | Self::DialTimeout { .. } => CloseCode::BadGateway,
            Self::Cancelled => CloseCode::GoingAway,
        }
    }
}

/// Failure that stops one forwarding direction
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Upstream read failed: {0}")]
    UpstreamRead(#[source] io::Error),

    #[error("Upstream write failed: {0}")]
    UpstreamWrite(#[source] io::Error),

    #[error("Client receive failed: {0}")]
    ClientReceive(#[source] BoxError),

    #[error("Client send failed: {0}")]
    ClientSend(#[source] BoxError),

    #[error("No data within {0:?}")]
    IdleTimeout(Duration),
}

impl ForwardError {
    /// Close code sent to the client when this error ends a session
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::IdleTimeout(_) => CloseCode::IdleTimeout,
            _ => CloseCode::InternalError,
        }
    }
}
