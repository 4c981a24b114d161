//! Process-level error types
//!
//! Only failures of the listener itself end up here. Errors raised inside a
//! session stay inside that session.

use crate::config::ConfigError;
use crate::telemetry::TracingError;

/// Errors visible at the process boundary
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    // Listener errors
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    // Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    // Telemetry errors
    #[error(transparent)]
    Telemetry(#[from] TracingError),
}

impl RelayError {
    /// Create a bind error for an address
    pub fn bind(addr: impl ToString, source: std::io::Error) -> Self {
        Self::Bind {
            addr: addr.to_string(),
            source,
        }
    }

    /// Get a stable error code for log aggregation
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "BIND_FAILED",
            Self::Serve(_) => "SERVE_FAILED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Telemetry(_) => "TELEMETRY_ERROR",
        }
    }
}

/// Result type alias for process-level operations
pub type RelayResult<T> = Result<T, RelayError>;
