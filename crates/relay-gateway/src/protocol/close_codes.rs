//! WebSocket close codes
//!
//! Close codes the relay sends when it tears a session down.

/// Relay WebSocket close codes
///
/// Sent in the close frame to tell the client why its session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Either side closed cleanly
    Normal = 1000,
    /// The relay is shutting down
    GoingAway = 1001,
    /// A read or write failed mid-session
    InternalError = 1011,
    /// The relay is at its session limit
    TryAgainLater = 1013,
    /// The upstream could not be reached
    ///
    /// Private-range code: tungstenite clients reject the registered 1014.
    BadGateway = 4014,
    /// Neither side sent anything within the idle timeout
    IdleTimeout = 4008,
}

impl CloseCode {
    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the close reason sent alongside the code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Session closed",
            Self::GoingAway => "Relay shutting down",
            Self::InternalError => "Relay transport error",
            Self::TryAgainLater => "Too many sessions",
            Self::BadGateway => "Upstream unreachable",
            Self::IdleTimeout => "Idle timeout",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::InternalError => "InternalError",
            Self::TryAgainLater => "TryAgainLater",
            Self::BadGateway => "BadGateway",
            Self::IdleTimeout => "IdleTimeout",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
