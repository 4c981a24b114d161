//! Relay sessions
//!
//! One session per accepted client: dial, forward both ways, tear down.

mod error;
mod forwarder;
mod registry;
mod session;

pub use error::{BoxError, ForwardError, SessionError};
pub use forwarder::{
    client_to_upstream, upstream_to_client, Activity, Direction, ForwardOptions, StreamEnd,
    TrafficStats,
};
pub use registry::{SessionGuard, SessionInfo, SessionRegistry};
pub use session::{dial, Session, SessionOutcome, SessionReport};

pub(crate) use session::close_client;
