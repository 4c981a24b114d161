//! # relay-gateway
//!
//! Bridges WebSocket clients to a fixed TCP upstream. Each accepted client
//! gets its own upstream connection, and bytes flow both ways until either
//! side closes.

pub mod protocol;
pub mod server;
pub mod session;

pub use server::{bind, create_app, create_router, run, run_server, RelayState};
pub use session::{Session, SessionOutcome, SessionRegistry, SessionReport};
