//! Relay protocol definitions
//!
//! The relay imposes no framing of its own on relayed bytes; the only
//! protocol surface is the close code sent to the client on teardown.

mod close_codes;

pub use close_codes::CloseCode;
