//! Integration test utilities for the stream relay
//!
//! This crate provides helpers for running a relay on an ephemeral port,
//! scripted TCP upstream peers, and a WebSocket client to drive it.

pub mod fixtures;

pub use fixtures::*;
pub use helpers::*;
