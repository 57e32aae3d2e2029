//! Adapter module - remote control protocol handling
//!
//! This module handles external control of the engine via TCP socket,
//! speaking a line-delimited JSON protocol.

pub mod protocol;
pub mod runtime;
pub mod server;

// Re-export the common surface
pub use protocol::*;
pub use runtime::{Adapter, ClientCommand, InboundCommand, InboundPayload, OutboundMessage};
pub use server::{build_observation, run_server, ServerConfig, ServerState};
