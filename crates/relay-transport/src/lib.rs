//! Mirror Relay — Transport Layer
//!
//! WebSocket transport for the relay server. The transport handles:
//! - Connection lifecycle (open, message, close)
//! - Per-connection outbound queues with dedicated writer tasks
//! - Routing of text (RPC) and binary (stream frame) messages
//! - Disconnect propagation to the stream registry
//!
//! The transport is decoupled from the relay logic via the `MessageHandler`
//! trait.

pub mod connection;
pub mod server;

pub use connection::{ConnectionHandle, ConnectionManager, Outbound, SendError};
pub use server::{MessageHandler, TransportConfig, TransportServer};
