//! Mirror Relay — Server
//!
//! The relay server owns the capability table and the stream registry, and
//! provides the `MessageHandler` implementation for the transport layer.
//! Capabilities are registered once at startup and are read-only afterwards.

pub mod capability;
pub mod router;
pub mod streams;

pub use capability::Capability;
pub use router::RelayServer;
pub use streams::StreamRegistry;
