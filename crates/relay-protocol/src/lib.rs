//! Mirror Relay — Protocol Types
//!
//! Wire types shared by the transport and server crates. This crate is the
//! single source of truth for the RPC envelope, the binary stream-frame
//! format, wire names, and the error taxonomy.

pub mod error;
pub mod frame;
pub mod names;
pub mod rpc;

pub use error::{HandlerResult, RelayError};
pub use frame::{FrameError, StreamFrame, MAX_MESSAGE_SIZE};
pub use names::{Methods, Notifications, Targets};
pub use rpc::{id_is_truthy, RpcCall, RpcNotification, RpcRequest, RpcResponse};
