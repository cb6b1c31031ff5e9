//! RPC envelope types for the control plane.
//!
//! Every control message is a JSON text frame. Requests and notifications
//! share one shape — `{"id": ..., "params": {"target", "func", "args"}}` —
//! with notifications simply omitting the `id`. A response is sent if and
//! only if the originating request carried a truthy `id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `(target, func, args)` triple carried by requests and notifications.
///
/// `target` and `func` default to empty when absent so that an incomplete
/// request still parses; the dispatcher rejects empty names with a
/// malformed-request error rather than the transport dropping the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCall {
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

/// An inbound RPC request. `id` is an opaque JSON value echoed back in the
/// response; absent for notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub params: RpcCall,
}

/// A one-way push sharing the request envelope, never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    pub params: RpcCall,
}

/// Successful RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSuccessResponse {
    pub id: Value,
    pub result: Value,
}

/// Failed RPC response. The error is a plain message string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub id: Value,
    pub error: String,
}

/// RPC response (success or error).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success(RpcSuccessResponse),
    Error(RpcErrorResponse),
}

impl RpcCall {
    pub fn new(target: impl Into<String>, func: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            target: target.into(),
            func: func.into(),
            args,
        }
    }
}

impl RpcNotification {
    pub fn new(target: impl Into<String>, func: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            params: RpcCall::new(target, func, args),
        }
    }
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self::Success(RpcSuccessResponse { id, result })
    }

    pub fn error(id: Value, error: impl Into<String>) -> Self {
        Self::Error(RpcErrorResponse {
            id,
            error: error.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Whether a request id warrants a response.
///
/// Mirrors the sender side of the protocol, where ids are checked for
/// truthiness rather than mere presence: `null`, `false`, `0` and `""`
/// all suppress the response.
pub fn id_is_truthy(id: &Value) -> bool {
    match id {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
