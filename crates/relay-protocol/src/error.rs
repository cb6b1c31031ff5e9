//! Error taxonomy for RPC dispatch.
//!
//! Only dispatch failures are surfaced to callers, and only when the request
//! carried a truthy id; the `Display` string becomes the response `error`
//! field. Malformed messages and stream-registry misses are logged and
//! dropped by their respective layers instead of producing a response.

use thiserror::Error;

/// Failure while resolving or invoking a capability method.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The request params lacked `target` or `func`.
    #[error("request must include \"target\" and \"func\"")]
    MalformedRequest,

    /// No capability is registered under the requested target name.
    #[error("no capability registered with name \"{0}\"")]
    UnknownTarget(String),

    /// The capability exposes no function with the requested name.
    #[error("method \"{func}\" not found on \"{target}\"")]
    UnknownMethod { target: String, func: String },

    /// The capability method itself failed (including bad arguments).
    #[error("{0}")]
    Handler(String),
}

impl RelayError {
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}

/// Result of a capability method invocation.
pub type HandlerResult = Result<serde_json::Value, RelayError>;
