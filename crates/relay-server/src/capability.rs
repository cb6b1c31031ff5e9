//! Capability trait — a named table of client-callable functions.
//!
//! Each capability handles one `target` name of the RPC surface. The
//! originating connection is always passed explicitly; whether a function
//! uses it is a static property of the implementation, never decided by
//! runtime introspection.

use relay_protocol::HandlerResult;
use relay_transport::ConnectionHandle;
use serde_json::Value;

/// Trait implemented by all relay capabilities.
pub trait Capability: Send + Sync {
    /// The target name this capability answers to (e.g. "streamManager").
    fn target(&self) -> &str;

    /// Invoke the named function with the originating connection and the
    /// caller-supplied positional arguments. Unknown functions must return
    /// `RelayError::UnknownMethod`.
    fn handle(
        &self,
        conn: &ConnectionHandle,
        func: &str,
        args: &[Value],
    ) -> impl std::future::Future<Output = HandlerResult> + Send;
}

impl<T: Capability> Capability for std::sync::Arc<T> {
    fn target(&self) -> &str {
        (**self).target()
    }

    fn handle(
        &self,
        conn: &ConnectionHandle,
        func: &str,
        args: &[Value],
    ) -> impl std::future::Future<Output = HandlerResult> + Send {
        (**self).handle(conn, func, args)
    }
}

/// Object-safe wrapper for the Capability trait.
pub(crate) trait CapabilityDyn: Send + Sync {
    fn target_dyn(&self) -> &str;
    fn handle_dyn<'a>(
        &'a self,
        conn: &'a ConnectionHandle,
        func: &'a str,
        args: &'a [Value],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = HandlerResult> + Send + 'a>>;
}

impl<T: Capability> CapabilityDyn for T {
    fn target_dyn(&self) -> &str {
        self.target()
    }

    fn handle_dyn<'a>(
        &'a self,
        conn: &'a ConnectionHandle,
        func: &'a str,
        args: &'a [Value],
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(self.handle(conn, func, args))
    }
}
