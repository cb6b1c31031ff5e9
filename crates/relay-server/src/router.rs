//! RelayServer — dispatches RPC requests to capabilities and routes binary
//! frames and disconnects to the stream registry.

use std::sync::Arc;

use bytes::Bytes;
use relay_protocol::{HandlerResult, RelayError, RpcCall, RpcRequest};
use relay_transport::{ConnectionHandle, MessageHandler};
use tracing::info;

use crate::capability::{Capability, CapabilityDyn};
use crate::streams::StreamRegistry;

/// The relay server — owns the capability table and the stream registry.
pub struct RelayServer {
    streams: Arc<StreamRegistry>,
    /// Registered capabilities (boxed for object safety). Populated at
    /// startup, read-only afterwards.
    capabilities: Vec<Box<dyn CapabilityDyn>>,
}

impl RelayServer {
    /// Create a server around a stream registry. The registry is registered
    /// as the `streamManager` capability.
    pub fn new(streams: Arc<StreamRegistry>) -> Self {
        let mut server = Self {
            streams: streams.clone(),
            capabilities: Vec::new(),
        };
        server.register_capability(streams);
        server
    }

    /// Register an additional capability with the server.
    pub fn register_capability<C: Capability + 'static>(&mut self, capability: C) {
        info!("Registering capability: {}", capability.target());
        self.capabilities.push(Box::new(capability));
    }

    pub fn stream_registry(&self) -> &Arc<StreamRegistry> {
        &self.streams
    }
}

impl MessageHandler for RelayServer {
    async fn handle_request(
        &self,
        conn: &ConnectionHandle,
        request: RpcRequest,
    ) -> HandlerResult {
        let RpcCall { target, func, args } = request.params;

        if target.is_empty() || func.is_empty() {
            return Err(RelayError::MalformedRequest);
        }

        for capability in &self.capabilities {
            if capability.target_dyn() == target {
                return capability.handle_dyn(conn, &func, &args).await;
            }
        }

        Err(RelayError::UnknownTarget(target))
    }

    async fn handle_binary(&self, conn: &ConnectionHandle, data: Bytes) {
        self.streams.forward_binary(conn, data);
    }

    async fn handle_disconnect(&self, conn: &ConnectionHandle) {
        self.streams.handle_disconnect(conn);
    }
}
