//! Connection handles and the live-connection set.
//!
//! A [`ConnectionHandle`] is a cheap clone that can enqueue outbound
//! messages from anywhere; the WebSocket itself is owned by a per-connection
//! writer task in the transport server. Because every connection drains its
//! own queue, fan-out to many receivers is a sequence of non-blocking
//! enqueues and a slow receiver never delays the others.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use relay_protocol::RpcNotification;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// An outbound message queued for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
    /// Close the connection after flushing what is already queued.
    Close,
}

/// Failed to enqueue a message: the connection's writer task is gone.
#[derive(Debug, thiserror::Error)]
#[error("connection {0} is closed")]
pub struct SendError(pub String);

/// Handle to a live connection. Identity is stable for the session;
/// equality compares ids only.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Arc<str>,
    peer: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    pub fn new(
        id: impl Into<Arc<str>>,
        peer: Option<SocketAddr>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            id: id.into(),
            peer,
            outbound,
        }
    }

    /// Unique connection id (uuid v4 string).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Peer address, for diagnostics.
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Enqueue a text frame. Best-effort: fails only if the connection has
    /// already closed.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| SendError(self.id.to_string()))
    }

    /// Enqueue a binary frame verbatim.
    pub fn send_binary(&self, data: Bytes) -> Result<(), SendError> {
        self.outbound
            .send(Outbound::Binary(data))
            .map_err(|_| SendError(self.id.to_string()))
    }

    /// Serialize and enqueue a one-way RPC notification for this connection.
    pub fn send_notification(
        &self,
        target: &str,
        func: &str,
        args: Vec<Value>,
    ) -> Result<(), SendError> {
        let notification = RpcNotification::new(target, func, args);
        match serde_json::to_string(&notification) {
            Ok(json) => self.send_text(json),
            Err(e) => {
                warn!("Failed to serialize notification {target}/{func}: {e}");
                Ok(())
            }
        }
    }

    /// Ask the writer task to close the socket once the queue drains.
    pub fn close(&self) -> Result<(), SendError> {
        self.outbound
            .send(Outbound::Close)
            .map_err(|_| SendError(self.id.to_string()))
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// The set of live connections, owned by the transport server.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    clients: DashMap<String, ConnectionHandle>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: ConnectionHandle) {
        self.clients.insert(conn.id().to_string(), conn);
    }

    pub fn remove(&self, id: &str) -> Option<ConnectionHandle> {
        self.clients.remove(id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: &str) -> Option<ConnectionHandle> {
        self.clients.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Signal every live connection to close. Used during shutdown so the
    /// server does not wait on clients that never hang up.
    pub fn close_all(&self) {
        for entry in self.clients.iter() {
            let _ = entry.value().close();
        }
    }
}
