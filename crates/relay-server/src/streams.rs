//! StreamRegistry — tracks active streams, their senders and receiver sets,
//! and fans binary frames out to subscribers.
//!
//! The stream map is the only shared mutable state in the server. All
//! mutation happens under one write lock; connection handles needed for
//! notifications or frame delivery are cloned out under the lock and used
//! after it is released, so no send ever runs while the lock is held.
//!
//! Delivery is best-effort by contract: a receiver whose connection has
//! closed is logged and skipped, never retried, and never affects delivery
//! to the other receivers.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::RwLock;
use relay_protocol::{frame, Methods, Notifications, RelayError, Targets};
use relay_protocol::HandlerResult;
use relay_transport::ConnectionHandle;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::capability::Capability;

/// One active stream: exactly one sender, any number of receivers.
struct StreamEntry {
    info: Value,
    sender: ConnectionHandle,
    receivers: HashMap<String, ConnectionHandle>,
}

/// Registry of active streams, keyed by stream id. A stream exists iff it
/// has a registered sender.
#[derive(Default)]
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, StreamEntry>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream with `conn` as its sender.
    ///
    /// Reusing a live id replaces the old entry; its receivers are told the
    /// old stream ended first, so nobody is left waiting on a stream that no
    /// longer exists. Receivers are not migrated to the new stream.
    pub fn start_stream(&self, conn: &ConnectionHandle, stream_id: String, info: Value) {
        let previous = {
            let mut streams = self.streams.write();
            streams.insert(
                stream_id.clone(),
                StreamEntry {
                    info,
                    sender: conn.clone(),
                    receivers: HashMap::new(),
                },
            )
        };

        match previous {
            Some(old) => {
                warn!("New stream started with an existing id: {stream_id}. Replacing.");
                self.notify_stream_ended(&stream_id, old.receivers.into_values().collect());
            }
            None => info!("New stream started with id: {stream_id}"),
        }
    }

    /// End a stream. Only honored when `conn` is the stream's sender;
    /// otherwise logged and ignored, with no error surfaced to the caller.
    pub fn stop_stream(&self, conn: &ConnectionHandle, stream_id: &str) {
        let removed = {
            let mut streams = self.streams.write();
            match streams.get(stream_id) {
                Some(entry) if entry.sender == *conn => streams.remove(stream_id),
                _ => None,
            }
        };

        match removed {
            Some(entry) => {
                info!("Stream ended: {stream_id}");
                self.notify_stream_ended(stream_id, entry.receivers.into_values().collect());
            }
            None => {
                warn!("Received stop_stream for unknown or foreign stream: {stream_id}");
            }
        }
    }

    /// Map of every active stream id to the sender-supplied info blob.
    pub fn active_streams(&self) -> Value {
        let streams = self.streams.read();
        let map: serde_json::Map<String, Value> = streams
            .iter()
            .map(|(id, entry)| (id.clone(), entry.info.clone()))
            .collect();
        Value::Object(map)
    }

    /// Add `conn` to a stream's receiver set and ask the sender for a fresh
    /// keyframe so the new receiver can begin decoding from a clean state.
    /// Subscribing to a nonexistent stream is logged and ignored.
    pub fn subscribe_to_stream(&self, conn: &ConnectionHandle, stream_id: &str) {
        let sender = {
            let mut streams = self.streams.write();
            match streams.get_mut(stream_id) {
                Some(entry) => {
                    entry.receivers.insert(conn.id().to_string(), conn.clone());
                    Some(entry.sender.clone())
                }
                None => None,
            }
        };

        match sender {
            Some(sender) => {
                info!("Receiver {} subscribed to stream {stream_id}", conn.id());
                if let Err(e) = sender.send_notification(
                    Targets::STREAM_MANAGER,
                    Notifications::TRIGGER_KEY_FRAME,
                    vec![json!(stream_id)],
                ) {
                    warn!("Failed to request keyframe for {stream_id}: {e}");
                }
            }
            None => {
                warn!("Receiver tried to subscribe to non-active stream: {stream_id}");
            }
        }
    }

    /// Clean up after a disconnected connection: streams it was sending are
    /// removed (their receivers notified), and it is dropped from every
    /// receiver set it was in.
    pub fn handle_disconnect(&self, conn: &ConnectionHandle) {
        let ended: Vec<(String, Vec<ConnectionHandle>)> = {
            let mut streams = self.streams.write();

            let ended_ids: Vec<String> = streams
                .iter()
                .filter(|(_, entry)| entry.sender == *conn)
                .map(|(id, _)| id.clone())
                .collect();

            let mut ended = Vec::with_capacity(ended_ids.len());
            for id in ended_ids {
                if let Some(entry) = streams.remove(&id) {
                    info!("Stream sender for {id} disconnected. Removing stream.");
                    ended.push((id, entry.receivers.into_values().collect()));
                }
            }

            for entry in streams.values_mut() {
                entry.receivers.remove(conn.id());
            }

            ended
        };

        for (stream_id, receivers) in ended {
            self.notify_stream_ended(&stream_id, receivers);
        }
    }

    /// Demultiplex a binary frame and forward it verbatim to every current
    /// receiver of the stream. Frames for unknown streams, or arriving from
    /// a connection that is not the stream's sender, are dropped without an
    /// error — this channel is one-way push traffic.
    pub fn forward_binary(&self, conn: &ConnectionHandle, data: Bytes) {
        let stream_frame = match frame::parse_frame(&data) {
            Ok(f) => f,
            Err(e) => {
                error!("Failed to parse stream frame header: {e}");
                return;
            }
        };

        let receivers: Vec<ConnectionHandle> = {
            let streams = self.streams.read();
            match streams.get(&stream_frame.stream_id) {
                Some(entry) if entry.sender == *conn => {
                    entry.receivers.values().cloned().collect()
                }
                Some(_) => {
                    debug!(
                        "Dropping frame for stream {} from non-sender {}",
                        stream_frame.stream_id,
                        conn.id()
                    );
                    return;
                }
                None => {
                    debug!("Dropping frame for unknown stream {}", stream_frame.stream_id);
                    return;
                }
            }
        };

        for receiver in &receivers {
            if let Err(e) = receiver.send_binary(data.clone()) {
                warn!(
                    "Failed to forward frame for stream {}: {e}",
                    stream_frame.stream_id
                );
            }
        }
    }

    /// Tell each captured receiver that a stream ended. Per-receiver send
    /// failures are logged and swallowed.
    fn notify_stream_ended(&self, stream_id: &str, receivers: Vec<ConnectionHandle>) {
        if receivers.is_empty() {
            return;
        }

        info!(
            "Notifying {} receivers that stream {stream_id} has ended",
            receivers.len()
        );
        for receiver in &receivers {
            if let Err(e) = receiver.send_notification(
                Targets::STREAM_MANAGER,
                Notifications::ON_STREAM_ENDED,
                vec![json!(stream_id)],
            ) {
                warn!("Failed to notify receiver of stream end: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RPC surface
// ─────────────────────────────────────────────────────────────────────────────

impl Capability for StreamRegistry {
    fn target(&self) -> &str {
        Targets::STREAM_MANAGER
    }

    async fn handle(&self, conn: &ConnectionHandle, func: &str, args: &[Value]) -> HandlerResult {
        match func {
            Methods::START_STREAM => {
                let stream_id = string_arg(args, 0, "stream_id")?;
                let info = args
                    .get(1)
                    .cloned()
                    .ok_or_else(|| RelayError::handler("argument 1 (stream_info) is required"))?;
                self.start_stream(conn, stream_id, info);
                Ok(Value::Null)
            }

            Methods::STOP_STREAM => {
                let stream_id = string_arg(args, 0, "stream_id")?;
                self.stop_stream(conn, &stream_id);
                Ok(Value::Null)
            }

            Methods::GET_ACTIVE_STREAMS => Ok(self.active_streams()),

            Methods::SUBSCRIBE_TO_STREAM => {
                let stream_id = string_arg(args, 0, "stream_id")?;
                self.subscribe_to_stream(conn, &stream_id);
                Ok(Value::Null)
            }

            _ => Err(RelayError::UnknownMethod {
                target: Targets::STREAM_MANAGER.into(),
                func: func.into(),
            }),
        }
    }
}

fn string_arg(args: &[Value], index: usize, name: &str) -> Result<String, RelayError> {
    args.get(index)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| RelayError::handler(format!("argument {index} ({name}) must be a string")))
}
