//! Wire-name constants — capability targets, method names, and notification
//! names. Each constant is the exact string sent over the wire.

/// Capability target names.
pub struct Targets;

impl Targets {
    /// The stream registry capability.
    pub const STREAM_MANAGER: &str = "streamManager";
}

/// Client-callable method names, grouped by target.
pub struct Methods;

impl Methods {
    // ── streamManager ───────────────────────────────────────────────────
    pub const START_STREAM: &str = "start_stream";
    pub const STOP_STREAM: &str = "stop_stream";
    pub const GET_ACTIVE_STREAMS: &str = "get_active_streams";
    pub const SUBSCRIBE_TO_STREAM: &str = "subscribe_to_stream";
}

/// Server-originated notification names (one-way, never answered).
pub struct Notifications;

impl Notifications {
    /// Sent to a stream's sender when a new receiver joins, asking for a
    /// full keyframe so the receiver can start decoding from a clean state.
    pub const TRIGGER_KEY_FRAME: &str = "triggerKeyFrame";

    /// Sent to each receiver of a stream when the stream ends.
    pub const ON_STREAM_ENDED: &str = "onStreamEnded";
}
