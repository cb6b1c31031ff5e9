//! Stream registry functional tests.
//!
//! Drives the registry and dispatcher through in-process connection handles
//! with inspectable outbound queues, verifying routing, fan-out, and cleanup
//! behavior exactly as connected clients experience it.

use std::sync::Arc;

use bytes::Bytes;
use relay_protocol::frame::encode_frame;
use relay_protocol::{RelayError, RpcCall, RpcRequest};
use relay_server::{RelayServer, StreamRegistry};
use relay_transport::{ConnectionHandle, MessageHandler, Outbound};
use serde_json::{json, Value};
use tokio::sync::mpsc;

/// Create a handle with an inspectable outbound queue.
fn conn(id: &str) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConnectionHandle::new(id, None, tx), rx)
}

/// Drain everything currently queued for a connection.
fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

/// Drain and parse only the queued notifications.
fn drain_notifications(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Value> {
    drain(rx)
        .into_iter()
        .filter_map(|msg| match msg {
            Outbound::Text(text) => serde_json::from_str(&text).ok(),
            _ => None,
        })
        .collect()
}

/// Drain and keep only the queued binary frames.
fn drain_binary(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Bytes> {
    drain(rx)
        .into_iter()
        .filter_map(|msg| match msg {
            Outbound::Binary(data) => Some(data),
            _ => None,
        })
        .collect()
}

fn request(id: Value, func: &str, args: Vec<Value>) -> RpcRequest {
    RpcRequest {
        id: Some(id),
        params: RpcCall::new("streamManager", func, args),
    }
}

fn server() -> RelayServer {
    RelayServer::new(Arc::new(StreamRegistry::new()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_stream_appears_in_active_streams() {
    let registry = StreamRegistry::new();
    let (sender, _rx) = conn("sender-a");

    registry.start_stream(&sender, "cam1".into(), json!({"title": "Desk"}));

    let active = registry.active_streams();
    assert_eq!(active, json!({"cam1": {"title": "Desk"}}));
}

#[tokio::test]
async fn get_active_streams_on_empty_registry_yields_empty_object() {
    let srv = server();
    let (caller, _rx) = conn("caller");

    let result = srv
        .handle_request(&caller, request(json!(1), "get_active_streams", vec![]))
        .await
        .unwrap();
    assert_eq!(result, json!({}));
}

#[tokio::test]
async fn stop_stream_notifies_receivers_and_removes_entry() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");
    let (receiver, mut rrx) = conn("receiver-b");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&receiver, "cam1");
    registry.stop_stream(&sender, "cam1");

    let notifications = drain_notifications(&mut rrx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["params"]["func"], "onStreamEnded");
    assert_eq!(notifications[0]["params"]["args"][0], "cam1");

    assert_eq!(registry.active_streams(), json!({}));
}

#[tokio::test]
async fn stop_stream_from_non_owner_is_ignored() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");
    let (intruder, _irx) = conn("intruder-c");
    let (receiver, mut rrx) = conn("receiver-b");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&receiver, "cam1");
    drain(&mut rrx);

    registry.stop_stream(&intruder, "cam1");

    // Stream still active, nobody notified.
    assert_eq!(registry.active_streams(), json!({"cam1": {}}));
    assert!(drain_notifications(&mut rrx).is_empty());
}

#[tokio::test]
async fn stop_unknown_stream_answers_null_not_error() {
    let srv = server();
    let (caller, _rx) = conn("caller");

    let result = srv
        .handle_request(&caller, request(json!(1), "stop_stream", vec![json!("nope")]))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
}

#[tokio::test]
async fn restarting_a_live_id_ends_the_old_stream_first() {
    let registry = StreamRegistry::new();
    let (old_sender, _orx) = conn("sender-old");
    let (new_sender, _nrx) = conn("sender-new");
    let (receiver, mut rrx) = conn("receiver-b");

    registry.start_stream(&old_sender, "cam1".into(), json!({"gen": 1}));
    registry.subscribe_to_stream(&receiver, "cam1");
    drain(&mut rrx);

    registry.start_stream(&new_sender, "cam1".into(), json!({"gen": 2}));

    // Old receivers learn the old stream ended and are not migrated.
    let notifications = drain_notifications(&mut rrx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["params"]["func"], "onStreamEnded");

    assert_eq!(registry.active_streams(), json!({"cam1": {"gen": 2}}));

    let frame = encode_frame("cam1", b"data").unwrap();
    registry.forward_binary(&new_sender, frame);
    assert!(drain_binary(&mut rrx).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_triggers_exactly_one_keyframe_request_to_sender() {
    let registry = StreamRegistry::new();
    let (sender, mut srx) = conn("sender-a");
    let (receiver, _rrx) = conn("receiver-b");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&receiver, "cam1");

    let notifications = drain_notifications(&mut srx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["params"]["target"], "streamManager");
    assert_eq!(notifications[0]["params"]["func"], "triggerKeyFrame");
    assert_eq!(notifications[0]["params"]["args"], json!(["cam1"]));
}

#[tokio::test]
async fn subscribe_to_missing_stream_is_a_silent_no_op() {
    let srv = server();
    let (sender, mut srx) = conn("sender-a");
    let (receiver, _rrx) = conn("receiver-b");

    srv.stream_registry()
        .start_stream(&sender, "cam1".into(), json!({}));

    let result = srv
        .handle_request(
            &receiver,
            request(json!(1), "subscribe_to_stream", vec![json!("other")]),
        )
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
    assert!(drain_notifications(&mut srx).is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Binary fan-out
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn frames_fan_out_to_all_receivers_and_nobody_else() {
    let registry = StreamRegistry::new();
    let (sender, mut srx) = conn("sender-a");
    let (recv_b, mut brx) = conn("receiver-b");
    let (recv_c, mut crx) = conn("receiver-c");
    let (_bystander, mut drx) = conn("bystander-d");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&recv_b, "cam1");
    registry.subscribe_to_stream(&recv_c, "cam1");
    drain(&mut srx);

    let frame = encode_frame("cam1", b"\x01\x02").unwrap();
    registry.forward_binary(&sender, frame.clone());

    assert_eq!(drain_binary(&mut brx), vec![frame.clone()]);
    assert_eq!(drain_binary(&mut crx), vec![frame]);
    assert!(drain(&mut drx).is_empty());
    assert!(drain(&mut srx).is_empty()); // sender never gets its own frames back
}

#[tokio::test]
async fn frames_from_non_sender_are_dropped() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");
    let (recv_b, mut brx) = conn("receiver-b");
    let (recv_c, mut crx) = conn("receiver-c");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&recv_b, "cam1");
    registry.subscribe_to_stream(&recv_c, "cam1");
    drain(&mut brx);
    drain(&mut crx);

    let frame = encode_frame("cam1", b"spoofed").unwrap();
    registry.forward_binary(&recv_b, frame);

    assert!(drain_binary(&mut brx).is_empty());
    assert!(drain_binary(&mut crx).is_empty());
}

#[tokio::test]
async fn frames_for_unknown_streams_are_dropped() {
    let registry = StreamRegistry::new();
    let (sender, mut srx) = conn("sender-a");

    let frame = encode_frame("ghost", b"data").unwrap();
    registry.forward_binary(&sender, frame);
    assert!(drain(&mut srx).is_empty());
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");
    let (receiver, mut rrx) = conn("receiver-b");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&receiver, "cam1");
    drain(&mut rrx);

    registry.forward_binary(&sender, Bytes::new());
    registry.forward_binary(&sender, Bytes::from_static(b"\xff short"));

    assert!(drain_binary(&mut rrx).is_empty());
}

#[tokio::test]
async fn closed_receiver_does_not_block_delivery_to_others() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");

    registry.start_stream(&sender, "cam1".into(), json!({}));

    // 50 receivers, one of which has already hung up.
    let mut live = Vec::new();
    for i in 0..50 {
        let id = format!("receiver-{i}");
        let (receiver, rx) = conn(&id);
        registry.subscribe_to_stream(&receiver, "cam1");
        if i == 13 {
            drop(rx); // closed connection
        } else {
            live.push(rx);
        }
    }

    let frame = encode_frame("cam1", b"keyframe").unwrap();
    registry.forward_binary(&sender, frame.clone());

    assert_eq!(live.len(), 49);
    for rx in &mut live {
        assert_eq!(drain_binary(rx), vec![frame.clone()]);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disconnect cleanup
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sender_disconnect_removes_stream_and_notifies_each_receiver_once() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");
    let (recv_b, mut brx) = conn("receiver-b");
    let (recv_c, mut crx) = conn("receiver-c");
    let (_bystander, mut drx) = conn("bystander-d");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&recv_b, "cam1");
    registry.subscribe_to_stream(&recv_c, "cam1");

    registry.handle_disconnect(&sender);

    assert_eq!(registry.active_streams(), json!({}));
    for rx in [&mut brx, &mut crx] {
        let notifications = drain_notifications(rx);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0]["params"]["func"], "onStreamEnded");
        assert_eq!(notifications[0]["params"]["args"][0], "cam1");
    }
    assert!(drain(&mut drx).is_empty());
}

#[tokio::test]
async fn receiver_disconnect_leaves_stream_active_for_others() {
    let registry = StreamRegistry::new();
    let (sender, mut srx) = conn("sender-a");
    let (recv_b, mut brx) = conn("receiver-b");
    let (recv_c, mut crx) = conn("receiver-c");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.subscribe_to_stream(&recv_b, "cam1");
    registry.subscribe_to_stream(&recv_c, "cam1");
    drain(&mut srx);

    registry.handle_disconnect(&recv_b);

    assert_eq!(registry.active_streams(), json!({"cam1": {}}));

    let frame = encode_frame("cam1", b"data").unwrap();
    registry.forward_binary(&sender, frame.clone());
    assert!(drain_binary(&mut brx).is_empty());
    assert_eq!(drain_binary(&mut crx), vec![frame]);
}

#[tokio::test]
async fn disconnect_of_sender_with_multiple_streams_cleans_all_of_them() {
    let registry = StreamRegistry::new();
    let (sender, _srx) = conn("sender-a");
    let (receiver, mut rrx) = conn("receiver-b");

    registry.start_stream(&sender, "cam1".into(), json!({}));
    registry.start_stream(&sender, "cam2".into(), json!({}));
    registry.subscribe_to_stream(&receiver, "cam1");
    registry.subscribe_to_stream(&receiver, "cam2");

    registry.handle_disconnect(&sender);

    assert_eq!(registry.active_streams(), json!({}));
    let mut ended: Vec<String> = drain_notifications(&mut rrx)
        .iter()
        .map(|n| n["params"]["args"][0].as_str().unwrap().to_string())
        .collect();
    ended.sort();
    assert_eq!(ended, vec!["cam1", "cam2"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatch
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_target_is_an_error() {
    let srv = server();
    let (caller, _rx) = conn("caller");

    let req = RpcRequest {
        id: Some(json!(1)),
        params: RpcCall::new("nope", "anything", vec![]),
    };
    let err = srv.handle_request(&caller, req).await.unwrap_err();
    assert!(matches!(err, RelayError::UnknownTarget(_)));
    assert_eq!(err.to_string(), "no capability registered with name \"nope\"");
}

#[tokio::test]
async fn unknown_method_is_an_error() {
    let srv = server();
    let (caller, _rx) = conn("caller");

    let err = srv
        .handle_request(&caller, request(json!(1), "explode", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::UnknownMethod { .. }));
}

#[tokio::test]
async fn missing_target_or_func_is_malformed() {
    let srv = server();
    let (caller, _rx) = conn("caller");

    let req = RpcRequest {
        id: Some(json!(1)),
        params: RpcCall::new("", "start_stream", vec![]),
    };
    let err = srv.handle_request(&caller, req).await.unwrap_err();
    assert!(matches!(err, RelayError::MalformedRequest));
}

#[tokio::test]
async fn bad_argument_types_surface_as_handler_errors() {
    let srv = server();
    let (caller, _rx) = conn("caller");

    let err = srv
        .handle_request(&caller, request(json!(1), "start_stream", vec![json!(42)]))
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Handler(_)));
}
