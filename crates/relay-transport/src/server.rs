//! WebSocket transport server using Axum.
//!
//! Handles HTTP upgrade to WebSocket, the per-connection receive loop and
//! writer task, and message routing to the relay server. Inbound messages on
//! one connection are processed in arrival order; nothing is shared between
//! connections except through the `MessageHandler`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use relay_protocol::{HandlerResult, MAX_MESSAGE_SIZE, RelayError, RpcCall, RpcRequest,
    RpcResponse, id_is_truthy};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectionHandle, ConnectionManager, Outbound};

/// Trait implemented by the relay server to handle inbound traffic.
/// The transport calls this for every parsed RPC request, every binary
/// frame, and every disconnect.
pub trait MessageHandler: Send + Sync + 'static {
    /// Dispatch an RPC request originating on `conn`.
    fn handle_request(
        &self,
        conn: &ConnectionHandle,
        request: RpcRequest,
    ) -> impl std::future::Future<Output = HandlerResult> + Send;

    /// Handle a raw binary frame originating on `conn`.
    fn handle_binary(
        &self,
        conn: &ConnectionHandle,
        data: Bytes,
    ) -> impl std::future::Future<Output = ()> + Send;

    /// Clean up after `conn` closed, gracefully or not.
    fn handle_disconnect(
        &self,
        conn: &ConnectionHandle,
    ) -> impl std::future::Future<Output = ()> + Send;
}

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Maximum WebSocket message size — sized for large video keyframes
    pub max_message_size: usize,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8765,
            hostname: "127.0.0.1".into(),
            max_message_size: MAX_MESSAGE_SIZE,
            max_connections: Some(32),
        }
    }
}

/// Shared state for the transport server.
struct AppState<H: MessageHandler> {
    handler: Arc<H>,
    config: TransportConfig,
    connections: Arc<ConnectionManager>,
}

/// The transport server — accepts WebSocket connections and routes messages.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Live connections, for closing them at shutdown
    connections: Arc<ConnectionManager>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start the transport server with the given message handler.
    pub async fn start<H: MessageHandler>(
        config: TransportConfig,
        handler: Arc<H>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let connections = Arc::new(ConnectionManager::new());
        let state = Arc::new(AppState {
            handler,
            config: config.clone(),
            connections: connections.clone(),
        });

        let app = Router::new()
            .route("/ws", get(ws_upgrade_handler::<H>))
            .route("/health", get(health_handler::<H>))
            .with_state(state);

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("Relay transport listening on ws://{}:{}/ws", config.hostname, actual_port);

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await
            .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            connections,
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting connections, close live ones, and join the server task.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        self.connections.close_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Relay transport server stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn ws_upgrade_handler<H: MessageHandler>(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    // Check connection limit
    if let Some(max) = state.config.max_connections {
        if state.connections.len() >= max {
            warn!("Connection rejected: max connections reached ({max})");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_ws_connection(socket, peer, state))
        .into_response()
}

async fn health_handler<H: MessageHandler>(
    State(state): State<Arc<AppState<H>>>,
) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.connections.len(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

async fn handle_ws_connection<H: MessageHandler>(
    socket: WebSocket,
    peer: SocketAddr,
    state: Arc<AppState<H>>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("Client connected: {client_id} from {peer}");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();

    let conn = ConnectionHandle::new(client_id.as_str(), Some(peer), out_tx);
    state.connections.insert(conn.clone());

    // Writer task — drains the outbound queue into the socket. Exits when
    // every handle to this connection has been dropped or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let message = match outbound {
                Outbound::Text(text) => Message::Text(text.into()),
                Outbound::Binary(data) => Message::Binary(data),
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                route_text(&state.handler, &conn, text.as_str()).await;
            }
            Ok(Message::Binary(data)) => {
                state.handler.handle_binary(&conn, data).await;
            }
            Ok(Message::Close(_)) => {
                debug!("Client closed connection: {client_id}");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket error for {client_id}: {e}");
                break;
            }
        }
    }

    // Same cleanup for graceful and abrupt closes: leave the live set first,
    // then let the handler purge registry state.
    state.connections.remove(&client_id);
    state.handler.handle_disconnect(&conn).await;

    drop(conn);
    let _ = writer.await;
    info!("Client disconnected: {client_id} (total: {})", state.connections.len());
}

/// Route a text message: parse JSON, require a `params` field, dispatch, and
/// answer iff the request carried a truthy id.
async fn route_text<H: MessageHandler>(
    handler: &Arc<H>,
    conn: &ConnectionHandle,
    text: &str,
) {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            error!("Non-JSON message from {}: {e}", conn.id());
            return;
        }
    };

    let Some(params) = parsed.get("params") else {
        debug!("Ignoring non-request message from {}", conn.id());
        return;
    };

    let id = parsed.get("id").cloned();

    // A `params` that isn't an object is still an RPC attempt; answer it
    // with a malformed-request error rather than dropping it.
    let result = match serde_json::from_value::<RpcCall>(params.clone()) {
        Ok(call) => {
            handler
                .handle_request(conn, RpcRequest { id: id.clone(), params: call })
                .await
        }
        Err(_) => Err(RelayError::MalformedRequest),
    };

    let Some(id) = id else { return };
    if !id_is_truthy(&id) {
        return;
    }

    let response = match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => {
            warn!("Request from {} failed: {e}", conn.id());
            RpcResponse::error(id, e.to_string())
        }
    };

    match serde_json::to_string(&response) {
        Ok(json) => {
            if let Err(e) = conn.send_text(json) {
                error!("Failed to send response: {e}");
            }
        }
        Err(e) => error!("Failed to serialize response: {e}"),
    }
}
