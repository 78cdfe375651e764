//! # Relay Server
//!
//! WebSocket hub that fans every envelope out to every connected origin.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   origin A ──ws──┐                                  ┌──ws──► origin A   │
//! │                  │   parse Envelope                  │                   │
//! │   origin B ──ws──┼──► (malformed: warn, drop) ──► broadcast ──ws──► B   │
//! │                  │                                   │                   │
//! │   origin C ──ws──┘                                  └──ws──► origin C   │
//! │                                                                         │
//! │   The sender gets its own envelope back and discards it by originId.   │
//! │   The relay keeps no state about topics or payloads.                   │
//! │                                                                         │
//! │   GET /health → "OK"                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::protocol::Envelope;

// =============================================================================
// Constants
// =============================================================================

/// Default relay port.
pub const DEFAULT_RELAY_PORT: u16 = 8765;

/// Ping interval to keep connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum message size (1MB).
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Envelopes buffered per slow client before it starts losing them.
const FANOUT_CAPACITY: usize = 1024;

// =============================================================================
// Relay Configuration
// =============================================================================

/// Configuration for the relay server.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Bind address.
    pub bind_addr: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            port: DEFAULT_RELAY_PORT,
            bind_addr: "0.0.0.0".to_string(),
        }
    }
}

impl RelayConfig {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

// =============================================================================
// Relay State
// =============================================================================

/// One connected origin.
#[derive(Debug, Clone)]
pub struct ConnectedClient {
    pub id: Uuid,
    pub addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

struct RelayState {
    clients: RwLock<HashMap<Uuid, ConnectedClient>>,
    fanout_tx: broadcast::Sender<Envelope>,
    relayed: AtomicU64,
    shutdown_rx: watch::Receiver<bool>,
}

impl RelayState {
    fn relay(&self, envelope: Envelope) {
        self.relayed.fetch_add(1, Ordering::Relaxed);
        let _ = self.fanout_tx.send(envelope);
    }
}

// =============================================================================
// Relay Server
// =============================================================================

/// Binds and serves the relay.
pub struct RelayServer {
    config: RelayConfig,
}

/// Handle for a running relay.
pub struct RelayHandle {
    local_addr: SocketAddr,
    state: Arc<RelayState>,
    shutdown_tx: watch::Sender<bool>,
    server: JoinHandle<()>,
}

impl RelayHandle {
    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL origins on this host can connect to.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.local_addr)
    }

    /// Returns the number of connected clients.
    pub async fn client_count(&self) -> usize {
        self.state.clients.read().await.len()
    }

    /// Envelopes accepted and fanned out so far.
    pub fn relayed_count(&self) -> u64 {
        self.state.relayed.load(Ordering::Relaxed)
    }

    /// Closes every client connection and stops the server.
    pub async fn shutdown(self) -> SyncResult<()> {
        self.shutdown_tx.send_replace(true);
        self.server
            .await
            .map_err(|e| SyncError::Internal(format!("Relay task failed: {}", e)))
    }
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        RelayServer { config }
    }

    /// Binds the listener, spawns the server and returns a handle.
    pub async fn start(self) -> SyncResult<RelayHandle> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (fanout_tx, _) = broadcast::channel(FANOUT_CAPACITY);

        let state = Arc::new(RelayState {
            clients: RwLock::new(HashMap::new()),
            fanout_tx,
            relayed: AtomicU64::new(0),
            shutdown_rx: shutdown_rx.clone(),
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state.clone());

        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SyncError::BindFailed {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| SyncError::BindFailed {
            addr: bind_addr.clone(),
            reason: e.to_string(),
        })?;

        info!(addr = %local_addr, "Relay server started");

        let mut graceful_rx = shutdown_rx;
        let server = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = graceful_rx.wait_for(|stop| *stop).await;
                info!("Relay server shutting down");
            })
            .await;

            if let Err(e) = result {
                warn!(error = %e, "Relay server stopped with error");
            }
        });

        Ok(RelayHandle {
            local_addr,
            state,
            shutdown_tx,
            server,
        })
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!(addr = %addr, "New WebSocket connection");
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

// =============================================================================
// Connection
// =============================================================================

async fn handle_socket(socket: WebSocket, state: Arc<RelayState>, addr: SocketAddr) {
    let client = ConnectedClient {
        id: Uuid::new_v4(),
        addr,
        connected_at: Utc::now(),
    };
    let client_id = client.id;
    state.clients.write().await.insert(client_id, client);
    info!(client = %client_id, addr = %addr, "Origin connected");

    let (sender, mut receiver) = socket.split();
    let fanout_rx = state.fanout_tx.subscribe();
    let writer = tokio::spawn(write_loop(sender, fanout_rx, client_id));

    let mut shutdown_rx = state.shutdown_rx.clone();
    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => match Envelope::from_json(&text) {
                    Ok(envelope) => {
                        debug!(client = %client_id, topic = %envelope.topic, "Relaying envelope");
                        state.relay(envelope);
                    }
                    Err(e) => warn!(client = %client_id, error = %e, "Dropping malformed frame"),
                },
                Some(Ok(Message::Binary(data))) => {
                    match serde_json::from_slice::<Envelope>(&data) {
                        Ok(envelope) => state.relay(envelope),
                        Err(e) => warn!(client = %client_id, error = %e, "Dropping malformed binary frame"),
                    }
                }
                // Pongs are answered by axum; pings keep the socket warm.
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(client = %client_id, "Client requested close");
                    break;
                }
                Some(Err(e)) => {
                    warn!(client = %client_id, error = %e, "WebSocket error");
                    break;
                }
                None => break,
            },

            _ = async { let _ = shutdown_rx.wait_for(|stop| *stop).await; } => break,
        }
    }

    writer.abort();
    if state.clients.write().await.remove(&client_id).is_some() {
        info!(client = %client_id, "Origin disconnected");
    }
}

/// Forwards fanned-out envelopes and keepalive pings to one client.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut fanout_rx: broadcast::Receiver<Envelope>,
    client_id: Uuid,
) {
    let mut ping = interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        let message = tokio::select! {
            received = fanout_rx.recv() => match received {
                Ok(envelope) => match envelope.to_json() {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!(client = %client_id, error = %e, "Failed to encode envelope");
                        continue;
                    }
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(client = %client_id, skipped, "Client lagged, envelopes lost");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ping.tick() => Message::Ping(axum::body::Bytes::new()),
        };

        if sender.send(message).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Topic;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    fn local_config() -> RelayConfig {
        RelayConfig {
            port: 0,
            bind_addr: "127.0.0.1".to_string(),
        }
    }

    async fn next_envelope<S>(stream: &mut S) -> Envelope
    where
        S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("relay frame timed out")
                .expect("stream ended")
                .expect("websocket error");
            if let WsMessage::Text(text) = frame {
                return Envelope::from_json(&text).unwrap();
            }
        }
    }

    async fn wait_for_clients(handle: &RelayHandle, n: usize) {
        for _ in 0..100 {
            if handle.client_count().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay never saw {} clients", n);
    }

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.port, DEFAULT_RELAY_PORT);
        assert_eq!(config.bind_address(), "0.0.0.0:8765");
    }

    #[tokio::test]
    async fn test_envelope_reaches_every_client() {
        let handle = RelayServer::new(local_config()).start().await.unwrap();

        let (a, _) = connect_async(handle.ws_url()).await.unwrap();
        let (b, _) = connect_async(handle.ws_url()).await.unwrap();
        let (mut a_tx, mut a_rx) = a.split();
        let (_b_tx, mut b_rx) = b.split();
        wait_for_clients(&handle, 2).await;

        let envelope = Envelope::new(Topic::MedicationDelete, json!({ "id": "m1" }), "origin-a");
        a_tx.send(WsMessage::Text(envelope.to_json().unwrap().into()))
            .await
            .unwrap();

        assert_eq!(next_envelope(&mut b_rx).await, envelope);
        // The sender hears its own echo too.
        assert_eq!(next_envelope(&mut a_rx).await, envelope);
        assert_eq!(handle.relayed_count(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frame_is_dropped() {
        let handle = RelayServer::new(local_config()).start().await.unwrap();

        let (a, _) = connect_async(handle.ws_url()).await.unwrap();
        let (b, _) = connect_async(handle.ws_url()).await.unwrap();
        let (mut a_tx, _a_rx) = a.split();
        let (_b_tx, mut b_rx) = b.split();
        wait_for_clients(&handle, 2).await;

        a_tx.send(WsMessage::Text("not json".to_string().into())).await.unwrap();
        let good = Envelope::new(Topic::ConfigUpdate, json!({ "section": "rules", "updates": {} }), "a");
        a_tx.send(WsMessage::Text(good.to_json().unwrap().into()))
            .await
            .unwrap();

        assert_eq!(next_envelope(&mut b_rx).await, good);
        assert_eq!(handle.relayed_count(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_removes_client() {
        let handle = RelayServer::new(local_config()).start().await.unwrap();

        let (mut a, _) = connect_async(handle.ws_url()).await.unwrap();
        wait_for_clients(&handle, 1).await;

        a.close(None).await.unwrap();
        wait_for_clients(&handle, 0).await;

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let handle = RelayServer::new(local_config()).start().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(handle.local_addr()).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: relay\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("OK"));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = RelayServer::new(local_config()).start().await.unwrap();
        let taken = RelayConfig {
            port: first.local_addr().port(),
            bind_addr: "127.0.0.1".to_string(),
        };

        let second = RelayServer::new(taken).start().await;
        assert!(matches!(second, Err(SyncError::BindFailed { .. })));

        first.shutdown().await.unwrap();
    }
}
