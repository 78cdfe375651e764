//! # Network Channel
//!
//! WebSocket client to the relay with automatic reconnection and backoff.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Disconnected ──► Connecting ──ok──► Connected ──closed/error──┐       │
//! │                        │                  │                     │       │
//! │                        └──err──► Backoff ◄┴─────────────────────┘       │
//! │                                    │                                    │
//! │                        sleep(d) ───┴──► Reconnecting ──► Connecting     │
//! │                                                                         │
//! │   d = base, base*2, base*4, ... capped at max                           │
//! │   d resets to base after every successful connect                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sending is best effort: envelopes handed over while the channel is not
//! `Connected` are dropped, and nothing is retried on send.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::protocol::Envelope;

/// Buffered envelopes in each direction.
const CHANNEL_CAPACITY: usize = 256;
const MIN_PING_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Connection State
// =============================================================================

/// Connection state for the network channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Waiting before reconnection attempt.
    Backoff,
    /// Reconnection in progress.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Channel Configuration
// =============================================================================

/// Configuration for the network channel.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Relay WebSocket URL.
    pub url: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Delay before the first reconnection attempt.
    pub initial_backoff: Duration,

    /// Upper bound for the reconnection delay.
    pub max_backoff: Duration,

    /// Maximum reconnection attempts (0 = infinite).
    pub max_retries: u32,

    /// Ping interval for keepalive.
    pub ping_interval: Duration,
}

impl NetworkConfig {
    pub fn new(url: impl Into<String>) -> Self {
        NetworkConfig {
            url: url.into(),
            ..Default::default()
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_retries: 0, // Infinite
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Exponential reconnection schedule: doubling from `initial_backoff`,
/// capped at `max_backoff`, no jitter, no overall deadline.
pub fn reconnect_backoff(config: &NetworkConfig) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: config.initial_backoff,
        initial_interval: config.initial_backoff,
        randomization_factor: 0.0,
        multiplier: 2.0,
        max_interval: config.max_backoff,
        max_elapsed_time: None, // No limit on total time
        ..Default::default()
    }
}

// =============================================================================
// Channel Handle
// =============================================================================

/// Handle for sending through the channel and observing its state.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    outgoing_tx: mpsc::Sender<Envelope>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
}

impl NetworkHandle {
    /// Queues an envelope if connected. Returns whether it was queued.
    pub fn send(&self, envelope: Envelope) -> bool {
        if *self.state_rx.borrow() != ConnectionState::Connected {
            debug!(topic = %envelope.topic, "Relay not connected, dropping envelope");
            return false;
        }
        match self.outgoing_tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                warn!(topic = %envelope.topic, "Outgoing queue full, dropping envelope");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Returns true if currently connected.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Stops the channel. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

// =============================================================================
// Network Channel
// =============================================================================

/// WebSocket client task with automatic reconnection.
///
/// ## Usage
/// ```rust,ignore
/// let (handle, mut incoming) = NetworkChannel::spawn(NetworkConfig::new("ws://relay:8765/ws"));
///
/// handle.send(envelope);
///
/// while let Some(envelope) = incoming.recv().await {
///     println!("Received: {}", envelope.topic);
/// }
/// ```
pub struct NetworkChannel {
    config: NetworkConfig,
    state_tx: watch::Sender<ConnectionState>,
    outgoing_rx: mpsc::Receiver<Envelope>,
    incoming_tx: mpsc::Sender<Envelope>,
    shutdown_rx: watch::Receiver<bool>,
}

impl NetworkChannel {
    /// Spawns the background task.
    ///
    /// Returns a handle for sending and a receiver for incoming envelopes.
    pub fn spawn(config: NetworkConfig) -> (NetworkHandle, mpsc::Receiver<Envelope>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);
        let (incoming_tx, incoming_rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let channel = NetworkChannel {
            config,
            state_tx,
            outgoing_rx,
            incoming_tx,
            shutdown_rx,
        };

        tokio::spawn(channel.run());

        let handle = NetworkHandle {
            outgoing_tx,
            state_rx,
            shutdown_tx,
        };

        (handle, incoming_rx)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    fn stopping(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Main reconnect loop.
    async fn run(mut self) {
        info!(url = %self.config.url, "Network channel starting");

        let mut backoff = reconnect_backoff(&self.config);
        let mut retry_count = 0u32;

        loop {
            if self.stopping() {
                info!("Network channel received shutdown signal");
                break;
            }

            self.set_state(ConnectionState::Connecting);

            match self.connect_with_timeout().await {
                Ok(ws_stream) => {
                    info!(url = %self.config.url, "Relay connected");
                    self.set_state(ConnectionState::Connected);

                    backoff.reset();
                    retry_count = 0;

                    // Anything queued during a previous connection is stale.
                    while self.outgoing_rx.try_recv().is_ok() {}

                    if let Err(e) = self.connection_loop(ws_stream).await {
                        warn!(error = %e, "Relay connection ended");
                    }
                }
                Err(e) => {
                    debug!(error = %e, retryable = e.is_retryable(), "Failed to connect to relay");
                }
            }

            if self.stopping() {
                break;
            }

            self.set_state(ConnectionState::Backoff);

            if self.config.max_retries > 0 {
                retry_count += 1;
                if retry_count >= self.config.max_retries {
                    error!(
                        max_retries = self.config.max_retries,
                        "Max reconnection attempts reached"
                    );
                    break;
                }
            }

            let Some(duration) = backoff.next_backoff() else {
                error!("Backoff exhausted");
                break;
            };
            debug!(?duration, attempt = retry_count, "Waiting before reconnect");

            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    self.set_state(ConnectionState::Reconnecting);
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown during backoff");
                    break;
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Network channel stopped");
    }

    async fn connect_with_timeout(
        &self,
    ) -> SyncResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        match timeout(self.config.connect_timeout, connect_async(&self.config.url)).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    /// Pumps one live connection until it closes or shutdown is requested.
    async fn connection_loop(
        &mut self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> SyncResult<()> {
        let (mut write, mut read) = ws_stream.split();

        // tokio panics on a zero period
        let mut ping_interval = tokio::time::interval(self.config.ping_interval.max(MIN_PING_INTERVAL));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(envelope) = self.outgoing_rx.recv() => {
                    let json = envelope.to_json()?;
                    debug!(topic = %envelope.topic, "Sending envelope to relay");
                    write.send(WsMessage::Text(json.into())).await?;
                }

                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => match Envelope::from_json(&text) {
                            Ok(envelope) => {
                                if self.incoming_tx.send(envelope).await.is_err() {
                                    return Err(SyncError::ChannelError("Receiver dropped".into()));
                                }
                            }
                            Err(e) => warn!(error = %e, "Dropping malformed relay frame"),
                        },
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            debug!("Received pong");
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(?frame, "Relay closed the connection");
                            return Ok(());
                        }
                        Some(Ok(WsMessage::Binary(_))) => {
                            warn!("Received unexpected binary message");
                        }
                        Some(Ok(WsMessage::Frame(_))) => {}
                        Some(Err(e)) => return Err(SyncError::from(e)),
                        None => return Err(SyncError::Disconnected),
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(Vec::<u8>::new().into())).await?;
                }

                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, closing relay connection");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Topic;
    use serde_json::json;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
        assert_eq!(ConnectionState::Backoff.to_string(), "backoff");
    }

    #[test]
    fn test_network_config_default() {
        let config = NetworkConfig::new("ws://localhost:8765/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 0); // Infinite
        assert_eq!(config.url, "ws://localhost:8765/ws");
    }

    #[test]
    fn test_backoff_doubles_to_cap_and_resets() {
        let config = NetworkConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(1000),
            ..NetworkConfig::default()
        };
        let mut backoff = reconnect_backoff(&config);

        let delays: Vec<u128> = (0..6)
            .map(|_| backoff.next_backoff().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);

        backoff.reset();
        assert_eq!(backoff.next_backoff().unwrap().as_millis(), 100);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        // Nothing listens on port 9; the channel never reaches Connected.
        let (handle, _incoming) = NetworkChannel::spawn(NetworkConfig {
            connect_timeout: Duration::from_millis(200),
            ..NetworkConfig::new("ws://127.0.0.1:9/ws")
        });

        assert!(!handle.is_connected());
        assert!(!handle.send(Envelope::new(Topic::MovementAdd, json!({}), "o1")));
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let (handle, _incoming) = NetworkChannel::spawn(NetworkConfig {
            connect_timeout: Duration::from_millis(200),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(20),
            max_retries: 2,
            ..NetworkConfig::new("ws://127.0.0.1:9/ws")
        });

        let mut state = handle.watch_state();
        let reached = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if state.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        assert!(reached.is_ok(), "task should stop on its own");
        assert_eq!(handle.state(), ConnectionState::Disconnected);
    }
}
