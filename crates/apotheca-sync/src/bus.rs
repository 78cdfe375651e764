//! # Realtime Bus
//!
//! The production [`Transport`]: local broadcast always, relay socket when
//! configured and connected.
//!
//! ## Delivery Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  publish(topic, payload)                                                │
//! │    │  Envelope { topic, payload, originId = self }                      │
//! │    ├──► LocalBroadcast.send            (always)                         │
//! │    └──► NetworkHandle.send             (dropped unless Connected)       │
//! │                                                                         │
//! │  pump task                                                              │
//! │    select! { local.recv, network.recv, shutdown }                       │
//! │      │                                                                  │
//! │      ├─ originId == self ──► discard (own echo)                         │
//! │      └─ otherwise ─────────► HandlerRegistry.dispatch                   │
//! │                                 handler(payload, originId) ...          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An envelope can reach a peer twice when both channels carry it. Nothing
//! here deduplicates; receivers decide what a repeat means.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::local::LocalBroadcast;
use crate::network::{ConnectionState, NetworkChannel, NetworkConfig, NetworkHandle};
use crate::protocol::{Envelope, Topic};
use crate::transport::{Handler, HandlerRegistry, Subscription, Transport};

/// One origin's connection to its peers.
pub struct RealtimeBus {
    origin_id: String,
    local: LocalBroadcast,
    network: Option<NetworkHandle>,
    registry: Arc<HandlerRegistry>,
    shutdown_tx: watch::Sender<bool>,
}

impl RealtimeBus {
    /// A bus that only talks to other buses on `local` (no network).
    ///
    /// Must be called from within a tokio runtime.
    pub fn in_process(local: &LocalBroadcast) -> Self {
        RealtimeBus::start(local, None)
    }

    /// A bus on `local` that also relays through a WebSocket relay.
    pub fn connect(local: &LocalBroadcast, network: NetworkConfig) -> Self {
        RealtimeBus::start(local, Some(network))
    }

    fn start(local: &LocalBroadcast, network: Option<NetworkConfig>) -> Self {
        let origin_id = Uuid::new_v4().to_string();
        let registry = HandlerRegistry::new();
        let local_rx = local.attach();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let (network, network_rx) = match network {
            Some(config) => {
                let (handle, incoming) = NetworkChannel::spawn(config);
                (Some(handle), Some(incoming))
            }
            None => (None, None),
        };

        info!(origin = %origin_id, networked = network.is_some(), "Realtime bus starting");

        tokio::spawn(pump(
            origin_id.clone(),
            registry.clone(),
            local_rx,
            network_rx,
            shutdown_rx,
        ));

        RealtimeBus {
            origin_id,
            local: local.clone(),
            network,
            registry,
            shutdown_tx,
        }
    }

    /// Relay connection state, if this bus has a network channel.
    pub fn network_state(&self) -> Option<ConnectionState> {
        self.network.as_ref().map(NetworkHandle::state)
    }

    /// Observer for relay connection changes.
    pub fn watch_network(&self) -> Option<watch::Receiver<ConnectionState>> {
        self.network.as_ref().map(NetworkHandle::watch_state)
    }

    /// Stops the pump and the network channel. Idempotent.
    pub fn shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            debug!(origin = %self.origin_id, "Realtime bus shutting down");
        }
        if let Some(network) = &self.network {
            network.shutdown();
        }
    }
}

impl Transport for RealtimeBus {
    fn origin_id(&self) -> &str {
        &self.origin_id
    }

    fn publish(&self, topic: Topic, payload: Value) {
        let envelope = Envelope::new(topic, payload, self.origin_id.clone());
        trace!(topic = %topic, origin = %self.origin_id, "Publishing");

        if let Some(network) = &self.network {
            network.send(envelope.clone());
        }
        self.local.send(envelope);
    }

    fn subscribe(&self, topic: Topic, handler: Handler) -> Subscription {
        self.registry.register(topic, handler)
    }
}

impl Drop for RealtimeBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// Pump
// =============================================================================

async fn pump(
    origin_id: String,
    registry: Arc<HandlerRegistry>,
    mut local_rx: broadcast::Receiver<Envelope>,
    mut network_rx: Option<mpsc::Receiver<Envelope>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            received = local_rx.recv() => match received {
                Ok(envelope) => deliver(&origin_id, &registry, &envelope),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(origin = %origin_id, skipped, "Local broadcast lagged, envelopes lost");
                }
                Err(RecvError::Closed) => break,
            },

            received = recv_network(&mut network_rx) => match received {
                Some(envelope) => deliver(&origin_id, &registry, &envelope),
                None => {
                    debug!(origin = %origin_id, "Network channel finished");
                    network_rx = None;
                }
            },

            _ = shutdown_rx.changed() => break,
        }
    }

    info!(origin = %origin_id, "Realtime bus stopped");
}

async fn recv_network(rx: &mut Option<mpsc::Receiver<Envelope>>) -> Option<Envelope> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn deliver(origin_id: &str, registry: &HandlerRegistry, envelope: &Envelope) {
    if envelope.is_from(origin_id) {
        trace!(topic = %envelope.topic, "Discarding own echo");
        return;
    }
    registry.dispatch(envelope);
}
