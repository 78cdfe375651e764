//! # Local Broadcast
//!
//! Same-host fan-out between origins sharing one process (or one test).
//! Every attached bus sees every envelope, including its own; the bus
//! drops its own echo by origin id.
//!
//! There is no connection to lose here, so nothing backs off. A receiver
//! that falls more than the channel capacity behind skips the oldest
//! envelopes and logs how many it lost.

use tokio::sync::broadcast;
use tracing::trace;

use crate::protocol::Envelope;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Cloneable handle to one shared broadcast channel.
#[derive(Debug, Clone)]
pub struct LocalBroadcast {
    sender: broadcast::Sender<Envelope>,
}

impl LocalBroadcast {
    /// Creates a channel holding up to `capacity` undelivered envelopes.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        LocalBroadcast { sender }
    }

    /// Sends to every attached receiver. No receivers is not an error.
    pub fn send(&self, envelope: Envelope) {
        trace!(topic = %envelope.topic, origin = %envelope.origin_id, "Local broadcast");
        let _ = self.sender.send(envelope);
    }

    /// Attaches a new receiver that sees envelopes sent from now on.
    pub fn attach(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    /// Number of attached receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalBroadcast {
    fn default() -> Self {
        LocalBroadcast::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Topic;
    use serde_json::json;

    #[tokio::test]
    async fn test_every_receiver_sees_envelope() {
        let local = LocalBroadcast::default();
        let mut a = local.attach();
        let mut b = local.attach();

        local.send(Envelope::new(Topic::MedicationDelete, json!({"id": "m1"}), "o1"));

        assert_eq!(a.recv().await.unwrap().origin_id, "o1");
        assert_eq!(b.recv().await.unwrap().topic, "medication.delete");
        assert_eq!(local.receiver_count(), 2);
    }

    #[test]
    fn test_send_without_receivers_is_silent() {
        let local = LocalBroadcast::default();
        local.send(Envelope::new(Topic::ConfigUpdate, json!({}), "o1"));
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let local = LocalBroadcast::new(2);
        let mut rx = local.attach();
        for i in 0..4 {
            local.send(Envelope::new(Topic::MovementAdd, json!({ "n": i }), "o1"));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
        assert_eq!(rx.recv().await.unwrap().payload["n"], 2);
    }
}
