//! Two origins on different hosts (separate local broadcasts) talking
//! through a real relay on localhost.

use std::sync::Arc;
use std::time::Duration;

use apotheca_sync::{
    ConnectionState, Handler, LocalBroadcast, NetworkConfig, RealtimeBus, RelayConfig,
    RelayServer, Topic, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn recorder() -> (Handler, mpsc::UnboundedReceiver<(Value, String)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler: Handler = Arc::new(move |payload: &Value, origin: &str| {
        let _ = tx.send((payload.clone(), origin.to_string()));
    });
    (handler, rx)
}

fn fast(url: String) -> NetworkConfig {
    NetworkConfig {
        connect_timeout: Duration::from_secs(2),
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(200),
        ..NetworkConfig::new(url)
    }
}

async fn connected(bus: &RealtimeBus) {
    let mut state = bus.watch_network().expect("networked bus");
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Connected),
    )
    .await
    .expect("relay connection timed out")
    .expect("network channel stopped");
}

#[tokio::test]
async fn test_envelope_crosses_hosts_through_relay() {
    let relay = RelayServer::new(RelayConfig {
        port: 0,
        bind_addr: "127.0.0.1".into(),
    })
    .start()
    .await
    .unwrap();

    let host_a = LocalBroadcast::default();
    let host_b = LocalBroadcast::default();
    let a = RealtimeBus::connect(&host_a, fast(relay.ws_url()));
    let b = RealtimeBus::connect(&host_b, fast(relay.ws_url()));
    connected(&a).await;
    connected(&b).await;

    let (handler, mut seen) = recorder();
    let _sub = b.subscribe(Topic::MedicationUpdate, handler);
    let (own, mut own_seen) = recorder();
    let _own = a.subscribe(Topic::MedicationUpdate, own);

    a.publish(
        Topic::MedicationUpdate,
        json!({ "id": "m1", "updates": { "quantity": 3 } }),
    );

    let (payload, origin) = timeout(Duration::from_secs(2), seen.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload["updates"]["quantity"], 3);
    assert_eq!(origin, a.origin_id());

    // A's echo from the relay is discarded.
    assert!(timeout(Duration::from_millis(200), own_seen.recv()).await.is_err());

    a.shutdown();
    b.shutdown();
    relay.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_channel_reconnects_after_relay_restart() {
    let relay = RelayServer::new(RelayConfig {
        port: 0,
        bind_addr: "127.0.0.1".into(),
    })
    .start()
    .await
    .unwrap();
    let addr = relay.local_addr();

    let local = LocalBroadcast::default();
    let bus = RealtimeBus::connect(&local, fast(relay.ws_url()));
    connected(&bus).await;

    relay.shutdown().await.unwrap();
    let mut state = bus.watch_network().unwrap();
    timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s != ConnectionState::Connected),
    )
    .await
    .unwrap()
    .unwrap();

    let _restarted = RelayServer::new(RelayConfig {
        port: addr.port(),
        bind_addr: "127.0.0.1".into(),
    })
    .start()
    .await
    .unwrap();
    connected(&bus).await;

    bus.shutdown();
}
