//! # Apotheca Relay
//!
//! WebSocket hub that forwards every envelope it receives to all other
//! connected origins. Holds no state of its own.
//!
//! ## Usage
//! ```text
//! apotheca-relay [CONFIG_PATH]
//! ```
//!
//! `APOTHECA_RELAY_PORT` overrides the listening port.

use std::path::PathBuf;

use apotheca_sync::{NodeConfig, RelayServer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting Apotheca Relay...");

    let config = NodeConfig::load_or_default(std::env::args().nth(1).map(PathBuf::from));
    let handle = RelayServer::new(config.relay.server_config()).start().await?;

    info!(
        address = %handle.local_addr(),
        url = %handle.ws_url(),
        "Relay listening"
    );

    shutdown_signal().await;

    info!(
        clients = handle.client_count().await,
        relayed = handle.relayed_count(),
        "Stopping relay"
    );
    handle.shutdown().await?;

    info!("Relay stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,apotheca=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
