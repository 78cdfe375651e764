//! # Apotheca Node
//!
//! One origin of the replicated pharmacy state, without a UI. Loads what was
//! persisted, joins the bus, and logs the alert view every time it changes.
//!
//! ## Usage
//! ```text
//! apotheca-node [CONFIG_PATH]
//! ```
//!
//! Environment overrides: `APOTHECA_RELAY_URL`, `APOTHECA_DB_PATH`,
//! `APOTHECA_USER_ID`, `APOTHECA_ROLE`, `APOTHECA_NODE_NAME`.

use std::path::PathBuf;
use std::sync::Arc;

use apotheca_core::AlertView;
use apotheca_db::{Database, DbConfig, PersistWriter};
use apotheca_store::{Dispatcher, DispatcherConfig, SystemClock, Workspace};
use apotheca_sync::{LocalBroadcast, NodeConfig, RealtimeBus, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = NodeConfig::load(std::env::args().nth(1).map(PathBuf::from))?;
    let user = config.user();
    info!(
        node = %config.node.name,
        user = %user.user_id,
        role = %user.role,
        relay = config.relay_url().unwrap_or("none"),
        "Starting Apotheca node..."
    );

    let path = config.storage.resolved_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(DbConfig::new(&path)).await?;
    info!(path = %path.display(), "Database ready");

    let (persist, writer) = PersistWriter::spawn(db.kv());

    let local = LocalBroadcast::default();
    let bus = Arc::new(match config.network.channel_config() {
        Some(network) => RealtimeBus::connect(&local, network),
        None => RealtimeBus::in_process(&local),
    });
    info!(origin = %bus.origin_id(), "Joined bus");

    let workspace = Workspace::load(&db.state(), persist.clone(), bus.clone(), user).await;
    let (dispatcher, join) = Dispatcher::spawn(
        workspace,
        bus.as_ref(),
        Arc::new(SystemClock),
        DispatcherConfig::with_interval(config.alerts.interval()),
    );

    let mut alerts = dispatcher.alerts();
    log_view(&alerts.borrow_and_update());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = alerts.changed() => {
                if changed.is_err() {
                    warn!("Dispatcher stopped unexpectedly");
                    break;
                }
                log_view(&alerts.borrow_and_update());
            }
        }
    }

    dispatcher.shutdown().await;
    match join.await {
        Ok(workspace) => info!(revision = workspace.store.revision(), "Dispatcher stopped"),
        Err(e) => error!(error = %e, "Dispatcher task failed"),
    }

    if let Err(e) = persist.flush().await {
        error!(error = %e, "Failed to flush pending writes");
    }
    drop(persist);
    drop(dispatcher);
    if let Err(e) = writer.await {
        error!(error = %e, "Persistence writer failed");
    }

    bus.shutdown();
    db.close().await;

    info!("Node stopped");
    Ok(())
}

fn log_view(view: &AlertView) {
    info!(
        visible = view.visible.len(),
        high = view.summary.high,
        medium = view.summary.medium,
        low = view.summary.low,
        acknowledged = view.acknowledged,
        suppressed = view.suppressed,
        quiet_hours = view.quiet_hours_active,
        "Alerts updated"
    );
    for alert in &view.visible {
        info!(
            id = %alert.id,
            severity = %alert.severity,
            medication = %alert.medication_name,
            "{}",
            alert.message
        );
    }
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
