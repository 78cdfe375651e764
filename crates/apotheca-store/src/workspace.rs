//! Everything the dispatcher owns for one origin.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use apotheca_core::{AlertSettings, AlertView, UserContext};
use apotheca_db::{PersistHandle, StateRepository};
use apotheca_sync::{Envelope, Topic, Transport};

use crate::alert_center::AlertCenter;
use crate::config_store::ConfigStore;
use crate::error::StoreResult;
use crate::store::InventoryStore;

/// Inventory, configuration and alert state of one origin.
///
/// Fields are public so dispatcher commands can reach each part directly.
pub struct Workspace {
    pub store: InventoryStore,
    pub settings: ConfigStore,
    pub alerts: AlertCenter,
}

impl Workspace {
    pub fn new(store: InventoryStore, settings: ConfigStore, alerts: AlertCenter) -> Self {
        Workspace {
            store,
            settings,
            alerts,
        }
    }

    /// Restores persisted state for `user`. Missing or unreadable documents
    /// fall back to empty collections and default settings.
    pub async fn load(
        state: &StateRepository,
        persist: PersistHandle,
        transport: Arc<dyn Transport>,
        user: UserContext,
    ) -> Self {
        let inventory = state.load_inventory().await;
        let settings = state.load_settings().await;
        let acknowledged = state.load_acknowledgments(&user.user_id).await;
        let last_run = state.load_last_housekeeping().await;

        info!(
            user = %user.user_id,
            role = %user.role,
            acknowledged = acknowledged.len(),
            "Workspace loaded"
        );

        Workspace {
            store: InventoryStore::new(inventory, persist.clone(), transport.clone())
                .with_last_housekeeping(last_run),
            settings: ConfigStore::new(settings, persist.clone(), transport),
            alerts: AlertCenter::new(user, acknowledged, persist),
        }
    }

    /// User id recorded as the actor of local mutations.
    pub fn actor(&self) -> &str {
        &self.alerts.user().user_id
    }

    /// Routes a peer's envelope to the part that owns its topic.
    pub fn apply_remote(&mut self, envelope: &Envelope) -> bool {
        match envelope.topic() {
            Ok(Topic::ConfigUpdate) => self.settings.apply_remote(envelope),
            Ok(_) => self.store.apply_remote(envelope),
            Err(_) => false,
        }
    }

    pub fn recompute_alerts(&mut self, now: DateTime<FixedOffset>) -> &AlertView {
        self.alerts
            .recompute(&self.store, self.settings.settings(), now)
    }

    /// Changes one configuration section as the signed-in user.
    pub fn update_settings(&mut self, section: &str, updates: Value) -> StoreResult<AlertSettings> {
        self.settings
            .update(self.alerts.user(), section, updates)
            .cloned()
    }
}
