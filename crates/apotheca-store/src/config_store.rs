//! Replicated alert configuration.
//!
//! Only administrators change it locally. Every origin merges
//! `config.update` from its peers, whatever the local user's role.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use apotheca_core::settings::SettingsSection;
use apotheca_core::{AlertSettings, CoreError, UserContext, Validate};
use apotheca_db::{keys, PersistHandle};
use apotheca_sync::{ConfigUpdate, Envelope, Topic, Transport};

use crate::error::StoreResult;

/// Owner of the current [`AlertSettings`].
pub struct ConfigStore {
    settings: AlertSettings,
    revision: u64,
    persist: PersistHandle,
    transport: Arc<dyn Transport>,
}

impl ConfigStore {
    pub fn new(settings: AlertSettings, persist: PersistHandle, transport: Arc<dyn Transport>) -> Self {
        ConfigStore {
            settings: settings.sanitized(),
            revision: 0,
            persist,
            transport,
        }
    }

    pub fn settings(&self) -> &AlertSettings {
        &self.settings
    }

    /// Increments on every applied change, local or remote.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Merges `updates` into one section and replicates the result.
    ///
    /// The published `updates` carry the whole normalized section, so peers
    /// converge even if they missed an earlier partial update.
    pub fn update(
        &mut self,
        user: &UserContext,
        section: &str,
        updates: Value,
    ) -> StoreResult<&AlertSettings> {
        if !user.role.can_configure() {
            return Err(CoreError::PermissionDenied {
                role: user.role.to_string(),
                action: "change alert configuration",
            }
            .into());
        }

        let section: SettingsSection = section.parse()?;
        let next = self.settings.with_section(section, &updates)?.validate()?;
        self.persist.put(keys::ALERT_SETTINGS, &next)?;

        let payload = ConfigUpdate {
            section: section.as_str().to_string(),
            updates: next.section_json(section),
        };
        self.settings = next;
        self.revision += 1;

        info!(section = %section, user = %user.user_id, "Alert configuration updated");
        match serde_json::to_value(&payload) {
            Ok(value) => self.transport.publish(Topic::ConfigUpdate, value),
            Err(e) => warn!(error = %e, "Configuration payload not serializable, not published"),
        }
        Ok(&self.settings)
    }

    /// Merges a peer's `config.update`. Returns whether settings changed.
    pub fn apply_remote(&mut self, envelope: &Envelope) -> bool {
        if envelope.is_from(self.transport.origin_id()) || !matches!(envelope.topic(), Ok(Topic::ConfigUpdate)) {
            return false;
        }

        let update: ConfigUpdate = match serde_json::from_value(envelope.payload.clone()) {
            Ok(update) => update,
            Err(e) => {
                warn!(origin = %envelope.origin_id, error = %e, "Undecodable config.update ignored");
                return false;
            }
        };

        let next = match update
            .section
            .parse::<SettingsSection>()
            .and_then(|section| self.settings.with_section(section, &update.updates))
        {
            Ok(next) => next.sanitized(),
            Err(e) => {
                warn!(origin = %envelope.origin_id, error = %e, "Rejected config.update ignored");
                return false;
            }
        };

        if next == self.settings {
            return false;
        }
        if let Err(e) = self.persist.put(keys::ALERT_SETTINGS, &next) {
            warn!(error = %e, "Merged configuration not persisted, dropped");
            return false;
        }

        debug!(section = %update.section, origin = %envelope.origin_id, "Merged remote configuration");
        self.settings = next;
        self.revision += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::testing::RecordingTransport;
    use apotheca_core::Role;
    use apotheca_db::PersistOp;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn config() -> (ConfigStore, Arc<RecordingTransport>, mpsc::UnboundedReceiver<PersistOp>) {
        let (persist, rx) = PersistHandle::detached();
        let transport = Arc::new(RecordingTransport::new("local"));
        let store = ConfigStore::new(AlertSettings::default(), persist, transport.clone());
        (store, transport, rx)
    }

    fn admin() -> UserContext {
        UserContext::new("admin", Role::Admin)
    }

    #[test]
    fn test_admin_update_publishes_full_section() {
        let (mut store, transport, mut rx) = config();
        store
            .update(&admin(), "thresholds", json!({ "expiryDays": 45 }))
            .unwrap();

        assert_eq!(store.settings().thresholds.expiry_days, 45);
        assert_eq!(store.revision(), 1);

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, Topic::ConfigUpdate);
        assert_eq!(published[0].1["section"], "thresholds");
        assert_eq!(published[0].1["updates"]["expiryDays"], 45);
        assert_eq!(published[0].1["updates"]["criticalExpiryDays"], 7);

        assert_matches!(rx.try_recv(), Ok(PersistOp::Put { key, .. }) if key == keys::ALERT_SETTINGS);
    }

    #[test]
    fn test_non_admin_is_denied() {
        let (mut store, transport, _rx) = config();
        let pharmacist = UserContext::new("p1", Role::Pharmacist);

        let err = store
            .update(&pharmacist, "rules", json!({ "stock": false }))
            .unwrap_err();

        assert_matches!(err, StoreError::Core(CoreError::PermissionDenied { ref role, .. }) if role == "pharmacist");
        assert!(store.settings().rules.stock);
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_unknown_section_or_field_is_rejected() {
        let (mut store, _transport, _rx) = config();
        assert_matches!(
            store.update(&admin(), "colors", json!({})),
            Err(StoreError::Core(CoreError::Validation(_)))
        );
        assert_matches!(
            store.update(&admin(), "rules", json!({ "loud": true })),
            Err(StoreError::Core(CoreError::Validation(_)))
        );
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_out_of_range_threshold_is_rejected_and_not_replicated() {
        let (mut store, transport, mut rx) = config();

        let err = store
            .update(&admin(), "thresholds", json!({ "expiryDays": -5 }))
            .unwrap_err();
        assert_matches!(
            err,
            StoreError::Core(CoreError::Validation(ref errors)) if errors[0].field() == "expiryDays"
        );
        assert_matches!(
            store.update(&admin(), "thresholds", json!({ "criticalExpiryDays": 100_000 })),
            Err(StoreError::Core(CoreError::Validation(_)))
        );

        assert_eq!(store.settings(), &AlertSettings::default());
        assert_eq!(store.revision(), 0);
        assert!(transport.published().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_accepted_update_converges_on_peer() {
        let (mut local, local_transport, _rx) = config();
        let (mut peer, _peer_transport, _peer_rx) = config();

        local
            .update(&admin(), "thresholds", json!({ "expiryDays": 3650, "lowStockFallback": 0 }))
            .unwrap();
        let (topic, payload) = local_transport.published().remove(0);
        assert!(peer.apply_remote(&Envelope::new(topic, payload, "peer")));

        assert_eq!(peer.settings(), local.settings());
    }

    #[test]
    fn test_remote_update_merges_without_republishing() {
        let (mut store, transport, _rx) = config();
        let envelope = Envelope::new(
            Topic::ConfigUpdate,
            json!({ "section": "quietHours", "updates": { "enabled": true } }),
            "peer",
        );

        assert!(store.apply_remote(&envelope));
        assert!(store.settings().quiet_hours.enabled);
        assert!(!store.apply_remote(&envelope));
        assert!(transport.published().is_empty());
    }

    #[test]
    fn test_malformed_remote_update_keeps_settings() {
        let (mut store, _transport, _rx) = config();
        let envelope = Envelope::new(
            Topic::ConfigUpdate,
            json!({ "section": "thresholds", "updates": { "expiryDays": "soon" } }),
            "peer",
        );
        assert!(!store.apply_remote(&envelope));
        assert_eq!(store.settings(), &AlertSettings::default());
    }
}
