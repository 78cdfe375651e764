//! # State Repository
//!
//! Typed reads over the persistence layout, used once at startup.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key                              → value                               │
//! │  ───────────────────────────────    ───────────────────────────────     │
//! │  apotheca:medications             → [Medication]                        │
//! │  apotheca:movements               → [Movement]                          │
//! │  apotheca:categories              → [Category]                          │
//! │  apotheca:suppliers               → [Supplier]                          │
//! │  apotheca:alert-settings          → AlertSettings                       │
//! │  apotheca:acks:{userId}           → [alertId]                           │
//! │  apotheca:housekeeping:last-run   → "YYYY-MM-DD"                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing or undecodable document never fails startup: it is logged and
//! replaced by its empty/default value.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use apotheca_core::{AlertSettings, Category, Medication, Movement, Supplier};

use crate::error::DbResult;
use crate::keys;
use crate::repository::kv::KvRepository;

/// The replicated collections as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryData {
    pub medications: Vec<Medication>,
    pub movements: Vec<Movement>,
    pub categories: Vec<Category>,
    pub suppliers: Vec<Supplier>,
}

/// Typed access to persisted state.
#[derive(Debug, Clone)]
pub struct StateRepository {
    kv: KvRepository,
}

impl StateRepository {
    pub fn new(kv: KvRepository) -> Self {
        StateRepository { kv }
    }

    /// Loads every collection, defaulting per key.
    pub async fn load_inventory(&self) -> InventoryData {
        let data = InventoryData {
            medications: self.load_or_default(keys::MEDICATIONS).await,
            movements: self.load_or_default(keys::MOVEMENTS).await,
            categories: self.load_or_default(keys::CATEGORIES).await,
            suppliers: self.load_or_default(keys::SUPPLIERS).await,
        };

        info!(
            medications = data.medications.len(),
            movements = data.movements.len(),
            categories = data.categories.len(),
            suppliers = data.suppliers.len(),
            "Inventory loaded"
        );
        data
    }

    /// Writes every collection (used for imports and tests).
    pub async fn save_inventory(&self, data: &InventoryData) -> DbResult<()> {
        self.kv.put_json(keys::MEDICATIONS, &data.medications).await?;
        self.kv.put_json(keys::MOVEMENTS, &data.movements).await?;
        self.kv.put_json(keys::CATEGORIES, &data.categories).await?;
        self.kv.put_json(keys::SUPPLIERS, &data.suppliers).await?;
        Ok(())
    }

    /// Loads alert settings, falling back to defaults for bad values.
    pub async fn load_settings(&self) -> AlertSettings {
        match self.kv.get_json::<serde_json::Value>(keys::ALERT_SETTINGS).await {
            Ok(Some(value)) => AlertSettings::from_json_lenient(&value),
            Ok(None) => AlertSettings::default(),
            Err(e) => {
                warn!(error = %e, "Alert settings unreadable, using defaults");
                AlertSettings::default()
            }
        }
    }

    /// Loads one user's acknowledged alert ids.
    pub async fn load_acknowledgments(&self, user_id: &str) -> HashSet<String> {
        let ids: Vec<String> = self.load_or_default(&keys::acknowledgments(user_id)).await;
        ids.into_iter().collect()
    }

    /// Date of the last housekeeping run, if any.
    pub async fn load_last_housekeeping(&self) -> Option<NaiveDate> {
        self.load_or_default::<Option<NaiveDate>>(keys::LAST_HOUSEKEEPING)
            .await
    }

    async fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        match self.kv.get_json::<T>(key).await {
            Ok(Some(value)) => value,
            Ok(None) => T::default(),
            Err(e) => {
                warn!(key = %key, error = %e, "Persisted value unreadable, starting empty");
                T::default()
            }
        }
    }
}
