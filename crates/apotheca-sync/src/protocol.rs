//! # Replication Protocol
//!
//! The envelope every origin publishes and the topics it may carry.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Replication Topics                                 │
//! │                                                                         │
//! │  INVENTORY                                                             │
//! │  ─────────                                                             │
//! │  medication.add      Medication snapshot                               │
//! │  medication.update   { id, updates }                                   │
//! │  medication.delete   { id }                                            │
//! │  movement.add        Movement (append-only ledger entry)               │
//! │                                                                         │
//! │  REFERENCE DATA                                                        │
//! │  ──────────────                                                        │
//! │  category.add|update|delete   same shapes as medication.*              │
//! │  supplier.add|update|delete   same shapes as medication.*              │
//! │                                                                         │
//! │  CONFIGURATION                                                         │
//! │  ─────────────                                                         │
//! │  config.update       { section, updates }                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! ```json
//! { "topic": "medication.update",
//!   "payload": { "id": "…", "updates": { "quantity": 12 } },
//!   "originId": "5f0c…" }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::SyncError;

// =============================================================================
// Topics
// =============================================================================

/// A named replication channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    MedicationAdd,
    MedicationUpdate,
    MedicationDelete,
    MovementAdd,
    CategoryAdd,
    CategoryUpdate,
    CategoryDelete,
    SupplierAdd,
    SupplierUpdate,
    SupplierDelete,
    ConfigUpdate,
}

impl Topic {
    /// Every topic, in a stable order.
    pub const ALL: [Topic; 11] = [
        Topic::MedicationAdd,
        Topic::MedicationUpdate,
        Topic::MedicationDelete,
        Topic::MovementAdd,
        Topic::CategoryAdd,
        Topic::CategoryUpdate,
        Topic::CategoryDelete,
        Topic::SupplierAdd,
        Topic::SupplierUpdate,
        Topic::SupplierDelete,
        Topic::ConfigUpdate,
    ];

    /// Topics carrying inventory state (everything but configuration).
    pub const INVENTORY: [Topic; 10] = [
        Topic::MedicationAdd,
        Topic::MedicationUpdate,
        Topic::MedicationDelete,
        Topic::MovementAdd,
        Topic::CategoryAdd,
        Topic::CategoryUpdate,
        Topic::CategoryDelete,
        Topic::SupplierAdd,
        Topic::SupplierUpdate,
        Topic::SupplierDelete,
    ];

    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MedicationAdd => "medication.add",
            Topic::MedicationUpdate => "medication.update",
            Topic::MedicationDelete => "medication.delete",
            Topic::MovementAdd => "movement.add",
            Topic::CategoryAdd => "category.add",
            Topic::CategoryUpdate => "category.update",
            Topic::CategoryDelete => "category.delete",
            Topic::SupplierAdd => "supplier.add",
            Topic::SupplierUpdate => "supplier.update",
            Topic::SupplierDelete => "supplier.delete",
            Topic::ConfigUpdate => "config.update",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| SyncError::UnknownTopic(s.to_string()))
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// The unit of replication.
///
/// `topic` stays a plain string on the wire so a newer origin's topics
/// pass through older relays untouched; receivers parse it with
/// [`Envelope::topic`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub topic: String,
    pub payload: Value,
    pub origin_id: String,
}

impl Envelope {
    pub fn new(topic: Topic, payload: Value, origin_id: impl Into<String>) -> Self {
        Envelope {
            topic: topic.as_str().to_string(),
            payload,
            origin_id: origin_id.into(),
        }
    }

    /// Parsed topic, if this build knows it.
    pub fn topic(&self) -> Result<Topic, SyncError> {
        self.topic.parse()
    }

    /// True when `origin_id` published this envelope.
    pub fn is_from(&self, origin_id: &str) -> bool {
        self.origin_id == origin_id
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::InvalidMessage(e.to_string()))
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Payload of `*.update` topics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate<T = Value> {
    pub id: String,
    pub updates: T,
}

/// Payload of `*.delete` topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

/// Payload of `config.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub section: String,
    pub updates: Value,
}
