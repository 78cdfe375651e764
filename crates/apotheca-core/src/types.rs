//! # Domain Types
//!
//! Entities replicated between origins.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   Medication    │   │    Movement     │   │ Category /      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │ Supplier        │       │
//! │  │  id (UUID)      │◄──│  medication_id  │   │  ─────────────  │       │
//! │  │  name (unique*) │   │  kind           │   │  id (UUID)      │       │
//! │  │  batch          │   │  delta (signed) │   │  name (unique*) │       │
//! │  │  quantity ≥ 0   │   │  reason, actor  │   └────────▲────────┘       │
//! │  │  category_id ───┼───┼─────────────────┼────────────┘                │
//! │  │  supplier_id ───┼───┘ append-only     │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  * unique on the normalized name, enforced by the store at mutation    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All types serialize camelCase: they travel inside envelope payloads and
//! are persisted as JSON collections.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::money::Money;

/// Generates a fresh entity id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Medication
// =============================================================================

/// A stocked medication batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,

    /// Display name. Uniqueness is checked on `normalize_name(name)`.
    pub name: String,

    /// Batch (lot) code printed on the packaging.
    pub batch: String,

    /// Units on hand. Never negative.
    pub quantity: i64,

    /// Reorder point; `None` falls back to the configured threshold.
    pub min_stock: Option<i64>,

    #[ts(as = "String")]
    pub expiry_date: NaiveDate,

    pub supplier_id: Option<String>,

    pub category_id: Option<String>,

    pub unit_price: Money,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    /// Minimum stock after applying the fallback for an unset threshold.
    #[inline]
    pub fn effective_min(&self, fallback: i64) -> i64 {
        match self.min_stock {
            Some(min) if min > 0 => min,
            _ => fallback,
        }
    }

    /// Days from `today` until expiry; negative once expired.
    #[inline]
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }

    #[inline]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    /// Stock valuation at unit price.
    #[inline]
    pub fn stock_value(&self) -> Money {
        self.unit_price.times(self.quantity)
    }

    /// True when the medication points at the given category or supplier.
    pub fn references(&self, kind: ReferenceKind, id: &str) -> bool {
        let field = match kind {
            ReferenceKind::Category => &self.category_id,
            ReferenceKind::Supplier => &self.supplier_id,
        };
        field.as_deref() == Some(id)
    }
}

/// Which foreign reference of a medication is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Category,
    Supplier,
}

// =============================================================================
// Movement
// =============================================================================

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock received.
    Inbound,
    /// Stock dispensed, returned or discarded.
    Outbound,
    /// Manual correction; the delta carries its own sign.
    Adjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "inbound",
            MovementKind::Outbound => "outbound",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Converts a requested quantity into the signed ledger delta.
    ///
    /// Inbound is always positive, outbound always negative; adjustments
    /// keep the caller's sign.
    pub fn signed_delta(&self, quantity: i64) -> i64 {
        match self {
            MovementKind::Inbound => quantity.saturating_abs(),
            MovementKind::Outbound => -quantity.saturating_abs(),
            MovementKind::Adjustment => quantity,
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbound" | "in" => Ok(MovementKind::Inbound),
            "outbound" | "out" => Ok(MovementKind::Outbound),
            "adjustment" | "adjust" => Ok(MovementKind::Adjustment),
            _ => Err(format!("Invalid movement kind: {}", s)),
        }
    }
}

/// One ledger entry. Movements are never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Movement {
    pub id: String,

    pub medication_id: String,

    pub kind: MovementKind,

    /// Signed change in units (inbound > 0, outbound < 0).
    pub delta: i64,

    pub reason: String,

    /// User id of whoever caused the movement.
    pub actor: String,

    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,

    /// Set on movements recorded alongside a medication snapshot that
    /// already carries the absolute quantity (initial stock, quantity
    /// edits). Peers append these to the ledger without re-applying them.
    #[serde(default)]
    pub synthesized: bool,
}

impl Movement {
    /// Unsigned size of the movement.
    #[inline]
    pub fn quantity(&self) -> i64 {
        self.delta.saturating_abs()
    }

    #[inline]
    pub fn is_inbound(&self) -> bool {
        self.delta > 0
    }

    #[inline]
    pub fn is_outbound(&self) -> bool {
        self.delta < 0
    }
}

// =============================================================================
// Category / Supplier
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub contact_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Roles
// =============================================================================

/// Role of the signed-in user; drives alert visibility and config rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Pharmacist,
    Technician,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Pharmacist => "pharmacist",
            Role::Technician => "technician",
        }
    }

    /// Only administrators may change alert configuration.
    #[inline]
    pub fn can_configure(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" | "administrator" => Ok(Role::Admin),
            "pharmacist" => Ok(Role::Pharmacist),
            "technician" | "tech" => Ok(Role::Technician),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// The user on whose behalf an origin evaluates alerts and records movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub role: Role,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(min_stock: Option<i64>) -> Medication {
        Medication {
            id: new_id(),
            name: "Amoxicilina 500mg".into(),
            batch: "AMX-01".into(),
            quantity: 12,
            min_stock,
            expiry_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            supplier_id: None,
            category_id: Some("cat-1".into()),
            unit_price: Money::from_cents(350),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_effective_min_fallback() {
        assert_eq!(sample(Some(20)).effective_min(10), 20);
        assert_eq!(sample(None).effective_min(10), 10);
        assert_eq!(sample(Some(0)).effective_min(10), 10);
    }

    #[test]
    fn test_expiry_helpers() {
        let med = sample(None);
        let today = NaiveDate::from_ymd_opt(2026, 2, 24).unwrap();
        assert_eq!(med.days_to_expiry(today), 5);
        assert!(!med.is_expired(today));
        assert!(med.is_expired(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()));
        // Expiring today is not yet expired
        assert!(!med.is_expired(med.expiry_date));
    }

    #[test]
    fn test_signed_delta() {
        assert_eq!(MovementKind::Inbound.signed_delta(5), 5);
        assert_eq!(MovementKind::Outbound.signed_delta(5), -5);
        assert_eq!(MovementKind::Adjustment.signed_delta(-3), -3);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("tech".parse::<Role>().unwrap(), Role::Technician);
        assert!("cashier".parse::<Role>().is_err());
        assert!(Role::Admin.can_configure());
        assert!(!Role::Pharmacist.can_configure());
    }

    #[test]
    fn test_references() {
        let med = sample(None);
        assert!(med.references(ReferenceKind::Category, "cat-1"));
        assert!(!med.references(ReferenceKind::Supplier, "cat-1"));
    }

    #[test]
    fn test_movement_defaults_unsynthesized() {
        let json = serde_json::json!({
            "id": "m1",
            "medicationId": "med",
            "kind": "outbound",
            "delta": -2,
            "reason": "dispensed",
            "actor": "u1",
            "timestamp": "2026-01-01T10:00:00Z"
        });
        let movement: Movement = serde_json::from_value(json).unwrap();
        assert!(!movement.synthesized);
        assert_eq!(movement.quantity(), 2);
        assert!(movement.is_outbound());
    }
}
