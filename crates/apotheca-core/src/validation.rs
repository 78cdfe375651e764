//! # Validation Module
//!
//! Typed validation for every mutation payload the store accepts.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  raw JSON (UI form) ──► validate_raw::<MedicationDraft>()               │
//! │                              │ decode errors → InvalidFormat            │
//! │                              ▼                                          │
//! │  MedicationDraft ─────► Validate::validate()                            │
//! │                              │ field rules, every failure collected    │
//! │                              ▼                                          │
//! │  tidy draft ──────────► InventoryStore                                  │
//! │                              │ uniqueness, references, stock           │
//! │                              ▼                                          │
//! │                         commit / reject (never partial)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators collect all field errors instead of stopping at the first,
//! so a form can highlight every bad field at once.
//!
//! ## Usage
//! ```rust
//! use apotheca_core::validation::{validate_raw, MovementDraft};
//!
//! let raw = serde_json::json!({
//!     "kind": "outbound",
//!     "medicationId": "med-1",
//!     "quantity": 0,
//!     "reason": ""
//! });
//! let errors = validate_raw::<MovementDraft>(raw).unwrap_err();
//! assert_eq!(errors.len(), 2);
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::normalize::tidy_display_name;
use crate::types::{Category, Medication, MovementKind, Supplier};
use crate::{MAX_BATCH_LEN, MAX_NAME_LEN, MAX_QUANTITY, MAX_REASON_LEN};

/// Result type for single-field validators.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// A payload that can check itself and produce a normalized value.
pub trait Validate: Sized {
    type Output;

    /// Returns the normalized value or every field error found.
    fn validate(self) -> Result<Self::Output, Vec<ValidationError>>;
}

/// Decodes an untyped payload and validates it.
pub fn validate_raw<T>(raw: serde_json::Value) -> Result<T::Output, Vec<ValidationError>>
where
    T: Validate + DeserializeOwned,
{
    let typed: T = serde_json::from_value(raw).map_err(|e| {
        vec![ValidationError::InvalidFormat {
            field: "payload".to_string(),
            reason: e.to_string(),
        }]
    })?;
    typed.validate()
}

/// Accumulates field errors across several checks.
#[derive(Debug, Default)]
struct Collector {
    errors: Vec<ValidationError>,
}

impl Collector {
    fn check<T>(&mut self, result: ValidationResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Vec<ValidationError>> {
        if self.errors.is_empty() {
            Ok(value())
        } else {
            Err(self.errors)
        }
    }
}

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a display name and returns it tidied.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<String> {
    let tidy = tidy_display_name(name);

    if tidy.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if tidy.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(tidy)
}

/// Validates a batch code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only letters, numbers, hyphens and underscores
pub fn validate_batch(batch: &str) -> ValidationResult<String> {
    let batch = batch.trim();

    if batch.is_empty() {
        return Err(ValidationError::Required {
            field: "batch".to_string(),
        });
    }

    if batch.len() > MAX_BATCH_LEN {
        return Err(ValidationError::TooLong {
            field: "batch".to_string(),
            max: MAX_BATCH_LEN,
        });
    }

    if !batch
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "batch".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(batch.to_string())
}

/// Validates a count (stock on hand, minimum stock) in `0..=MAX_QUANTITY`.
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<i64> {
    if !(0..=MAX_QUANTITY).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_QUANTITY,
        });
    }
    Ok(value)
}

/// Validates a unit price.
pub fn validate_price(price: Money) -> ValidationResult<Money> {
    if price.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "unitPrice".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(price)
}

/// Validates a movement reason.
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.chars().count() > MAX_REASON_LEN {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LEN,
        });
    }

    Ok(reason.to_string())
}

/// Validates a movement quantity for its kind.
///
/// Inbound and outbound take a positive magnitude; adjustments take a
/// signed, non-zero delta. Magnitudes above `MAX_QUANTITY` are rejected.
pub fn validate_movement_quantity(kind: MovementKind, quantity: i64) -> ValidationResult<i64> {
    if !(-MAX_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: -MAX_QUANTITY,
            max: MAX_QUANTITY,
        });
    }
    match kind {
        MovementKind::Inbound | MovementKind::Outbound if quantity <= 0 => {
            Err(ValidationError::MustBePositive {
                field: "quantity".to_string(),
            })
        }
        MovementKind::Adjustment if quantity == 0 => Err(ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: "adjustment must change stock".to_string(),
        }),
        _ => Ok(quantity),
    }
}

/// Validates an optional free-text field, mapping blank to `None`.
pub fn validate_optional_text(field: &str, value: Option<String>) -> ValidationResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > MAX_NAME_LEN => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        }),
        Some(v) => Ok(Some(v)),
    }
}

/// Validates an optional e-mail address (loose shape check).
pub fn validate_email(value: Option<String>) -> ValidationResult<Option<String>> {
    let value = validate_optional_text("email", value)?;
    match value {
        Some(ref email) => {
            let valid = email
                .split_once('@')
                .map(|(user, domain)| !user.is_empty() && domain.contains('.'))
                .unwrap_or(false);
            if valid {
                Ok(value)
            } else {
                Err(ValidationError::InvalidFormat {
                    field: "email".to_string(),
                    reason: "expected user@domain".to_string(),
                })
            }
        }
        None => Ok(None),
    }
}

fn validate_reference(field: &str, value: Option<String>) -> ValidationResult<Option<String>> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    match value {
        Some(ref id) if id.len() > 64 => Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        }),
        other => Ok(other),
    }
}

fn no_changes() -> ValidationError {
    ValidationError::InvalidFormat {
        field: "updates".to_string(),
        reason: "no fields to update".to_string(),
    }
}

// =============================================================================
// Medication
// =============================================================================

/// Input for creating a medication.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDraft {
    pub name: String,
    pub batch: String,
    pub quantity: i64,
    #[serde(default)]
    pub min_stock: Option<i64>,
    #[ts(as = "String")]
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub unit_price: Money,
}

impl Validate for MedicationDraft {
    type Output = MedicationDraft;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        let mut c = Collector::default();
        let name = c.check(validate_name("name", &self.name));
        let batch = c.check(validate_batch(&self.batch));
        c.check(validate_non_negative("quantity", self.quantity));
        if let Some(min) = self.min_stock {
            c.check(validate_non_negative("minStock", min));
        }
        c.check(validate_price(self.unit_price));
        let supplier_id = c.check(validate_reference("supplierId", self.supplier_id));
        let category_id = c.check(validate_reference("categoryId", self.category_id));

        c.finish(|| MedicationDraft {
            name: name.unwrap_or_default(),
            batch: batch.unwrap_or_default(),
            supplier_id: supplier_id.flatten(),
            category_id: category_id.flatten(),
            ..self
        })
    }
}

impl MedicationDraft {
    /// Materializes the draft into a medication with a fresh id.
    pub fn into_medication(self, id: String, now: DateTime<Utc>) -> Medication {
        Medication {
            id,
            name: self.name,
            batch: self.batch,
            quantity: self.quantity,
            min_stock: self.min_stock,
            expiry_date: self.expiry_date,
            supplier_id: self.supplier_id,
            category_id: self.category_id,
            unit_price: self.unit_price,
            updated_at: now,
        }
    }
}

/// Partial update of a medication.
///
/// Also the `updates` body of a `medication.update` envelope, so it carries
/// the writer's `updatedAt` for last-write-wins merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MedicationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_stock: Option<i64>,
    #[ts(as = "Option<String>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
    #[ts(as = "Option<String>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MedicationPatch {
    /// True when no business field is set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.batch.is_none()
            && self.quantity.is_none()
            && self.min_stock.is_none()
            && self.expiry_date.is_none()
            && self.supplier_id.is_none()
            && self.category_id.is_none()
            && self.unit_price.is_none()
    }

    /// Overwrites every field present in the patch.
    pub fn apply_to(&self, med: &mut Medication) {
        if let Some(ref name) = self.name {
            med.name = name.clone();
        }
        if let Some(ref batch) = self.batch {
            med.batch = batch.clone();
        }
        if let Some(quantity) = self.quantity {
            med.quantity = quantity;
        }
        if let Some(min) = self.min_stock {
            med.min_stock = Some(min);
        }
        if let Some(expiry) = self.expiry_date {
            med.expiry_date = expiry;
        }
        if let Some(ref supplier) = self.supplier_id {
            med.supplier_id = Some(supplier.clone());
        }
        if let Some(ref category) = self.category_id {
            med.category_id = Some(category.clone());
        }
        if let Some(price) = self.unit_price {
            med.unit_price = price;
        }
        if let Some(at) = self.updated_at {
            med.updated_at = at;
        }
    }
}

impl Validate for MedicationPatch {
    type Output = MedicationPatch;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        if self.is_empty() {
            return Err(vec![no_changes()]);
        }

        let mut c = Collector::default();
        let name = match self.name {
            Some(ref n) => c.check(validate_name("name", n)),
            None => None,
        };
        let batch = match self.batch {
            Some(ref b) => c.check(validate_batch(b)),
            None => None,
        };
        if let Some(q) = self.quantity {
            c.check(validate_non_negative("quantity", q));
        }
        if let Some(min) = self.min_stock {
            c.check(validate_non_negative("minStock", min));
        }
        if let Some(price) = self.unit_price {
            c.check(validate_price(price));
        }
        let supplier_id = c.check(validate_reference("supplierId", self.supplier_id.clone()));
        let category_id = c.check(validate_reference("categoryId", self.category_id.clone()));

        c.finish(|| MedicationPatch {
            name,
            batch,
            supplier_id: supplier_id.flatten(),
            category_id: category_id.flatten(),
            ..self
        })
    }
}

// =============================================================================
// Movement
// =============================================================================

/// Input for recording a stock movement.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MovementDraft {
    pub kind: MovementKind,
    pub medication_id: String,
    /// Magnitude for inbound/outbound; signed delta for adjustments.
    pub quantity: i64,
    pub reason: String,
}

impl Validate for MovementDraft {
    type Output = MovementDraft;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        let mut c = Collector::default();
        if self.medication_id.trim().is_empty() {
            c.errors.push(ValidationError::Required {
                field: "medicationId".to_string(),
            });
        }
        c.check(validate_movement_quantity(self.kind, self.quantity));
        let reason = c.check(validate_reason(&self.reason));

        c.finish(|| MovementDraft {
            medication_id: self.medication_id.trim().to_string(),
            reason: reason.unwrap_or_default(),
            ..self
        })
    }
}

impl MovementDraft {
    /// Signed ledger delta for this draft.
    pub fn delta(&self) -> i64 {
        self.kind.signed_delta(self.quantity)
    }
}

// =============================================================================
// Category
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Validate for CategoryDraft {
    type Output = CategoryDraft;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        let mut c = Collector::default();
        let name = c.check(validate_name("name", &self.name));
        let description = c.check(validate_optional_text("description", self.description));
        c.finish(|| CategoryDraft {
            name: name.unwrap_or_default(),
            description: description.flatten(),
        })
    }
}

impl CategoryDraft {
    pub fn into_category(self, id: String, now: DateTime<Utc>) -> Category {
        Category {
            id,
            name: self.name,
            description: self.description,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[ts(as = "Option<String>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CategoryPatch {
    pub fn apply_to(&self, category: &mut Category) {
        if let Some(ref name) = self.name {
            category.name = name.clone();
        }
        if let Some(ref description) = self.description {
            category.description = Some(description.clone());
        }
        if let Some(at) = self.updated_at {
            category.updated_at = at;
        }
    }
}

impl Validate for CategoryPatch {
    type Output = CategoryPatch;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        if self.name.is_none() && self.description.is_none() {
            return Err(vec![no_changes()]);
        }
        let mut c = Collector::default();
        let name = match self.name {
            Some(ref n) => c.check(validate_name("name", n)),
            None => None,
        };
        let description = c.check(validate_optional_text("description", self.description.clone()));
        c.finish(|| CategoryPatch {
            name,
            description: description.flatten(),
            ..self
        })
    }
}

// =============================================================================
// Supplier
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SupplierDraft {
    pub name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Validate for SupplierDraft {
    type Output = SupplierDraft;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        let mut c = Collector::default();
        let name = c.check(validate_name("name", &self.name));
        let contact_name = c.check(validate_optional_text("contactName", self.contact_name));
        let phone = c.check(validate_optional_text("phone", self.phone));
        let email = c.check(validate_email(self.email));
        c.finish(|| SupplierDraft {
            name: name.unwrap_or_default(),
            contact_name: contact_name.flatten(),
            phone: phone.flatten(),
            email: email.flatten(),
        })
    }
}

impl SupplierDraft {
    pub fn into_supplier(self, id: String, now: DateTime<Utc>) -> Supplier {
        Supplier {
            id,
            name: self.name,
            contact_name: self.contact_name,
            phone: self.phone,
            email: self.email,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SupplierPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[ts(as = "Option<String>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SupplierPatch {
    pub fn apply_to(&self, supplier: &mut Supplier) {
        if let Some(ref name) = self.name {
            supplier.name = name.clone();
        }
        if let Some(ref contact) = self.contact_name {
            supplier.contact_name = Some(contact.clone());
        }
        if let Some(ref phone) = self.phone {
            supplier.phone = Some(phone.clone());
        }
        if let Some(ref email) = self.email {
            supplier.email = Some(email.clone());
        }
        if let Some(at) = self.updated_at {
            supplier.updated_at = at;
        }
    }
}

impl Validate for SupplierPatch {
    type Output = SupplierPatch;

    fn validate(self) -> Result<Self::Output, Vec<ValidationError>> {
        if self.name.is_none()
            && self.contact_name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
        {
            return Err(vec![no_changes()]);
        }
        let mut c = Collector::default();
        let name = match self.name {
            Some(ref n) => c.check(validate_name("name", n)),
            None => None,
        };
        let contact_name = c.check(validate_optional_text("contactName", self.contact_name.clone()));
        let phone = c.check(validate_optional_text("phone", self.phone.clone()));
        let email = c.check(validate_email(self.email.clone()));
        c.finish(|| SupplierPatch {
            name,
            contact_name: contact_name.flatten(),
            phone: phone.flatten(),
            email: email.flatten(),
            ..self
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn draft() -> MedicationDraft {
        MedicationDraft {
            name: "  Dipirona   500mg ".into(),
            batch: "DIP-2026".into(),
            quantity: 10,
            min_stock: Some(5),
            expiry_date: NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
            supplier_id: Some("  ".into()),
            category_id: None,
            unit_price: Money::from_cents(450),
        }
    }

    #[test]
    fn test_medication_draft_is_tidied() {
        let valid = draft().validate().unwrap();
        assert_eq!(valid.name, "Dipirona 500mg");
        assert_eq!(valid.supplier_id, None);
    }

    #[test]
    fn test_medication_draft_collects_all_errors() {
        let bad = MedicationDraft {
            name: "".into(),
            batch: "has space".into(),
            quantity: -1,
            unit_price: Money::from_cents(-5),
            ..draft()
        };
        let errors = bad.validate().unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field().to_string()).collect();
        assert_eq!(fields, vec!["name", "batch", "quantity", "unitPrice"]);
    }

    #[test]
    fn test_empty_patch_rejected() {
        let errors = MedicationPatch::default().validate().unwrap_err();
        assert_matches!(&errors[0], ValidationError::InvalidFormat { field, .. } if field == "updates");
    }

    #[test]
    fn test_patch_apply_overwrites_present_fields_only() {
        let mut med = draft().into_medication("m1".into(), Utc::now());
        let patch = MedicationPatch {
            quantity: Some(3),
            ..Default::default()
        };
        patch.apply_to(&mut med);
        assert_eq!(med.quantity, 3);
        assert_eq!(med.batch, "DIP-2026");
    }

    #[test]
    fn test_movement_quantity_rules() {
        assert!(validate_movement_quantity(MovementKind::Inbound, 1).is_ok());
        assert!(validate_movement_quantity(MovementKind::Outbound, 0).is_err());
        assert!(validate_movement_quantity(MovementKind::Adjustment, -4).is_ok());
        assert!(validate_movement_quantity(MovementKind::Adjustment, 0).is_err());
    }

    #[test]
    fn test_quantities_are_bounded() {
        assert!(validate_non_negative("quantity", MAX_QUANTITY).is_ok());
        assert_matches!(
            validate_non_negative("quantity", MAX_QUANTITY + 1),
            Err(ValidationError::OutOfRange { max, .. }) if max == MAX_QUANTITY
        );
        assert!(validate_movement_quantity(MovementKind::Inbound, MAX_QUANTITY).is_ok());
        assert!(validate_movement_quantity(MovementKind::Inbound, i64::MAX).is_err());
        assert!(validate_movement_quantity(MovementKind::Adjustment, -MAX_QUANTITY).is_ok());
        assert!(validate_movement_quantity(MovementKind::Adjustment, i64::MIN).is_err());

        let huge = MedicationDraft {
            quantity: i64::MAX,
            ..draft()
        };
        let errors = huge.validate().unwrap_err();
        assert_eq!(errors[0].field(), "quantity");
    }

    #[test]
    fn test_validate_raw_reports_decode_failure() {
        let errors = validate_raw::<CategoryDraft>(json!({ "description": 4 })).unwrap_err();
        assert_matches!(&errors[0], ValidationError::InvalidFormat { field, .. } if field == "payload");
    }

    #[test]
    fn test_validate_raw_movement() {
        let draft = validate_raw::<MovementDraft>(json!({
            "kind": "outbound",
            "medicationId": "med-1",
            "quantity": 4,
            "reason": " dispensed "
        }))
        .unwrap();
        assert_eq!(draft.delta(), -4);
        assert_eq!(draft.reason, "dispensed");
    }

    #[test]
    fn test_supplier_email() {
        let ok = SupplierDraft {
            name: "Distribuidora Sul".into(),
            contact_name: None,
            phone: None,
            email: Some("vendas@sul.com.br".into()),
        };
        assert!(ok.validate().is_ok());

        let bad = SupplierDraft {
            name: "Distribuidora Sul".into(),
            contact_name: None,
            phone: None,
            email: Some("vendas".into()),
        };
        assert_matches!(
            bad.validate().unwrap_err().as_slice(),
            [ValidationError::InvalidFormat { field, .. }] if field == "email"
        );
    }

    #[test]
    fn test_name_length() {
        assert!(validate_name("name", &"a".repeat(200)).is_ok());
        assert!(validate_name("name", &"a".repeat(201)).is_err());
    }
}
