//! Supplier-return planning for expired batches.
//!
//! Once per calendar day every expired batch that still has stock is
//! returned to its supplier and replaced by a fresh batch of the same size.
//! This module only decides *what* to do; the store records the movements.

use chrono::{Months, NaiveDate};

use crate::normalize::normalize_name;
use crate::types::Medication;
use crate::RESTOCK_SHELF_LIFE_MONTHS;

/// Return-and-restock work for one medication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierReturn {
    pub medication_id: String,
    /// Units returned, then restocked.
    pub quantity: i64,
    pub old_batch: String,
    pub new_batch: String,
    pub new_expiry: NaiveDate,
}

/// True when housekeeping has not yet run on `today`.
pub fn is_due(last_run: Option<NaiveDate>, today: NaiveDate) -> bool {
    last_run.map_or(true, |last| last < today)
}

/// Lists the returns due on `today`, in medication order.
pub fn plan_supplier_returns(medications: &[Medication], today: NaiveDate) -> Vec<SupplierReturn> {
    let new_expiry = restock_expiry(today);

    medications
        .iter()
        .filter(|m| m.is_expired(today) && m.quantity > 0)
        .map(|m| SupplierReturn {
            medication_id: m.id.clone(),
            quantity: m.quantity,
            old_batch: m.batch.clone(),
            new_batch: derive_batch_code(&m.name, today),
            new_expiry,
        })
        .collect()
}

/// Expiry date given to a restocked batch.
pub fn restock_expiry(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(RESTOCK_SHELF_LIFE_MONTHS))
        .unwrap_or(today)
}

/// `{NAME3}-{YYYYMMDD}`: the first three alphanumerics of the folded name.
pub fn derive_batch_code(name: &str, today: NaiveDate) -> String {
    let prefix: String = normalize_name(name)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let prefix = if prefix.is_empty() { "MED".to_string() } else { prefix };
    format!("{}-{}", prefix, today.format("%Y%m%d"))
}
