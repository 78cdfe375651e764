//! # apotheca-core
//!
//! Pure domain logic for the pharmacy replication core.
//!
//! ## Module Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          apotheca-core                                  │
//! │                                                                         │
//! │  types.rs        Medication, Movement, Category, Supplier, Role        │
//! │  validation.rs   Drafts/patches + the `Validate` trait                 │
//! │  normalize.rs    Case/diacritic-insensitive name keys                  │
//! │  money.rs        Integer-cent prices and stock valuation               │
//! │  settings.rs     Alert thresholds, rule toggles, quiet hours           │
//! │  alerts.rs       Rule engine: generate → role → quiet hours → acks     │
//! │  housekeeping.rs Supplier-return planning for expired batches          │
//! │  error.rs        CoreError / ValidationError                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate performs I/O or reads the clock: callers pass
//! `now` explicitly, which keeps every rule deterministic under test.
//!
//! ```rust
//! use apotheca_core::normalize::normalize_name;
//!
//! assert_eq!(normalize_name("  Dipirona  Sódica "), "dipirona sodica");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod error;
pub mod housekeeping;
pub mod money;
pub mod normalize;
pub mod settings;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use alerts::{Alert, AlertRule, AlertSummary, AlertView, Severity};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use settings::{AlertSettings, QuietHours, RuleToggles, Thresholds};
pub use types::*;
pub use validation::Validate;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Trailing window for consumption trend and "no recent movement" checks.
pub const TRAILING_WINDOW_DAYS: i64 = 30;

/// Maximum physical-count tasks handed to a technician per evaluation.
pub const MAX_COUNT_TASKS: usize = 3;

/// Maximum labeling tasks handed to a technician per evaluation.
pub const MAX_LABEL_TASKS: usize = 2;

/// Months added to today's date when a returned batch is restocked.
pub const RESTOCK_SHELF_LIFE_MONTHS: u32 = 12;

/// Largest stock count or movement quantity accepted from local input.
pub const MAX_QUANTITY: i64 = 1_000_000_000;

/// Maximum length of a display name.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum length of a batch code.
pub const MAX_BATCH_LEN: usize = 50;

/// Maximum length of a movement reason.
pub const MAX_REASON_LEN: usize = 200;
