//! # Error Types
//!
//! Domain-specific error types for apotheca-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  apotheca-core errors (this file)                                      │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - One field-level failure                        │
//! │                                                                         │
//! │  apotheca-db          └── DbError    - Persistence failures            │
//! │  apotheca-sync        └── SyncError  - Logged, never surfaced          │
//! │  apotheca-store       └── StoreError - What mutation callers see       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → StoreError → UI notification      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for domain operations.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule rejections raised by store mutations.
///
/// A mutation that fails with any of these is never partially applied.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The payload failed validation; carries every field error found.
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    /// Another entity already uses the same normalized name.
    #[error("{entity} named '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An outbound movement would drive stock below zero.
    ///
    /// ## User Workflow
    /// ```text
    /// record_movement(outbound, qty: 5)
    ///      │
    ///      ▼
    /// Check stock: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { medication: "Amoxicilina", available: 3, requested: 5 }
    /// ```
    #[error("Insufficient stock for {medication}: available {available}, requested {requested}")]
    InsufficientStock {
        medication: String,
        available: i64,
        requested: i64,
    },

    /// Deletion blocked because medications still reference the entity.
    #[error("{entity} {id} is referenced by {references} medication(s)")]
    ReferentialIntegrity {
        entity: &'static str,
        id: String,
        references: usize,
    },

    /// The current role may not perform the operation.
    #[error("Role {role} may not {action}")]
    PermissionDenied { role: String, action: &'static str },
}

impl From<ValidationError> for CoreError {
    fn from(err: ValidationError) -> Self {
        CoreError::Validation(vec![err])
    }
}

impl From<Vec<ValidationError>> for CoreError {
    fn from(errors: Vec<ValidationError>) -> Self {
        CoreError::Validation(errors)
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be strictly positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value is malformed (bad characters, undecodable JSON, zero delta).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value points at an entity that does not exist.
    #[error("{field} references unknown id {id}")]
    UnknownReference { field: String, id: String },
}

impl ValidationError {
    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::UnknownReference { field, .. } => field,
        }
    }
}
