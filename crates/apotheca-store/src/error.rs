//! Store runtime errors.
//!
//! Business-rule rejections come from `apotheca-core` unchanged; the store
//! only adds the two ways its own plumbing can fail.

use thiserror::Error;

use apotheca_core::CoreError;
use apotheca_db::DbError;

/// Anything a store, config or dispatcher call can fail with.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected by validation or a business rule. Nothing was applied.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The new state could not be queued for persistence. Nothing was applied.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] DbError),

    /// The dispatcher has stopped and no longer accepts commands.
    #[error("Dispatcher is shut down")]
    ShuttingDown,
}

impl StoreError {
    /// The business-rule error, if that is what this is.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            StoreError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<apotheca_core::ValidationError> for StoreError {
    fn from(err: apotheca_core::ValidationError) -> Self {
        StoreError::Core(CoreError::from(err))
    }
}

impl From<Vec<apotheca_core::ValidationError>> for StoreError {
    fn from(errs: Vec<apotheca_core::ValidationError>) -> Self {
        StoreError::Core(CoreError::from(errs))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use apotheca_core::ValidationError;
    use assert_matches::assert_matches;

    #[test]
    fn test_validation_errors_become_core_errors() {
        let err: StoreError = vec![ValidationError::Required { field: "name".into() }].into();
        assert_matches!(err.as_core(), Some(CoreError::Validation(errs)) if errs.len() == 1);
        assert!(err.to_string().contains("name is required"));
    }

    #[test]
    fn test_queue_closed_is_persistence() {
        let err: StoreError = DbError::QueueClosed.into();
        assert!(err.as_core().is_none());
        assert!(err.to_string().starts_with("Persistence failed"));
    }
}
