use common::ErrorClass;
use thiserror::Error;

use crate::EntityKind;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent unit of work touched the same rows; the whole unit may be retried.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// A storage constraint rejected the write (foreign key, check, unique).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The entity kind is an immutable log and cannot be deleted.
    #[error("{0} records are append-only and cannot be deleted")]
    AppendOnly(EntityKind),

    /// The backend has no delete path for this entity kind.
    #[error("Deleting {0} records is not supported")]
    UnsupportedDelete(EntityKind),

    /// A stored value could not be mapped back to a record.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::System
    }

    /// Returns true if retrying the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict(_))
    }
}

/// Serialization failure, deadlock detected, lock not available.
const RETRYABLE_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

/// numeric_value_out_of_range
const OUT_OF_RANGE_SQLSTATE: &str = "22003";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && let Some(code) = db_err.code()
        {
            if RETRYABLE_SQLSTATES.contains(&code.as_ref()) {
                return StoreError::ConcurrencyConflict(db_err.message().to_string());
            }
            if code.starts_with("23") || code == OUT_OF_RANGE_SQLSTATE {
                let detail = match db_err.constraint() {
                    Some(constraint) => format!("{constraint}: {}", db_err.message()),
                    None => db_err.message().to_string(),
                };
                return StoreError::ConstraintViolation(detail);
            }
        }
        StoreError::Database(err)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(StoreError::ConcurrencyConflict("x".into()).is_retryable());
        assert!(!StoreError::ConstraintViolation("x".into()).is_retryable());
        assert!(!StoreError::AppendOnly(EntityKind::Movement).is_retryable());
    }

    #[test]
    fn all_store_errors_are_system_errors() {
        assert_eq!(
            StoreError::ConcurrencyConflict("x".into()).class(),
            ErrorClass::System
        );
        assert_eq!(StoreError::InvalidData("x".into()).class(), ErrorClass::System);
    }

    #[test]
    fn non_database_sqlx_errors_stay_opaque() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn append_only_message_names_the_kind() {
        let err = StoreError::AppendOnly(EntityKind::Movement);
        assert_eq!(err.to_string(), "movement records are append-only and cannot be deleted");
    }
}
