// Error type for store operations

use thiserror::Error;

/// Errors from the durable store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration could not be applied
    #[error("migration error: {0}")]
    Migration(String),

    /// Pending migration versions must be contiguous
    #[error("migration sequence error: expected version {expected}, found {found}")]
    MigrationSequence { expected: i64, found: i64 },

    /// Destructive migration requires an explicit opt-in
    #[error("destructive migration {version} ({name}) refused without opt-in")]
    DestructiveRefused { version: i64, name: String },

    /// Nothing to roll back
    #[error("no applied migration to roll back")]
    NothingToRollBack,

    /// A patch must change at least one field
    #[error("update patch is empty")]
    EmptyPatch,

    /// Stored row failed to decode into its domain type
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// JSON (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the error is a UNIQUE constraint violation, e.g. a duplicate
    /// `(execution_id, step_name)` insertion or an execution-id collision.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.kind() == sqlx::error::ErrorKind::UniqueViolation
            }
            _ => false,
        }
    }

    /// True when the error is a CHECK constraint violation
    pub fn is_check_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.kind() == sqlx::error::ErrorKind::CheckViolation
            }
            _ => false,
        }
    }

    /// True when the error is a FOREIGN KEY constraint violation
    pub fn is_foreign_key_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.kind() == sqlx::error::ErrorKind::ForeignKeyViolation
            }
            _ => false,
        }
    }
}
