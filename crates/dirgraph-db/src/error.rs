//! Error types for the dirgraph-db crate.
//!
//! Wraps `SQLx` errors with the context the ingestion pipeline needs to decide
//! whether a run can continue.

use thiserror::Error;

/// Persistence errors.
///
/// Every variant is fatal to the stage that observes it: the pipeline stops
/// and the run keeps its last committed checkpoint. [`DbError::CommitFailed`]
/// guarantees that nothing of the failed batch is visible.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),

    /// A batch could not be committed; none of its writes are visible.
    #[error("Commit of batch {batch} failed: {message}")]
    CommitFailed { batch: u64, message: String },

    /// Unknown run, or a row the caller expected to exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A write was rejected before reaching the store.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Stable code for logs and run reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            DbError::ConnectionFailed(_) => "DB_CONNECTION_FAILED",
            DbError::MigrationFailed(_) => "DB_MIGRATION_FAILED",
            DbError::QueryFailed(_) => "DB_QUERY_FAILED",
            DbError::CommitFailed { .. } => "DB_COMMIT_FAILED",
            DbError::NotFound(_) => "DB_NOT_FOUND",
            DbError::ValidationFailed(_) => "DB_VALIDATION_FAILED",
        }
    }

    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(self, DbError::QueryFailed(_))
    }

    #[must_use]
    pub fn is_commit_failure(&self) -> bool {
        matches!(self, DbError::CommitFailed { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound("row".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DbError::ConnectionFailed(err)
            }
            other => DbError::QueryFailed(other),
        }
    }
}
