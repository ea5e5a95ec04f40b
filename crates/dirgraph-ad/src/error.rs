//! Error types for the ingestion pipeline.

use dirgraph_connector::error::DirectoryError;
use dirgraph_db::DbError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while ingesting a directory.
///
/// Record-level variants (`MalformedRecord`, `MalformedSpn`,
/// `DecodeFailure`) and per-principal query failures are recorded in the run
/// statistics and the run continues. `PersistenceFailure` and stream-level
/// query failures stop the current stage.
#[derive(Debug, Error)]
pub enum AdError {
    /// A record lacks a field every downstream join depends on.
    #[error("Malformed record {dn}: missing {field}")]
    MalformedRecord { dn: String, field: &'static str },

    /// A service principal name that does not split into service and host.
    #[error("Malformed service principal name '{spn}': {reason}")]
    MalformedSpn { spn: String, reason: &'static str },

    /// An attribute value that could not be decoded.
    #[error("Cannot decode {attribute}: {message}")]
    DecodeFailure { attribute: String, message: String },

    /// A directory query failed after retries.
    #[error("Directory query failed: {0}")]
    QueryFailure(#[from] DirectoryError),

    /// The store rejected a write or a commit.
    #[error("Persistence failed: {0}")]
    PersistenceFailure(#[from] DbError),

    /// Resume was requested for a run the store does not know.
    #[error("Run {0} not found")]
    RunNotFound(Uuid),
}

/// Result type for pipeline operations.
pub type AdResult<T> = Result<T, AdError>;

impl AdError {
    pub fn malformed_record(dn: impl Into<String>, field: &'static str) -> Self {
        AdError::MalformedRecord {
            dn: dn.into(),
            field,
        }
    }

    pub fn malformed_spn(spn: impl Into<String>, reason: &'static str) -> Self {
        AdError::MalformedSpn {
            spn: spn.into(),
            reason,
        }
    }

    pub fn decode(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        AdError::DecodeFailure {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    /// Whether the pipeline may skip the affected record and carry on.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            AdError::MalformedRecord { .. }
                | AdError::MalformedSpn { .. }
                | AdError::DecodeFailure { .. }
                | AdError::QueryFailure(_)
        )
    }

    pub fn is_persistence_failure(&self) -> bool {
        matches!(self, AdError::PersistenceFailure(_))
    }

    /// Stable code for logs and skip records.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdError::MalformedRecord { .. } => "MALFORMED_RECORD",
            AdError::MalformedSpn { .. } => "MALFORMED_SPN",
            AdError::DecodeFailure { .. } => "DECODE_FAILURE",
            AdError::QueryFailure(e) => e.error_code(),
            AdError::PersistenceFailure(e) => e.error_code(),
            AdError::RunNotFound(_) => "RUN_NOT_FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_display() {
        let err = AdError::malformed_record("CN=ghost,DC=corp,DC=local", "objectSid");
        assert_eq!(
            err.to_string(),
            "Malformed record CN=ghost,DC=corp,DC=local: missing objectSid"
        );
        assert!(err.is_record_level());
        assert_eq!(err.error_code(), "MALFORMED_RECORD");
    }

    #[test]
    fn test_persistence_failure_is_not_record_level() {
        let err: AdError = DbError::CommitFailed {
            batch: 3,
            message: "connection reset".to_string(),
        }
        .into();
        assert!(err.is_persistence_failure());
        assert!(!err.is_record_level());
        assert_eq!(err.error_code(), "DB_COMMIT_FAILED");
    }

    #[test]
    fn test_query_failure_keeps_directory_code() {
        let err: AdError = DirectoryError::InsufficientAccess {
            operation: "security_descriptor".to_string(),
        }
        .into();
        assert!(err.is_record_level());
        assert_eq!(
            err.error_code(),
            DirectoryError::InsufficientAccess {
                operation: String::new()
            }
            .error_code()
        );
    }
}
