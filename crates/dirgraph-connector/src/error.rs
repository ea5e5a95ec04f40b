//! Directory query errors.
//!
//! Every variant is either transient (worth retrying) or permanent. The
//! split drives [`RetryExecutor`](crate::resilience::RetryExecutor).

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of one directory query or enumeration stream.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory server could not be reached or the bind failed.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Busy, throttled or mid-failover.
    #[error("directory unavailable: {message}")]
    Unavailable { message: String },

    /// The connection dropped during a paged exchange.
    #[error("network error: {message}")]
    NetworkError {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The bind account may not read what was asked for.
    #[error("insufficient access for {operation}")]
    InsufficientAccess { operation: String },

    #[error("object not found: {dn}")]
    NoSuchObject { dn: String },

    #[error("invalid filter: {filter}")]
    InvalidFilter { filter: String },

    /// The server answered with something the client could not parse.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    #[error("maximum retries ({max_retries}) exceeded for {operation}: {last_error}")]
    MaxRetriesExceeded {
        operation: String,
        max_retries: u32,
        last_error: String,
    },
}

impl DirectoryError {
    /// Whether a later attempt of the same query may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
                | Self::Unavailable { .. }
                | Self::NetworkError { .. }
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Stable code for logs and skip records.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Unavailable { .. } => "UNAVAILABLE",
            Self::NetworkError { .. } => "NETWORK_ERROR",
            Self::InsufficientAccess { .. } => "INSUFFICIENT_ACCESS",
            Self::NoSuchObject { .. } => "NO_SUCH_OBJECT",
            Self::InvalidFilter { .. } => "INVALID_FILTER",
            Self::InvalidData { .. } => "INVALID_DATA",
            Self::MaxRetriesExceeded { .. } => "MAX_RETRIES_EXCEEDED",
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Network error keeping the transport error that caused it.
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_classification() {
        let transient = [
            DirectoryError::connection_failed("bind refused"),
            DirectoryError::Timeout {
                operation: "token_groups".to_string(),
                timeout_ms: 500,
            },
            DirectoryError::unavailable("busy"),
            DirectoryError::network("reset"),
        ];
        for err in &transient {
            assert!(err.is_transient(), "{} should be transient", err.error_code());
        }

        let permanent = [
            DirectoryError::InsufficientAccess {
                operation: "security_descriptor".to_string(),
            },
            DirectoryError::NoSuchObject {
                dn: "CN=gone,DC=corp,DC=local".to_string(),
            },
            DirectoryError::InvalidFilter {
                filter: "(&(".to_string(),
            },
            DirectoryError::invalid_data("bad sid"),
            // Already retried; retrying again would double the budget.
            DirectoryError::MaxRetriesExceeded {
                operation: "token_groups".to_string(),
                max_retries: 3,
                last_error: "timeout".to_string(),
            },
        ];
        for err in &permanent {
            assert!(err.is_permanent(), "{} should be permanent", err.error_code());
        }
    }

    #[test]
    fn test_display() {
        let err = DirectoryError::Timeout {
            operation: "token_groups".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "token_groups timed out after 250 ms");

        let err = DirectoryError::NoSuchObject {
            dn: "CN=x,DC=corp".to_string(),
        };
        assert_eq!(err.to_string(), "object not found: CN=x,DC=corp");
    }

    #[test]
    fn test_source_kept() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "socket closed");
        let err = DirectoryError::network_with_source("page 3 lost", io);

        assert!(err.is_transient());
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("socket closed"));
    }
}
