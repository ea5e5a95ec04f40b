//! # Directory Connector Contract
//!
//! Directory-side abstractions for the dirgraph ingestion pipeline.
//!
//! The pipeline consumes a directory through the [`DirectoryQuery`] trait and
//! never implements the wire protocol itself. This crate defines that trait,
//! the raw record and security descriptor shapes the directory client hands
//! over, the error taxonomy for failed queries, and a retry executor that
//! bounds every query with a timeout.
//!
//! ## Crate Organization
//!
//! - [`record`] - Raw attribute records (`AttributeSet`, `AttributeValue`) and `PrincipalKind`
//! - [`security`] - Parsed security descriptors and ACEs
//! - [`traits`] - The `DirectoryQuery` contract
//! - [`error`] - Error types with transient/permanent classification
//! - [`resilience`] - Timeout + exponential backoff retry
//! - [`memory`] - In-memory directory for tests and offline replay
//!
//! [`DirectoryQuery`]: traits::DirectoryQuery

pub mod error;
pub mod memory;
pub mod record;
pub mod resilience;
pub mod security;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use dirgraph_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{DirectoryError, DirectoryResult};
    pub use crate::memory::InMemoryDirectory;
    pub use crate::record::{AttributeSet, AttributeValue, PrincipalKind};
    pub use crate::resilience::{RetryConfig, RetryExecutor};
    pub use crate::security::{AceType, RawAce, SecurityDescriptor};
    pub use crate::traits::{DirectoryQuery, RecordStream, SERVICE_ACCOUNT_FILTER};
}

// Re-export async_trait for directory client implementors
pub use async_trait::async_trait;
