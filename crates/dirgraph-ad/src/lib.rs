//! # Directory Ingestion
//!
//! Turns raw directory records into the normalized security model of
//! `dirgraph-db` and persists one enumeration run in resumable stages.
//!
//! ## Crate Organization
//!
//! - [`decode`] - Attribute decoding: FILETIME, generalized time, GUIDs, SIDs
//! - [`user_account_control`] - `userAccountControl` bit flags
//! - [`derived`] - Logon and password properties derived from flags and policy
//! - [`mapping`] - Record to principal mapping
//! - [`membership`] - Effective memberships and privileged groups
//! - [`security_descriptor`] - ACE normalization
//! - [`spn`] - Service principal names and delegation targets
//! - [`ingest`] - Stage orchestration and batched persistence
//! - [`stats`] - Per-stage counters and run reports
//! - [`config`] - Environment configuration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dirgraph_ad::prelude::*;
//!
//! let config = IngestConfig::from_env()?;
//! let ingestor = Ingestor::new(directory, sink, config);
//! let report = ingestor.ingest().await?;
//! assert!(report.is_complete());
//! ```

pub mod config;
pub mod decode;
pub mod derived;
pub mod error;
pub mod ingest;
pub mod mapping;
pub mod membership;
pub mod security_descriptor;
pub mod spn;
pub mod stats;
pub mod user_account_control;

pub use config::{ConfigError, IngestConfig};
pub use error::{AdError, AdResult};
pub use ingest::Ingestor;
pub use stats::{IngestReport, SkipRecord, StageStatistics};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigError, IngestConfig};
    pub use crate::error::{AdError, AdResult};
    pub use crate::ingest::{BatchLimits, Ingestor};
    pub use crate::stats::{IngestReport, StageStatistics};
    pub use crate::user_account_control::UserAccountControl;
}
