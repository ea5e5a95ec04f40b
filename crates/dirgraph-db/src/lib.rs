//! # dirgraph-db
//!
//! Normalized security model for one directory enumeration run and the
//! sinks that persist it.
//!
//! - [`models`] - Domain info, principals, ACEs, memberships, SPNs, delegations, checkpoints
//! - [`sink`] - `PersistenceSink` / `SinkBatch` contract
//! - [`postgres`] - PostgreSQL sink, one transaction per batch
//! - [`memory`] - In-memory sink for tests
//! - [`pool`] / [`migrations`] - Connection pool and embedded schema

pub mod error;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod sink;

pub use error::{DbError, DbResult};
pub use memory::InMemorySink;
pub use migrations::run_migrations;
pub use models::*;
pub use pool::{DbConfig, DbPool};
pub use postgres::PgSink;
pub use sink::{PersistenceSink, PrincipalEdges, SinkBatch};
