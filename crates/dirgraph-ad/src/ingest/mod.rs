//! Resumable, staged ingestion.
//!
//! - [`orchestrator`] - Stage state machine and checkpoints
//! - [`stage`] - Per-principal resolution with bounded query fan-out
//! - [`pipeline`] - Batched writes into a persistence sink

pub mod orchestrator;
pub mod pipeline;
pub mod stage;

pub use orchestrator::Ingestor;
pub use pipeline::{BatchLimits, PersistencePipeline, ResolvedPrincipal};
pub use stage::{resume_point, PrincipalResolver, Resolution, StageWork};
