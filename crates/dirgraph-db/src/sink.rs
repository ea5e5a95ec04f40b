//! Persistence sink contract.
//!
//! The pipeline writes through [`PersistenceSink`] and never touches storage
//! directly. Writes are grouped into batches; a batch is atomic: after
//! [`SinkBatch::commit`] either all of its writes are visible or none are.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::DbResult;
use crate::models::{
    CreateAce, CreateConstrainedDelegation, CreateDomainInfo, CreateSpnService, CreateTokenGroup,
    DomainInfo, IngestStage, Principal, PrincipalRef, RunCheckpoint,
};

/// Everything hanging off one principal, replaced as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalEdges {
    pub token_groups: Vec<CreateTokenGroup>,
    pub aces: Vec<CreateAce>,
    pub delegations: Vec<CreateConstrainedDelegation>,
}

impl PrincipalEdges {
    /// Number of rows these edges occupy.
    pub fn row_count(&self) -> usize {
        self.token_groups.len() + self.aces.len() + self.delegations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// A store that can hold enumeration runs.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Create the domain row of a new run and return it with its run key.
    async fn create_run(&self, domain: &CreateDomainInfo) -> DbResult<DomainInfo>;

    async fn find_run(&self, ad_id: Uuid) -> DbResult<Option<DomainInfo>>;

    async fn load_checkpoint(&self, ad_id: Uuid) -> DbResult<Option<RunCheckpoint>>;

    /// Record that `stage` is committed for the run.
    async fn save_checkpoint(
        &self,
        ad_id: Uuid,
        stage: IngestStage,
        statistics: &JsonValue,
    ) -> DbResult<RunCheckpoint>;

    /// Open a new write batch.
    async fn begin(&self) -> DbResult<Box<dyn SinkBatch>>;
}

/// An open, uncommitted group of writes.
#[async_trait]
pub trait SinkBatch: Send {
    /// Insert the principal or refresh the existing row with the same
    /// (run, object GUID). Returns the store-assigned identity.
    async fn upsert_principal(&mut self, ad_id: Uuid, principal: &Principal)
        -> DbResult<PrincipalRef>;

    /// Delete every edge owned by `owner` and insert `edges` in its place.
    /// Returns the number of rows inserted.
    async fn replace_edges(&mut self, owner: &PrincipalRef, edges: &PrincipalEdges)
        -> DbResult<u64>;

    /// Delete all SPN bindings of the run.
    async fn clear_services(&mut self, ad_id: Uuid) -> DbResult<u64>;

    /// Replace the SPN bindings of one service account within the run.
    async fn replace_services(
        &mut self,
        ad_id: Uuid,
        owner_sam_account_name: &str,
        services: &[CreateSpnService],
    ) -> DbResult<u64>;

    /// Link delegation edges of the run to the machines they target.
    /// Returns the number of edges resolved.
    async fn resolve_delegation_targets(&mut self, ad_id: Uuid) -> DbResult<u64>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;
}
