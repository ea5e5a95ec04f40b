//! Single-writer persistence pipeline.
//!
//! Resolved principals are written in order through one open batch at a
//! time. A batch commits once it holds `batch_size` principals or
//! `max_batch_rows` rows, whichever comes first. A principal and its edges
//! always land in the same batch.

use tracing::{debug, info, warn};
use uuid::Uuid;

use dirgraph_db::{
    CreateSpnService, PersistenceSink, Principal, PrincipalEdges, PrincipalRef, SinkBatch,
};

use crate::config::IngestConfig;
use crate::error::AdResult;

/// Commit thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub batch_size: usize,
    pub max_batch_rows: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::from(&IngestConfig::default())
    }
}

impl From<&IngestConfig> for BatchLimits {
    fn from(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_batch_rows: config.max_batch_rows.max(1),
        }
    }
}

/// A principal with every edge it owns, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrincipal {
    pub principal: Principal,
    pub edges: PrincipalEdges,
}

impl ResolvedPrincipal {
    /// Rows this principal occupies in a batch.
    pub fn row_count(&self) -> usize {
        1 + self.edges.row_count()
    }
}

pub struct PersistencePipeline<'s> {
    sink: &'s dyn PersistenceSink,
    ad_id: Uuid,
    limits: BatchLimits,
    batch: Option<Box<dyn SinkBatch>>,
    pending_principals: usize,
    pending_rows: usize,
    committed_batches: u64,
}

impl<'s> PersistencePipeline<'s> {
    pub fn new(sink: &'s dyn PersistenceSink, ad_id: Uuid, limits: BatchLimits) -> Self {
        Self {
            sink,
            ad_id,
            limits,
            batch: None,
            pending_principals: 0,
            pending_rows: 0,
            committed_batches: 0,
        }
    }

    pub fn ad_id(&self) -> Uuid {
        self.ad_id
    }

    /// Batches committed by this pipeline.
    pub fn committed_batches(&self) -> u64 {
        self.committed_batches
    }

    /// Principals written but not yet committed.
    pub fn pending_principals(&self) -> usize {
        self.pending_principals
    }

    async fn open_batch(&mut self) -> AdResult<&mut Box<dyn SinkBatch>> {
        let batch = match self.batch.take() {
            Some(batch) => batch,
            None => self.sink.begin().await?,
        };
        Ok(self.batch.insert(batch))
    }

    /// Upsert a principal under the run and replace its edges.
    ///
    /// On failure the open batch is rolled back; earlier batches stay
    /// committed.
    pub async fn write_principal(
        &mut self,
        resolved: &ResolvedPrincipal,
    ) -> AdResult<PrincipalRef> {
        let ad_id = self.ad_id;
        let outcome: AdResult<PrincipalRef> = async {
            let batch = self.open_batch().await?;
            let owner = batch.upsert_principal(ad_id, &resolved.principal).await?;
            batch.replace_edges(&owner, &resolved.edges).await?;
            Ok(owner)
        }
        .await;

        let owner = match outcome {
            Ok(owner) => owner,
            Err(err) => {
                self.abort().await;
                return Err(err);
            }
        };

        self.pending_principals += 1;
        self.pending_rows += resolved.row_count();
        if self.limits_reached() {
            self.commit_batch().await?;
        }
        Ok(owner)
    }

    /// Replace the SPN bindings of one service account.
    pub async fn write_services(
        &mut self,
        owner_sam_account_name: &str,
        services: &[CreateSpnService],
    ) -> AdResult<u64> {
        let ad_id = self.ad_id;
        let outcome: AdResult<u64> = async {
            let batch = self.open_batch().await?;
            Ok(batch
                .replace_services(ad_id, owner_sam_account_name, services)
                .await?)
        }
        .await;

        let written = match outcome {
            Ok(written) => written,
            Err(err) => {
                self.abort().await;
                return Err(err);
            }
        };

        self.pending_principals += 1;
        self.pending_rows += services.len().max(1);
        if self.limits_reached() {
            self.commit_batch().await?;
        }
        Ok(written)
    }

    /// Drop every SPN binding of the run in the open batch.
    pub async fn clear_services(&mut self) -> AdResult<u64> {
        let ad_id = self.ad_id;
        let outcome: AdResult<u64> =
            async { Ok(self.open_batch().await?.clear_services(ad_id).await?) }.await;
        if outcome.is_err() {
            self.abort().await;
        }
        outcome
    }

    /// Link delegation edges to machines of the run. Only committed rows
    /// are matched, so commit pending writes first.
    pub async fn resolve_delegation_targets(&mut self) -> AdResult<u64> {
        let ad_id = self.ad_id;
        let outcome: AdResult<u64> =
            async { Ok(self.open_batch().await?.resolve_delegation_targets(ad_id).await?) }.await;
        if outcome.is_err() {
            self.abort().await;
        }
        outcome
    }

    fn limits_reached(&self) -> bool {
        self.pending_principals >= self.limits.batch_size
            || self.pending_rows >= self.limits.max_batch_rows
    }

    /// Commit the open batch, if any.
    pub async fn commit_batch(&mut self) -> AdResult<()> {
        let Some(batch) = self.batch.take() else {
            return Ok(());
        };
        let principals = self.pending_principals;
        let rows = self.pending_rows;
        self.pending_principals = 0;
        self.pending_rows = 0;

        batch.commit().await?;
        self.committed_batches += 1;
        debug!(
            ad_id = %self.ad_id,
            batch = self.committed_batches,
            principals,
            rows,
            "Batch committed"
        );
        Ok(())
    }

    /// Commit whatever is pending and return the number of batches this
    /// pipeline committed.
    pub async fn flush_final(mut self) -> AdResult<u64> {
        self.commit_batch().await?;
        info!(
            ad_id = %self.ad_id,
            batches = self.committed_batches,
            "Pipeline flushed"
        );
        Ok(self.committed_batches)
    }

    /// Roll back the open batch. Rollback failures are logged; the store
    /// discards uncommitted work on its own.
    pub async fn abort(&mut self) {
        let discarded = self.pending_principals;
        self.pending_principals = 0;
        self.pending_rows = 0;
        if let Some(batch) = self.batch.take() {
            if let Err(e) = batch.rollback().await {
                warn!(ad_id = %self.ad_id, error = %e, "Batch rollback failed");
            }
            warn!(ad_id = %self.ad_id, discarded, "Open batch rolled back");
        }
    }
}
