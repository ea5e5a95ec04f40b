//! Ingestion orchestrator.
//!
//! Drives a run through its stages in order. Each stage commits all of its
//! writes before the run's checkpoint moves past it, so an interrupted run
//! resumes by redoing only the stage it was in.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tracing::{error, info, instrument};
use uuid::Uuid;

use dirgraph_connector::record::PrincipalKind;
use dirgraph_connector::resilience::RetryExecutor;
use dirgraph_connector::traits::{DirectoryQuery, SERVICE_ACCOUNT_FILTER};
use dirgraph_db::{DomainInfo, IngestStage, PersistenceSink};

use crate::config::IngestConfig;
use crate::decode::RecordReader;
use crate::derived::PasswordPolicy;
use crate::error::{AdError, AdResult};
use crate::ingest::pipeline::{BatchLimits, PersistencePipeline};
use crate::ingest::stage::{resume_point, PrincipalResolver, Resolution, StageWork};
use crate::mapping::{attributes_for, domain_attributes, map_domain};
use crate::spn::service_bindings;
use crate::stats::{IngestReport, StageStatistics};

const SERVICE_ATTRIBUTES: [&str; 3] = [
    "distinguishedName",
    "sAMAccountName",
    "servicePrincipalName",
];

/// Ingests one directory into one store.
pub struct Ingestor {
    directory: Arc<dyn DirectoryQuery>,
    sink: Arc<dyn PersistenceSink>,
    config: IngestConfig,
    retry: RetryExecutor,
}

impl Ingestor {
    pub fn new(
        directory: Arc<dyn DirectoryQuery>,
        sink: Arc<dyn PersistenceSink>,
        config: IngestConfig,
    ) -> Self {
        let retry = RetryExecutor::new(config.retry_config());
        Self {
            directory,
            sink,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Start a new run, or resume the one named by `resume_run_id`.
    pub async fn ingest(&self) -> AdResult<IngestReport> {
        match self.config.resume_run_id {
            Some(ad_id) => self.resume(ad_id).await,
            None => self.run().await,
        }
    }

    /// Start a new run and ingest the directory completely.
    #[instrument(skip(self))]
    pub async fn run(&self) -> AdResult<IngestReport> {
        let attributes = domain_attributes();
        let record = self
            .retry
            .execute("domain_info", || self.directory.domain_info(&attributes))
            .await?;
        let domain = map_domain(&record);
        let info = self.sink.create_run(&domain).await?;
        info!(
            ad_id = %info.id,
            domain = info.info.name.as_deref().unwrap_or("<unnamed>"),
            "Enumeration run created"
        );

        let mut report = IngestReport::new(info.id);
        report.stage = IngestStage::DomainCreated;
        self.save_checkpoint(&report).await?;
        self.drive(&info, report).await
    }

    /// Continue an interrupted run from its last committed stage.
    #[instrument(skip_all, fields(ad_id = %ad_id))]
    pub async fn resume(&self, ad_id: Uuid) -> AdResult<IngestReport> {
        let info = self
            .sink
            .find_run(ad_id)
            .await?
            .ok_or(AdError::RunNotFound(ad_id))?;

        let checkpoint = self.sink.load_checkpoint(ad_id).await?;
        let mut report = match &checkpoint {
            Some(checkpoint) => IngestReport::from_checkpoint(checkpoint),
            None => IngestReport::new(ad_id),
        };
        report.stage = resume_point(checkpoint.as_ref());
        report.resumed_from = Some(report.stage);

        info!(stage = %report.stage, "Resuming enumeration run");
        self.drive(&info, report).await
    }

    async fn drive(&self, info: &DomainInfo, mut report: IngestReport) -> AdResult<IngestReport> {
        let policy = PasswordPolicy::from_domain(&info.info);

        while let Some(target) = report.stage.next() {
            let outcome = match StageWork::reaching(target) {
                Some(StageWork::Principals(kind)) => {
                    let stats = report.stage_mut(kind);
                    *stats = StageStatistics::default();
                    self.ingest_principals(info.id, kind, &policy, stats).await
                }
                Some(StageWork::Services) => {
                    report.services = StageStatistics::default();
                    self.ingest_services(info.id, &mut report.services).await
                }
                Some(StageWork::CreateDomain) | Some(StageWork::Finish) | None => Ok(()),
            };

            if let Err(e) = outcome {
                error!(
                    ad_id = %info.id,
                    stage = %target,
                    committed = %report.stage,
                    error_code = e.error_code(),
                    error = %e,
                    "Stage failed; run stopped at last checkpoint"
                );
                return Err(e);
            }

            report.stage = target;
            self.save_checkpoint(&report).await?;
            info!(ad_id = %info.id, stage = %target, "Stage committed");
        }

        info!(
            ad_id = %info.id,
            users = report.users.processed,
            machines = report.machines.processed,
            groups = report.groups.processed,
            services = report.services.services,
            "Enumeration run complete"
        );
        Ok(report)
    }

    async fn save_checkpoint(&self, report: &IngestReport) -> AdResult<()> {
        self.sink
            .save_checkpoint(report.ad_id, report.stage, &report.to_json())
            .await?;
        Ok(())
    }

    /// Enumerate, resolve and persist every principal of one kind.
    ///
    /// Resolution runs `workers` records ahead of the writer; results are
    /// written in enumeration order.
    #[instrument(skip_all, fields(ad_id = %ad_id, kind = %kind))]
    async fn ingest_principals(
        &self,
        ad_id: Uuid,
        kind: PrincipalKind,
        policy: &PasswordPolicy,
        stats: &mut StageStatistics,
    ) -> AdResult<()> {
        let resolver =
            PrincipalResolver::new(self.directory.as_ref(), &self.retry, *policy, Utc::now());
        let mut pipeline =
            PersistencePipeline::new(self.sink.as_ref(), ad_id, BatchLimits::from(&self.config));

        let attributes = attributes_for(kind);
        let mut resolutions = self
            .directory
            .all_principals(kind, &attributes)
            .map(|item| resolver.resolve(kind, item))
            .buffered(self.config.workers.max(1));

        while let Some(resolution) = resolutions.next().await {
            match resolution {
                Resolution::Resolved {
                    resolved,
                    spn_errors,
                } => {
                    stats.total += 1;
                    for e in &spn_errors {
                        stats.record_malformed_spn(resolved.principal.dn(), e);
                    }
                    pipeline.write_principal(&resolved).await?;
                    stats.record_success(&resolved.edges);
                }
                Resolution::Filtered { dn, reason } => {
                    stats.total += 1;
                    stats.record_filtered(&dn, reason);
                }
                Resolution::Skipped { dn, error, phase } => {
                    stats.total += 1;
                    stats.record_skip(&dn, &error, phase);
                }
                Resolution::StreamFailed(e) => {
                    pipeline.abort().await;
                    return Err(e.into());
                }
            }
        }
        drop(resolutions);

        stats.committed_batches = pipeline.flush_final().await?;
        info!(
            total = stats.total,
            processed = stats.processed,
            skipped = stats.skipped,
            filtered = stats.filtered,
            token_groups = stats.token_groups,
            aces = stats.aces,
            "Principal stage ingested"
        );
        Ok(())
    }

    /// Replace the run's SPN bindings and link delegation edges to machines.
    #[instrument(skip_all, fields(ad_id = %ad_id))]
    async fn ingest_services(&self, ad_id: Uuid, stats: &mut StageStatistics) -> AdResult<()> {
        let mut pipeline =
            PersistencePipeline::new(self.sink.as_ref(), ad_id, BatchLimits::from(&self.config));
        pipeline.clear_services().await?;

        let mut accounts = self
            .directory
            .paged_search(SERVICE_ACCOUNT_FILTER, &SERVICE_ATTRIBUTES);

        while let Some(item) = accounts.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    pipeline.abort().await;
                    return Err(e.into());
                }
            };
            stats.total += 1;

            let reader = RecordReader::new(&record);
            let Some(owner) = reader.string("sAMAccountName") else {
                let err = AdError::malformed_record(reader.dn(), "sAMAccountName");
                stats.record_skip(reader.dn(), &err, "mapping");
                continue;
            };

            let (bindings, errors) =
                service_bindings(&owner, &reader.strings("servicePrincipalName"));
            for e in &errors {
                stats.record_malformed_spn(&owner, e);
            }
            stats.services += pipeline.write_services(&owner, &bindings).await?;
            stats.processed += 1;
        }
        drop(accounts);

        // Delegation targets only match committed machines and bindings.
        pipeline.commit_batch().await?;
        stats.delegations_resolved = pipeline.resolve_delegation_targets().await?;
        stats.committed_batches = pipeline.flush_final().await?;

        info!(
            accounts = stats.processed,
            services = stats.services,
            malformed_spns = stats.malformed_spns,
            delegations_resolved = stats.delegations_resolved,
            "Services ingested"
        );
        Ok(())
    }
}
