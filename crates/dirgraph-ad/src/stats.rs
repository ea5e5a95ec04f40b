//! Run statistics.
//!
//! Counters are kept per stage and stored with each checkpoint, so a resumed
//! run reports the totals of the stages it did not redo.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use dirgraph_connector::record::PrincipalKind;
use dirgraph_db::{IngestStage, PrincipalEdges, RunCheckpoint};

use crate::error::AdError;

/// Skip details kept per stage. Counts stay exact past this.
pub const MAX_SKIP_DETAILS: usize = 1000;

/// A record that was skipped, with enough context to find it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub dn: String,
    pub error_code: String,
    pub error: String,
    /// Where the failure happened: mapping, token_groups, security_descriptor, spn.
    pub phase: String,
}

/// Counters for one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageStatistics {
    /// Records read from the directory.
    pub total: usize,
    /// Records written.
    pub processed: usize,
    /// Records that failed and were left out.
    pub skipped: usize,
    /// Records deliberately left out, e.g. machine accounts in the user stream.
    pub filtered: usize,
    pub token_groups: u64,
    pub aces: u64,
    pub delegations: u64,
    pub services: u64,
    pub malformed_spns: usize,
    pub delegations_resolved: u64,
    pub committed_batches: u64,
    pub skip_details: Vec<SkipRecord>,
}

impl StageStatistics {
    /// Record a principal written together with its edges.
    pub fn record_success(&mut self, edges: &PrincipalEdges) {
        self.processed += 1;
        self.token_groups += edges.token_groups.len() as u64;
        self.aces += edges.aces.len() as u64;
        self.delegations += edges.delegations.len() as u64;
    }

    /// Record a record that failed and was left out.
    pub fn record_skip(&mut self, dn: &str, error: &AdError, phase: &str) {
        self.skipped += 1;
        warn!(dn = %dn, phase = %phase, error_code = error.error_code(), error = %error, "Directory record skipped");
        self.push_detail(dn, error, phase);
    }

    pub fn record_filtered(&mut self, dn: &str, reason: &str) {
        self.filtered += 1;
        debug!(dn = %dn, reason = %reason, "Directory record filtered");
    }

    /// Record an SPN that did not parse. The owning record is still written.
    pub fn record_malformed_spn(&mut self, owner: &str, error: &AdError) {
        self.malformed_spns += 1;
        self.push_detail(owner, error, "spn");
    }

    fn push_detail(&mut self, dn: &str, error: &AdError, phase: &str) {
        if self.skip_details.len() < MAX_SKIP_DETAILS {
            self.skip_details.push(SkipRecord {
                dn: dn.to_string(),
                error_code: error.error_code().to_string(),
                error: error.to_string(),
                phase: phase.to_string(),
            });
        }
    }

    pub fn has_failures(&self) -> bool {
        self.skipped > 0 || self.malformed_spns > 0
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({}))
    }
}

/// Outcome of a run, also stored as checkpoint statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub ad_id: Uuid,
    /// Last committed stage.
    pub stage: IngestStage,
    /// Stage the run was resumed from, if it was resumed.
    pub resumed_from: Option<IngestStage>,
    pub users: StageStatistics,
    pub machines: StageStatistics,
    pub groups: StageStatistics,
    pub services: StageStatistics,
}

impl IngestReport {
    pub fn new(ad_id: Uuid) -> Self {
        Self {
            ad_id,
            stage: IngestStage::Start,
            resumed_from: None,
            users: StageStatistics::default(),
            machines: StageStatistics::default(),
            groups: StageStatistics::default(),
            services: StageStatistics::default(),
        }
    }

    /// Rebuild the report of an interrupted run from its checkpoint.
    ///
    /// Statistics that do not parse are dropped; the stage always comes from
    /// the checkpoint row.
    pub fn from_checkpoint(checkpoint: &RunCheckpoint) -> Self {
        let stage = checkpoint.stage();
        let mut report = serde_json::from_value::<Self>(checkpoint.statistics.clone())
            .unwrap_or_else(|e| {
                warn!(ad_id = %checkpoint.ad_id, error = %e, "Checkpoint statistics unreadable");
                Self::new(checkpoint.ad_id)
            });
        report.ad_id = checkpoint.ad_id;
        report.stage = stage;
        report.resumed_from = Some(stage);
        report
    }

    pub fn stage_mut(&mut self, kind: PrincipalKind) -> &mut StageStatistics {
        match kind {
            PrincipalKind::User => &mut self.users,
            PrincipalKind::Machine => &mut self.machines,
            PrincipalKind::Group => &mut self.groups,
        }
    }

    pub fn stage_stats(&self, kind: PrincipalKind) -> &StageStatistics {
        match kind {
            PrincipalKind::User => &self.users,
            PrincipalKind::Machine => &self.machines,
            PrincipalKind::Group => &self.groups,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::json!({}))
    }
}
