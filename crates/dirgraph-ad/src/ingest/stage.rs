//! Stage work and per-principal resolution.

use chrono::{DateTime, Utc};
use tracing::debug;

use dirgraph_connector::error::{DirectoryError, DirectoryResult};
use dirgraph_connector::record::{AttributeSet, PrincipalKind};
use dirgraph_connector::resilience::RetryExecutor;
use dirgraph_connector::traits::DirectoryQuery;
use dirgraph_db::{IngestStage, Principal, PrincipalEdges, RunCheckpoint};

use crate::decode::RecordReader;
use crate::derived::PasswordPolicy;
use crate::error::AdError;
use crate::ingest::pipeline::ResolvedPrincipal;
use crate::mapping::{is_machine_shaped, map_principal};
use crate::membership::{effective_memberships, is_admin};
use crate::security_descriptor::normalize;
use crate::spn::delegation_edges;

/// Work that moves a run into a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageWork {
    /// The run row already exists by the time any stage work runs.
    CreateDomain,
    Principals(PrincipalKind),
    Services,
    Finish,
}

impl StageWork {
    /// Work needed to reach `target`. `None` for `Start`, which is never a
    /// target.
    pub fn reaching(target: IngestStage) -> Option<Self> {
        match target {
            IngestStage::Start => None,
            IngestStage::DomainCreated => Some(Self::CreateDomain),
            IngestStage::UsersIngested
            | IngestStage::MachinesIngested
            | IngestStage::GroupsIngested => target.principal_kind().map(Self::Principals),
            IngestStage::ServicesIngested => Some(Self::Services),
            IngestStage::Complete => Some(Self::Finish),
        }
    }
}

/// Last committed stage of a run. A run without a checkpoint has at least
/// its domain row, since that is what gives it an id.
pub fn resume_point(checkpoint: Option<&RunCheckpoint>) -> IngestStage {
    checkpoint
        .map(RunCheckpoint::stage)
        .unwrap_or(IngestStage::DomainCreated)
        .max(IngestStage::DomainCreated)
}

/// Outcome of resolving one enumerated record.
#[derive(Debug)]
pub enum Resolution {
    /// Ready to write. SPN errors concern delegation targets only.
    Resolved {
        resolved: ResolvedPrincipal,
        spn_errors: Vec<AdError>,
    },
    Filtered {
        dn: String,
        reason: &'static str,
    },
    Skipped {
        dn: String,
        error: AdError,
        phase: &'static str,
    },
    /// The enumeration itself failed; the stage cannot continue.
    StreamFailed(DirectoryError),
}

/// Resolves records into principals with all of their edges.
///
/// Shared by every in-flight resolution of a stage.
pub struct PrincipalResolver<'a> {
    directory: &'a dyn DirectoryQuery,
    retry: &'a RetryExecutor,
    policy: PasswordPolicy,
    now: DateTime<Utc>,
}

impl<'a> PrincipalResolver<'a> {
    pub fn new(
        directory: &'a dyn DirectoryQuery,
        retry: &'a RetryExecutor,
        policy: PasswordPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            directory,
            retry,
            policy,
            now,
        }
    }

    pub async fn resolve(
        &self,
        kind: PrincipalKind,
        item: DirectoryResult<AttributeSet>,
    ) -> Resolution {
        let record = match item {
            Ok(record) => record,
            Err(e) => return Resolution::StreamFailed(e),
        };

        if kind == PrincipalKind::User && is_machine_shaped(&record) {
            return Resolution::Filtered {
                dn: RecordReader::new(&record).dn().to_string(),
                reason: "machine account in user enumeration",
            };
        }

        let mut principal = match map_principal(kind, &record, &self.policy, self.now) {
            Ok(principal) => principal,
            Err(error) => {
                return Resolution::Skipped {
                    dn: RecordReader::new(&record).dn().to_string(),
                    error,
                    phase: "mapping",
                }
            }
        };
        let dn = principal.dn().to_string();

        let token_groups = match self
            .retry
            .execute("token_groups", || self.directory.token_groups(&dn))
            .await
        {
            Ok(sids) => sids,
            Err(e) => {
                return Resolution::Skipped {
                    dn,
                    error: e.into(),
                    phase: "token_groups",
                }
            }
        };

        let descriptor = match self
            .retry
            .execute("security_descriptor", || {
                self.directory.security_descriptor(&dn)
            })
            .await
        {
            Ok(descriptor) => descriptor,
            Err(e) => {
                return Resolution::Skipped {
                    dn,
                    error: e.into(),
                    phase: "security_descriptor",
                }
            }
        };

        principal.set_admin(is_admin(&principal, &token_groups));

        let (delegations, spn_errors) = match &principal {
            Principal::User(_) | Principal::Machine(_) => delegation_edges(
                &dn,
                RecordReader::new(&record).strings("msDS-AllowedToDelegateTo"),
            ),
            Principal::Group(_) => (Vec::new(), Vec::new()),
        };

        let edges = PrincipalEdges {
            token_groups: effective_memberships(&principal, token_groups).collect(),
            aces: normalize(descriptor.as_ref()).collect(),
            delegations,
        };
        debug!(
            dn = %dn,
            kind = %kind,
            token_groups = edges.token_groups.len(),
            aces = edges.aces.len(),
            delegations = edges.delegations.len(),
            "Principal resolved"
        );

        Resolution::Resolved {
            resolved: ResolvedPrincipal { principal, edges },
            spn_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirgraph_connector::memory::InMemoryDirectory;
    use dirgraph_connector::resilience::RetryConfig;
    use dirgraph_connector::security::{AceType, RawAce, SecurityDescriptor};
    use std::time::Duration;
    use uuid::Uuid;

    const DN: &str = "CN=WEB01,OU=Servers,DC=corp,DC=local";

    fn retry() -> RetryExecutor {
        RetryExecutor::new(RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter: false,
            ..RetryConfig::default()
        })
    }

    fn machine_record() -> AttributeSet {
        AttributeSet::new()
            .with("distinguishedName", vec![DN])
            .with("objectGUID", vec!["5e6f7a8b-0000-4000-8000-000000000030"])
            .with("objectSid", vec!["S-1-5-21-100-200-300-2002"])
            .with("sAMAccountName", vec!["WEB01$"])
            .with("userAccountControl", vec!["4096"])
            .with(
                "msDS-AllowedToDelegateTo",
                vec!["MSSQLSvc/sql01.corp.local:1433", "bogus"],
            )
    }

    fn directory() -> InMemoryDirectory {
        let mut directory = InMemoryDirectory::new(AttributeSet::new());
        directory.set_token_groups(
            DN,
            vec![
                "S-1-5-21-100-200-300-515".to_string(),
                "S-1-5-32-544".to_string(),
            ],
        );
        directory.set_security_descriptor(
            DN,
            SecurityDescriptor::new("5e6f7a8b-0000-4000-8000-000000000030", 0x8C14)
                .with_dn(DN)
                .with_ace(RawAce::new(AceType::AccessAllowed, 0xF01FF, "S-1-5-18"))
                .with_ace(RawAce::new(AceType::AccessAllowed, 0x20094, "S-1-5-11")),
        );
        directory
    }

    #[test]
    fn test_stage_work() {
        assert_eq!(StageWork::reaching(IngestStage::Start), None);
        assert_eq!(
            StageWork::reaching(IngestStage::MachinesIngested),
            Some(StageWork::Principals(PrincipalKind::Machine))
        );
        assert_eq!(
            StageWork::reaching(IngestStage::ServicesIngested),
            Some(StageWork::Services)
        );
        assert_eq!(
            StageWork::reaching(IngestStage::Complete),
            Some(StageWork::Finish)
        );
    }

    #[test]
    fn test_resume_point() {
        assert_eq!(resume_point(None), IngestStage::DomainCreated);
        let checkpoint = RunCheckpoint {
            ad_id: Uuid::new_v4(),
            stage: "groups_ingested".to_string(),
            statistics: serde_json::json!({}),
            updated_at: Utc::now(),
        };
        assert_eq!(resume_point(Some(&checkpoint)), IngestStage::GroupsIngested);
    }

    #[tokio::test]
    async fn test_resolves_machine_with_edges() {
        let directory = directory();
        let retry = retry();
        let resolver =
            PrincipalResolver::new(&directory, &retry, PasswordPolicy::default(), Utc::now());

        let resolution = resolver
            .resolve(PrincipalKind::Machine, Ok(machine_record()))
            .await;
        let (resolved, spn_errors) = match resolution {
            Resolution::Resolved {
                resolved,
                spn_errors,
            } => (resolved, spn_errors),
            other => panic!("expected a resolved principal, got {other:?}"),
        };

        assert!(resolved.principal.is_admin());
        assert_eq!(resolved.edges.token_groups.len(), 2);
        assert_eq!(resolved.edges.aces.len(), 2);
        assert_eq!(resolved.edges.delegations.len(), 2);
        assert_eq!(
            resolved.edges.delegations[0].target_account.as_deref(),
            Some("SQL01$")
        );
        assert_eq!(spn_errors.len(), 1);
    }

    #[tokio::test]
    async fn test_machine_shaped_user_filtered() {
        let directory = directory();
        let retry = retry();
        let resolver =
            PrincipalResolver::new(&directory, &retry, PasswordPolicy::default(), Utc::now());

        let resolution = resolver
            .resolve(PrincipalKind::User, Ok(machine_record()))
            .await;
        assert!(matches!(resolution, Resolution::Filtered { dn, .. } if dn == DN));
    }

    #[tokio::test]
    async fn test_permanent_query_failure_skips() {
        let mut directory = directory();
        directory.fail_permanently(DN);
        let retry = retry();
        let resolver =
            PrincipalResolver::new(&directory, &retry, PasswordPolicy::default(), Utc::now());

        let resolution = resolver
            .resolve(PrincipalKind::Machine, Ok(machine_record()))
            .await;
        match resolution {
            Resolution::Skipped { dn, error, phase } => {
                assert_eq!(dn, DN);
                assert_eq!(phase, "token_groups");
                assert!(matches!(error, AdError::QueryFailure(_)));
            }
            other => panic!("expected a skip, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transient_query_failure_retried() {
        let mut directory = directory();
        directory.fail_transiently(DN, 2);
        let retry = retry();
        let resolver =
            PrincipalResolver::new(&directory, &retry, PasswordPolicy::default(), Utc::now());

        let resolution = resolver
            .resolve(PrincipalKind::Machine, Ok(machine_record()))
            .await;
        assert!(matches!(resolution, Resolution::Resolved { .. }));
    }

    #[tokio::test]
    async fn test_stream_error_passed_through() {
        let directory = directory();
        let retry = retry();
        let resolver =
            PrincipalResolver::new(&directory, &retry, PasswordPolicy::default(), Utc::now());

        let resolution = resolver
            .resolve(
                PrincipalKind::Group,
                Err(DirectoryError::network("connection reset")),
            )
            .await;
        assert!(matches!(resolution, Resolution::StreamFailed(_)));
    }
}
