//! In-memory persistence sink for testing.
//!
//! Batches buffer their writes and apply them under a single lock on commit,
//! so uncommitted batches are never observable. Commit failures can be
//! injected to exercise checkpoint recovery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{
    AdAce, AdConstrainedDelegation, AdGroup, AdMachine, AdSpnService, AdTokenGroup, AdUser,
    CreateDomainInfo, CreateSpnService, DomainInfo, IngestStage, Principal, PrincipalKind,
    PrincipalRef, RunCheckpoint,
};
use crate::sink::{PersistenceSink, PrincipalEdges, SinkBatch};

#[derive(Debug, Clone)]
struct StoredPrincipal {
    reference: PrincipalRef,
    principal: Principal,
}

impl StoredPrincipal {
    fn matches(&self, ad_id: Uuid, kind: PrincipalKind, object_guid: &str) -> bool {
        self.reference.ad_id == ad_id
            && self.reference.kind == kind
            && self.reference.identity.object_guid == object_guid
    }
}

#[derive(Debug, Default)]
struct Store {
    runs: Vec<DomainInfo>,
    checkpoints: HashMap<Uuid, RunCheckpoint>,
    principals: Vec<StoredPrincipal>,
    aces: Vec<AdAce>,
    token_groups: Vec<AdTokenGroup>,
    delegations: Vec<AdConstrainedDelegation>,
    services: Vec<AdSpnService>,
}

impl Store {
    fn find_principal(&self, ad_id: Uuid, kind: PrincipalKind, object_guid: &str) -> Option<Uuid> {
        self.principals
            .iter()
            .find(|p| p.matches(ad_id, kind, object_guid))
            .map(|p| p.reference.id)
    }

    /// Drop principals holding `dn` under another GUID, with their edges.
    fn evict_stale(&mut self, ad_id: Uuid, kind: PrincipalKind, dn: &str, object_guid: &str) {
        let mut stale = Vec::new();
        self.principals.retain(|p| {
            let is_stale = p.reference.ad_id == ad_id
                && p.reference.kind == kind
                && p.reference.identity.dn == dn
                && p.reference.identity.object_guid != object_guid;
            if is_stale {
                stale.push(p.reference.id);
            }
            !is_stale
        });
        if stale.is_empty() {
            return;
        }

        self.aces.retain(|a| !stale.contains(&a.owner_id));
        self.token_groups.retain(|t| !stale.contains(&t.owner_id));
        self.delegations.retain(|d| !stale.contains(&d.owner_id));
        for delegation in &mut self.delegations {
            if delegation
                .target_machine_id
                .is_some_and(|id| stale.contains(&id))
            {
                delegation.target_machine_id = None;
            }
        }
    }

    fn delegation_matches(&self, ad_id: Uuid) -> Vec<(usize, Uuid)> {
        let machines: HashMap<String, Uuid> = self
            .principals
            .iter()
            .filter(|p| p.reference.ad_id == ad_id && p.reference.kind == PrincipalKind::Machine)
            .filter_map(|p| {
                p.reference
                    .identity
                    .sam_account_name
                    .as_ref()
                    .map(|sam| (sam.to_uppercase(), p.reference.id))
            })
            .collect();

        self.delegations
            .iter()
            .enumerate()
            .filter(|(_, d)| d.ad_id == ad_id)
            .filter_map(|(idx, d)| {
                d.target_account
                    .as_ref()
                    .and_then(|target| machines.get(target))
                    .map(|id| (idx, *id))
            })
            .collect()
    }

    fn apply(&mut self, write: PendingWrite) {
        match write {
            PendingWrite::EvictStale {
                ad_id,
                kind,
                dn,
                object_guid,
            } => self.evict_stale(ad_id, kind, &dn, &object_guid),
            PendingWrite::Principal(stored) => {
                let existing = self.principals.iter_mut().find(|p| {
                    p.matches(
                        stored.reference.ad_id,
                        stored.reference.kind,
                        &stored.reference.identity.object_guid,
                    )
                });
                match existing {
                    Some(slot) => *slot = stored,
                    None => self.principals.push(stored),
                }
            }
            PendingWrite::Edges(owner, edges) => {
                self.aces.retain(|a| a.owner_id != owner.id);
                self.token_groups.retain(|t| t.owner_id != owner.id);
                self.delegations.retain(|d| d.owner_id != owner.id);

                for ace in edges.aces {
                    self.aces.push(AdAce {
                        id: Uuid::new_v4(),
                        ad_id: owner.ad_id,
                        owner_id: owner.id,
                        owner_kind: owner.kind.to_string(),
                        ace,
                    });
                }
                for tg in edges.token_groups {
                    self.token_groups.push(AdTokenGroup {
                        id: Uuid::new_v4(),
                        ad_id: owner.ad_id,
                        owner_id: owner.id,
                        dn: tg.dn,
                        object_guid: tg.object_guid,
                        object_sid: tg.object_sid,
                        cn: tg.cn,
                        member_sid: tg.member_sid,
                        kind: tg.kind.to_string(),
                    });
                }
                for delegation in edges.delegations {
                    self.delegations.push(AdConstrainedDelegation {
                        id: Uuid::new_v4(),
                        ad_id: owner.ad_id,
                        owner_id: owner.id,
                        owner_kind: owner.kind.to_string(),
                        spn: delegation.spn,
                        target_account: delegation.target_account,
                        target_machine_id: None,
                    });
                }
            }
            PendingWrite::ClearServices(ad_id) => {
                self.services.retain(|s| s.ad_id != ad_id);
            }
            PendingWrite::Services(ad_id, owner, services) => {
                self.services
                    .retain(|s| !(s.ad_id == ad_id && s.service.owner_sam_account_name == owner));
                self.services
                    .extend(services.into_iter().map(|service| AdSpnService {
                        id: Uuid::new_v4(),
                        ad_id,
                        service,
                    }));
            }
            PendingWrite::ResolveDelegations(ad_id) => {
                for (idx, machine_id) in self.delegation_matches(ad_id) {
                    self.delegations[idx].target_machine_id = Some(machine_id);
                }
            }
        }
    }
}

#[derive(Debug)]
enum PendingWrite {
    EvictStale {
        ad_id: Uuid,
        kind: PrincipalKind,
        dn: String,
        object_guid: String,
    },
    Principal(StoredPrincipal),
    Edges(PrincipalRef, PrincipalEdges),
    ClearServices(Uuid),
    Services(Uuid, String, Vec<CreateSpnService>),
    ResolveDelegations(Uuid),
}

/// In-memory [`PersistenceSink`].
#[derive(Debug, Clone, Default)]
pub struct InMemorySink {
    store: Arc<Mutex<Store>>,
    commit_attempts: Arc<AtomicU64>,
    committed: Arc<AtomicU64>,
    /// Commit attempts numbered at or above this value fail; 0 disables.
    fail_from: Arc<AtomicU64>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every commit from the `nth` attempt onwards (1-based, counted
    /// over the lifetime of the sink).
    pub fn fail_commits_from(&self, nth: u64) {
        self.fail_from.store(nth.max(1), Ordering::SeqCst);
    }

    pub fn clear_commit_failure(&self) {
        self.fail_from.store(0, Ordering::SeqCst);
    }

    /// Number of batches committed so far.
    pub fn committed_batches(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }

    pub async fn runs(&self) -> Vec<DomainInfo> {
        self.store.lock().await.runs.clone()
    }

    pub async fn checkpoint(&self, ad_id: Uuid) -> Option<RunCheckpoint> {
        self.store.lock().await.checkpoints.get(&ad_id).cloned()
    }

    /// All committed principals of a run, in insertion order.
    pub async fn principals(&self, ad_id: Uuid) -> Vec<(PrincipalRef, Principal)> {
        self.store
            .lock()
            .await
            .principals
            .iter()
            .filter(|p| p.reference.ad_id == ad_id)
            .map(|p| (p.reference.clone(), p.principal.clone()))
            .collect()
    }

    pub async fn users(&self, ad_id: Uuid) -> Vec<AdUser> {
        self.principals(ad_id)
            .await
            .into_iter()
            .filter_map(|(_, p)| match p {
                Principal::User(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    pub async fn machines(&self, ad_id: Uuid) -> Vec<AdMachine> {
        self.principals(ad_id)
            .await
            .into_iter()
            .filter_map(|(_, p)| match p {
                Principal::Machine(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub async fn groups(&self, ad_id: Uuid) -> Vec<AdGroup> {
        self.principals(ad_id)
            .await
            .into_iter()
            .filter_map(|(_, p)| match p {
                Principal::Group(g) => Some(g),
                _ => None,
            })
            .collect()
    }

    /// Stored reference of the principal with the given DN, of any kind.
    pub async fn principal_ref(&self, ad_id: Uuid, dn: &str) -> Option<PrincipalRef> {
        self.store
            .lock()
            .await
            .principals
            .iter()
            .find(|p| p.reference.ad_id == ad_id && p.reference.identity.dn == dn)
            .map(|p| p.reference.clone())
    }

    pub async fn aces(&self, ad_id: Uuid) -> Vec<AdAce> {
        let store = self.store.lock().await;
        store.aces.iter().filter(|a| a.ad_id == ad_id).cloned().collect()
    }

    pub async fn token_groups(&self, ad_id: Uuid) -> Vec<AdTokenGroup> {
        let store = self.store.lock().await;
        store
            .token_groups
            .iter()
            .filter(|t| t.ad_id == ad_id)
            .cloned()
            .collect()
    }

    pub async fn services(&self, ad_id: Uuid) -> Vec<AdSpnService> {
        let store = self.store.lock().await;
        store
            .services
            .iter()
            .filter(|s| s.ad_id == ad_id)
            .cloned()
            .collect()
    }

    pub async fn delegations(&self, ad_id: Uuid) -> Vec<AdConstrainedDelegation> {
        let store = self.store.lock().await;
        store
            .delegations
            .iter()
            .filter(|d| d.ad_id == ad_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PersistenceSink for InMemorySink {
    async fn create_run(&self, domain: &CreateDomainInfo) -> DbResult<DomainInfo> {
        let run = DomainInfo {
            id: Uuid::new_v4(),
            fetched_at: Utc::now(),
            info: domain.clone(),
        };
        self.store.lock().await.runs.push(run.clone());
        Ok(run)
    }

    async fn find_run(&self, ad_id: Uuid) -> DbResult<Option<DomainInfo>> {
        let store = self.store.lock().await;
        Ok(store.runs.iter().find(|r| r.id == ad_id).cloned())
    }

    async fn load_checkpoint(&self, ad_id: Uuid) -> DbResult<Option<RunCheckpoint>> {
        Ok(self.checkpoint(ad_id).await)
    }

    async fn save_checkpoint(
        &self,
        ad_id: Uuid,
        stage: IngestStage,
        statistics: &JsonValue,
    ) -> DbResult<RunCheckpoint> {
        let mut store = self.store.lock().await;
        if !store.runs.iter().any(|r| r.id == ad_id) {
            return Err(DbError::NotFound(format!("run {ad_id}")));
        }
        let checkpoint = RunCheckpoint {
            ad_id,
            stage: stage.as_str().to_string(),
            statistics: statistics.clone(),
            updated_at: Utc::now(),
        };
        store.checkpoints.insert(ad_id, checkpoint.clone());
        Ok(checkpoint)
    }

    async fn begin(&self) -> DbResult<Box<dyn SinkBatch>> {
        Ok(Box::new(InMemoryBatch {
            sink: self.clone(),
            writes: Vec::new(),
            pending_ids: HashMap::new(),
        }))
    }
}

struct InMemoryBatch {
    sink: InMemorySink,
    writes: Vec<PendingWrite>,
    pending_ids: HashMap<(Uuid, PrincipalKind, String), Uuid>,
}

#[async_trait]
impl SinkBatch for InMemoryBatch {
    async fn upsert_principal(
        &mut self,
        ad_id: Uuid,
        principal: &Principal,
    ) -> DbResult<PrincipalRef> {
        let identity = principal.identity().clone();
        let kind = principal.kind();
        let key = (ad_id, kind, identity.object_guid.clone());

        let id = match self.pending_ids.get(&key) {
            Some(id) => *id,
            None => {
                let store = self.sink.store.lock().await;
                if !store.runs.iter().any(|r| r.id == ad_id) {
                    return Err(DbError::NotFound(format!("run {ad_id}")));
                }
                let id = store
                    .find_principal(ad_id, kind, &identity.object_guid)
                    .unwrap_or_else(Uuid::new_v4);
                self.pending_ids.insert(key, id);
                id
            }
        };

        self.writes.push(PendingWrite::EvictStale {
            ad_id,
            kind,
            dn: identity.dn.clone(),
            object_guid: identity.object_guid.clone(),
        });
        let reference = PrincipalRef {
            id,
            ad_id,
            kind,
            identity,
        };
        self.writes.push(PendingWrite::Principal(StoredPrincipal {
            reference: reference.clone(),
            principal: principal.clone(),
        }));
        Ok(reference)
    }

    async fn replace_edges(
        &mut self,
        owner: &PrincipalRef,
        edges: &PrincipalEdges,
    ) -> DbResult<u64> {
        self.writes
            .push(PendingWrite::Edges(owner.clone(), edges.clone()));
        Ok(edges.row_count() as u64)
    }

    async fn clear_services(&mut self, ad_id: Uuid) -> DbResult<u64> {
        let cleared = self.sink.services(ad_id).await.len() as u64;
        self.writes.push(PendingWrite::ClearServices(ad_id));
        Ok(cleared)
    }

    async fn replace_services(
        &mut self,
        ad_id: Uuid,
        owner_sam_account_name: &str,
        services: &[CreateSpnService],
    ) -> DbResult<u64> {
        self.writes.push(PendingWrite::Services(
            ad_id,
            owner_sam_account_name.to_string(),
            services.to_vec(),
        ));
        Ok(services.len() as u64)
    }

    /// Counts against committed state; delegation edges are always committed
    /// by earlier stages before targets are resolved.
    async fn resolve_delegation_targets(&mut self, ad_id: Uuid) -> DbResult<u64> {
        let resolved = self.sink.store.lock().await.delegation_matches(ad_id).len() as u64;
        self.writes.push(PendingWrite::ResolveDelegations(ad_id));
        Ok(resolved)
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let InMemoryBatch { sink, writes, .. } = *self;
        let attempt = sink.commit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let fail_from = sink.fail_from.load(Ordering::SeqCst);
        if fail_from != 0 && attempt >= fail_from {
            return Err(DbError::CommitFailed {
                batch: attempt,
                message: "injected commit failure".to_string(),
            });
        }

        let mut store = sink.store.lock().await;
        for write in writes {
            store.apply(write);
        }
        sink.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AccountControlFlags, AccountTimes, CreateAce, CreateConstrainedDelegation,
        CreateTokenGroup, DerivedSecurityProperties, PrincipalIdentity,
    };

    fn identity(dn: &str, guid: &str, sam: &str) -> PrincipalIdentity {
        PrincipalIdentity {
            dn: dn.to_string(),
            object_guid: guid.to_string(),
            object_sid: format!("S-1-5-21-1-2-3-{}", guid.len()),
            cn: None,
            sam_account_name: Some(sam.to_string()),
        }
    }

    fn machine(dn: &str, guid: &str, sam: &str) -> Principal {
        Principal::Machine(AdMachine {
            identity: identity(dn, guid, sam),
            dns_host_name: None,
            operating_system: Some("Windows Server 2019".to_string()),
            operating_system_version: None,
            operating_system_service_pack: None,
            primary_group_id: Some(515),
            sam_account_type: Some(805306369),
            user_account_control: Some(4096),
            bad_pwd_count: None,
            logon_count: None,
            times: AccountTimes::default(),
            uac: AccountControlFlags {
                workstation_trust_account: true,
                ..Default::default()
            },
            derived: DerivedSecurityProperties::default(),
        })
    }

    fn edges(owner: &PrincipalRef, aces: usize) -> PrincipalEdges {
        PrincipalEdges {
            token_groups: vec![CreateTokenGroup {
                dn: owner.identity.dn.clone(),
                object_guid: owner.identity.object_guid.clone(),
                object_sid: owner.identity.object_sid.clone(),
                cn: None,
                member_sid: "S-1-5-32-545".to_string(),
                kind: owner.kind,
            }],
            aces: (0..aces)
                .map(|i| CreateAce {
                    object_dn: Some(owner.identity.dn.clone()),
                    object_guid: owner.identity.object_guid.clone(),
                    object_sid: None,
                    object_cn: None,
                    ace_order: i as i32,
                    ace_type: "ACCESS_ALLOWED_ACE_TYPE".to_string(),
                    ace_flags: 0,
                    access_mask: 983551,
                    object_type: None,
                    inherited_object_type: None,
                    trustee_sid: "S-1-5-18".to_string(),
                    sd_control: 4,
                })
                .collect(),
            delegations: vec![],
        }
    }

    async fn new_run(sink: &InMemorySink) -> Uuid {
        sink.create_run(&CreateDomainInfo {
            name: Some("corp.local".to_string()),
            ..Default::default()
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_uncommitted_batch_is_invisible() {
        let sink = InMemorySink::new();
        let ad_id = new_run(&sink).await;

        let mut batch = sink.begin().await.unwrap();
        batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g1", "WS01$"))
            .await
            .unwrap();
        assert!(sink.machines(ad_id).await.is_empty());

        batch.rollback().await.unwrap();
        assert!(sink.machines(ad_id).await.is_empty());
        assert_eq!(sink.committed_batches(), 0);
    }

    #[tokio::test]
    async fn test_upsert_keeps_identity_and_replaces_edges() {
        let sink = InMemorySink::new();
        let ad_id = new_run(&sink).await;

        let mut batch = sink.begin().await.unwrap();
        let first = batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g1", "WS01$"))
            .await
            .unwrap();
        batch.replace_edges(&first, &edges(&first, 3)).await.unwrap();
        batch.commit().await.unwrap();

        let mut batch = sink.begin().await.unwrap();
        let second = batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g1", "WS01$"))
            .await
            .unwrap();
        batch.replace_edges(&second, &edges(&second, 2)).await.unwrap();
        batch.commit().await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(sink.machines(ad_id).await.len(), 1);
        assert_eq!(sink.aces(ad_id).await.len(), 2);
        assert_eq!(sink.token_groups(ad_id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_recreated_object_replaces_stale_row() {
        let sink = InMemorySink::new();
        let ad_id = new_run(&sink).await;

        let mut batch = sink.begin().await.unwrap();
        let old = batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g1", "WS01$"))
            .await
            .unwrap();
        batch.replace_edges(&old, &edges(&old, 3)).await.unwrap();
        let web = batch
            .upsert_principal(ad_id, &machine("CN=WEB01", "g-web", "WEB01$"))
            .await
            .unwrap();
        let mut web_edges = edges(&web, 0);
        web_edges.delegations = vec![CreateConstrainedDelegation {
            spn: "cifs/ws01.corp.local".to_string(),
            target_account: Some("WS01$".to_string()),
        }];
        batch.replace_edges(&web, &web_edges).await.unwrap();
        batch.resolve_delegation_targets(ad_id).await.unwrap();
        batch.commit().await.unwrap();
        assert_eq!(
            sink.delegations(ad_id).await[0].target_machine_id,
            Some(old.id)
        );

        // Same DN, new GUID: the object was deleted and recreated.
        let mut batch = sink.begin().await.unwrap();
        let new = batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g2", "WS01$"))
            .await
            .unwrap();
        batch.replace_edges(&new, &edges(&new, 1)).await.unwrap();
        batch.commit().await.unwrap();

        assert_ne!(old.id, new.id);
        let stored = sink.principal_ref(ad_id, "CN=WS01").await.unwrap();
        assert_eq!(stored.id, new.id);
        assert_eq!(stored.identity.object_guid, "g2");
        assert_eq!(sink.machines(ad_id).await.len(), 2);

        let aces = sink.aces(ad_id).await;
        assert_eq!(aces.len(), 1);
        assert!(aces.iter().all(|a| a.owner_id == new.id));
        assert!(sink
            .token_groups(ad_id)
            .await
            .iter()
            .all(|t| t.owner_id != old.id));
        assert_eq!(sink.delegations(ad_id).await[0].target_machine_id, None);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_batch() {
        let sink = InMemorySink::new();
        let ad_id = new_run(&sink).await;
        sink.fail_commits_from(1);

        let mut batch = sink.begin().await.unwrap();
        batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g1", "WS01$"))
            .await
            .unwrap();
        let err = batch.commit().await.unwrap_err();
        assert!(err.is_commit_failure());
        assert!(sink.machines(ad_id).await.is_empty());

        sink.clear_commit_failure();
        let mut batch = sink.begin().await.unwrap();
        batch
            .upsert_principal(ad_id, &machine("CN=WS01", "g1", "WS01$"))
            .await
            .unwrap();
        batch.commit().await.unwrap();
        assert_eq!(sink.machines(ad_id).await.len(), 1);
        assert_eq!(sink.committed_batches(), 1);
    }

    #[tokio::test]
    async fn test_resolve_delegation_targets() {
        let sink = InMemorySink::new();
        let ad_id = new_run(&sink).await;

        let mut batch = sink.begin().await.unwrap();
        let sql = batch
            .upsert_principal(ad_id, &machine("CN=SQL01", "g-sql", "SQL01$"))
            .await
            .unwrap();
        let web = batch
            .upsert_principal(ad_id, &machine("CN=WEB01", "g-web", "WEB01$"))
            .await
            .unwrap();
        let mut web_edges = edges(&web, 0);
        web_edges.delegations = vec![
            CreateConstrainedDelegation {
                spn: "MSSQLSvc/sql01.corp.local:1433".to_string(),
                target_account: Some("SQL01$".to_string()),
            },
            CreateConstrainedDelegation {
                spn: "cifs/fs99.corp.local".to_string(),
                target_account: Some("FS99$".to_string()),
            },
        ];
        batch.replace_edges(&web, &web_edges).await.unwrap();
        batch.commit().await.unwrap();

        let mut batch = sink.begin().await.unwrap();
        assert_eq!(batch.resolve_delegation_targets(ad_id).await.unwrap(), 1);
        batch.commit().await.unwrap();

        let delegations = sink.delegations(ad_id).await;
        let resolved: Vec<_> = delegations
            .iter()
            .filter_map(|d| d.target_machine_id)
            .collect();
        assert_eq!(resolved, vec![sql.id]);
    }

    #[tokio::test]
    async fn test_services_are_replaced_per_owner() {
        let sink = InMemorySink::new();
        let ad_id = new_run(&sink).await;
        let spn = |service: &str| CreateSpnService {
            owner_sam_account_name: "svc_sql".to_string(),
            computer_name: "sql01.corp.local".to_string(),
            service: service.to_string(),
            port: None,
        };

        let mut batch = sink.begin().await.unwrap();
        batch
            .replace_services(ad_id, "svc_sql", &[spn("MSSQLSvc"), spn("HTTP")])
            .await
            .unwrap();
        batch.commit().await.unwrap();

        let mut batch = sink.begin().await.unwrap();
        batch
            .replace_services(ad_id, "svc_sql", &[spn("MSSQLSvc")])
            .await
            .unwrap();
        batch.commit().await.unwrap();
        assert_eq!(sink.services(ad_id).await.len(), 1);

        let mut batch = sink.begin().await.unwrap();
        assert_eq!(batch.clear_services(ad_id).await.unwrap(), 1);
        batch.commit().await.unwrap();
        assert!(sink.services(ad_id).await.is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_requires_run() {
        let sink = InMemorySink::new();
        let err = sink
            .save_checkpoint(Uuid::new_v4(), IngestStage::DomainCreated, &JsonValue::Null)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let ad_id = new_run(&sink).await;
        sink.save_checkpoint(ad_id, IngestStage::UsersIngested, &serde_json::json!({}))
            .await
            .unwrap();
        let checkpoint = sink.load_checkpoint(ad_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.stage(), IngestStage::UsersIngested);
    }
}
