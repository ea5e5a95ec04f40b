//! PostgreSQL persistence sink. One transaction per batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::{Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::models::{
    principal_table, AccountControlFlags, AccountTimes, AdGroup, AdMachine, AdUser,
    CreateDomainInfo, CreateSpnService, DerivedSecurityProperties, DomainInfo, IngestStage,
    Principal, PrincipalIdentity, PrincipalRef, RunCheckpoint,
};
use crate::pool::DbPool;
use crate::sink::{PersistenceSink, PrincipalEdges, SinkBatch};

type UpsertQuery<'q> = QueryScalar<'q, Postgres, Uuid, PgArguments>;

const IDENTITY_COLUMNS: [&str; 5] = ["dn", "object_guid", "object_sid", "cn", "sam_account_name"];

const TIME_COLUMNS: [&str; 8] = [
    "account_expires",
    "bad_password_time",
    "last_logoff",
    "last_logon",
    "last_logon_timestamp",
    "pwd_last_set",
    "when_changed",
    "when_created",
];

const DERIVED_COLUMNS: [&str; 5] = [
    "can_logon",
    "is_admin",
    "when_pw_change",
    "when_pw_expires",
    "must_change_pw",
];

const USER_COLUMNS: [&str; 16] = [
    "sn",
    "initials",
    "given_name",
    "display_name",
    "name",
    "object_category",
    "object_class",
    "primary_group_id",
    "user_principal_name",
    "sam_account_type",
    "user_account_control",
    "bad_pwd_count",
    "logon_count",
    "code_page",
    "country_code",
    "admin_count",
];

const MACHINE_COLUMNS: [&str; 9] = [
    "dns_host_name",
    "operating_system",
    "operating_system_version",
    "operating_system_service_pack",
    "primary_group_id",
    "sam_account_type",
    "user_account_control",
    "bad_pwd_count",
    "logon_count",
];

const GROUP_COLUMNS: [&str; 8] = [
    "name",
    "description",
    "group_type",
    "admin_count",
    "system_flags",
    "when_changed",
    "when_created",
    "is_admin",
];

const EDGE_TABLES: [&str; 3] = ["ad_aces", "ad_token_groups", "ad_constrained_delegations"];

static USER_UPSERT: OnceLock<String> = OnceLock::new();
static MACHINE_UPSERT: OnceLock<String> = OnceLock::new();
static GROUP_UPSERT: OnceLock<String> = OnceLock::new();

/// Build an upsert keyed on (ad_id, object_guid) that returns the row id.
/// `$1` is always the run key.
fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let params = (2..=columns.len() + 1)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = columns
        .iter()
        .filter(|c| **c != "object_guid")
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {table} (ad_id, {}) VALUES ($1, {params}) \
         ON CONFLICT (ad_id, object_guid) DO UPDATE SET {updates}, fetched_at = NOW() \
         RETURNING id",
        columns.join(", ")
    )
}

/// Delete the row holding `$2` as its DN under a different GUID than `$3`.
///
/// An object deleted and recreated between an interrupted stage and its
/// resume keeps its DN but not its GUID; the old row would otherwise block
/// the upsert on the DN constraint.
fn evict_stale_sql(table: &str) -> String {
    format!(
        "DELETE FROM {table} WHERE ad_id = $1 AND dn = $2 AND object_guid <> $3 RETURNING id"
    )
}

fn user_upsert() -> &'static str {
    USER_UPSERT.get_or_init(|| {
        let columns: Vec<&str> = IDENTITY_COLUMNS
            .iter()
            .chain(USER_COLUMNS.iter())
            .chain(TIME_COLUMNS.iter())
            .chain(AccountControlFlags::COLUMNS.iter())
            .chain(DERIVED_COLUMNS.iter())
            .copied()
            .collect();
        upsert_sql("ad_users", &columns)
    })
}

fn machine_upsert() -> &'static str {
    MACHINE_UPSERT.get_or_init(|| {
        let columns: Vec<&str> = IDENTITY_COLUMNS
            .iter()
            .chain(MACHINE_COLUMNS.iter())
            .chain(TIME_COLUMNS.iter())
            .chain(AccountControlFlags::COLUMNS.iter())
            .chain(DERIVED_COLUMNS.iter())
            .copied()
            .collect();
        upsert_sql("ad_machines", &columns)
    })
}

fn group_upsert() -> &'static str {
    GROUP_UPSERT.get_or_init(|| {
        let columns: Vec<&str> = IDENTITY_COLUMNS
            .iter()
            .chain(GROUP_COLUMNS.iter())
            .copied()
            .collect();
        upsert_sql("ad_groups", &columns)
    })
}

fn bind_identity<'q>(q: UpsertQuery<'q>, id: &'q PrincipalIdentity) -> UpsertQuery<'q> {
    q.bind(&id.dn)
        .bind(&id.object_guid)
        .bind(&id.object_sid)
        .bind(&id.cn)
        .bind(&id.sam_account_name)
}

fn bind_times<'q>(q: UpsertQuery<'q>, t: &AccountTimes) -> UpsertQuery<'q> {
    q.bind(t.account_expires)
        .bind(t.bad_password_time)
        .bind(t.last_logoff)
        .bind(t.last_logon)
        .bind(t.last_logon_timestamp)
        .bind(t.pwd_last_set)
        .bind(t.when_changed)
        .bind(t.when_created)
}

fn bind_flags<'q>(q: UpsertQuery<'q>, flags: &AccountControlFlags) -> UpsertQuery<'q> {
    flags.values().into_iter().fold(q, |q, flag| q.bind(flag))
}

fn bind_derived<'q>(q: UpsertQuery<'q>, d: &DerivedSecurityProperties) -> UpsertQuery<'q> {
    q.bind(d.can_logon)
        .bind(d.is_admin)
        .bind(d.when_pw_change)
        .bind(d.when_pw_expires)
        .bind(d.must_change_pw)
}

fn user_query(ad_id: Uuid, u: &AdUser) -> UpsertQuery<'_> {
    let q = bind_identity(sqlx::query_scalar(user_upsert()).bind(ad_id), &u.identity)
        .bind(&u.sn)
        .bind(&u.initials)
        .bind(&u.given_name)
        .bind(&u.display_name)
        .bind(&u.name)
        .bind(&u.object_category)
        .bind(&u.object_class)
        .bind(u.primary_group_id)
        .bind(&u.user_principal_name)
        .bind(u.sam_account_type)
        .bind(u.user_account_control)
        .bind(u.bad_pwd_count)
        .bind(u.logon_count)
        .bind(u.code_page)
        .bind(u.country_code)
        .bind(u.admin_count);
    bind_derived(bind_flags(bind_times(q, &u.times), &u.uac), &u.derived)
}

fn machine_query(ad_id: Uuid, m: &AdMachine) -> UpsertQuery<'_> {
    let q = bind_identity(sqlx::query_scalar(machine_upsert()).bind(ad_id), &m.identity)
        .bind(&m.dns_host_name)
        .bind(&m.operating_system)
        .bind(&m.operating_system_version)
        .bind(&m.operating_system_service_pack)
        .bind(m.primary_group_id)
        .bind(m.sam_account_type)
        .bind(m.user_account_control)
        .bind(m.bad_pwd_count)
        .bind(m.logon_count);
    bind_derived(bind_flags(bind_times(q, &m.times), &m.uac), &m.derived)
}

fn group_query(ad_id: Uuid, g: &AdGroup) -> UpsertQuery<'_> {
    bind_identity(sqlx::query_scalar(group_upsert()).bind(ad_id), &g.identity)
        .bind(&g.name)
        .bind(&g.description)
        .bind(g.group_type)
        .bind(g.admin_count)
        .bind(g.system_flags)
        .bind(g.when_changed)
        .bind(g.when_created)
        .bind(g.is_admin)
}

/// [`PersistenceSink`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgSink {
    pool: DbPool,
    batches: Arc<AtomicU64>,
}

impl PgSink {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            batches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl PersistenceSink for PgSink {
    async fn create_run(&self, domain: &CreateDomainInfo) -> DbResult<DomainInfo> {
        Ok(DomainInfo::create(self.pool.inner(), domain).await?)
    }

    async fn find_run(&self, ad_id: Uuid) -> DbResult<Option<DomainInfo>> {
        Ok(DomainInfo::find_by_id(self.pool.inner(), ad_id).await?)
    }

    async fn load_checkpoint(&self, ad_id: Uuid) -> DbResult<Option<RunCheckpoint>> {
        Ok(RunCheckpoint::find(self.pool.inner(), ad_id).await?)
    }

    async fn save_checkpoint(
        &self,
        ad_id: Uuid,
        stage: IngestStage,
        statistics: &JsonValue,
    ) -> DbResult<RunCheckpoint> {
        Ok(RunCheckpoint::upsert(self.pool.inner(), ad_id, stage, statistics).await?)
    }

    async fn begin(&self) -> DbResult<Box<dyn SinkBatch>> {
        let tx = self.pool.begin().await?;
        let batch = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(PgBatch { tx, batch }))
    }
}

struct PgBatch {
    tx: Transaction<'static, Postgres>,
    batch: u64,
}

#[async_trait]
impl SinkBatch for PgBatch {
    async fn upsert_principal(
        &mut self,
        ad_id: Uuid,
        principal: &Principal,
    ) -> DbResult<PrincipalRef> {
        let identity = principal.identity();
        let sql = evict_stale_sql(principal_table(principal.kind()));
        let stale: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(ad_id)
            .bind(&identity.dn)
            .bind(&identity.object_guid)
            .fetch_all(&mut *self.tx)
            .await?;
        if !stale.is_empty() {
            for table in EDGE_TABLES {
                sqlx::query(&format!("DELETE FROM {table} WHERE owner_id = ANY($1)"))
                    .bind(&stale)
                    .execute(&mut *self.tx)
                    .await?;
            }
            debug!(dn = %identity.dn, evicted = stale.len(), "Replaced recreated principal");
        }

        let query = match principal {
            Principal::User(u) => user_query(ad_id, u),
            Principal::Machine(m) => machine_query(ad_id, m),
            Principal::Group(g) => group_query(ad_id, g),
        };
        let id = query.fetch_one(&mut *self.tx).await?;

        Ok(PrincipalRef {
            id,
            ad_id,
            kind: principal.kind(),
            identity: principal.identity().clone(),
        })
    }

    async fn replace_edges(
        &mut self,
        owner: &PrincipalRef,
        edges: &PrincipalEdges,
    ) -> DbResult<u64> {
        for table in EDGE_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE owner_id = $1"))
                .bind(owner.id)
                .execute(&mut *self.tx)
                .await?;
        }

        let owner_kind = owner.kind.as_str();
        for ace in &edges.aces {
            sqlx::query(
                r#"
                INSERT INTO ad_aces (
                    ad_id, owner_id, owner_kind, object_dn, object_guid, object_sid, object_cn,
                    ace_order, ace_type, ace_flags, access_mask, object_type,
                    inherited_object_type, trustee_sid, sd_control
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(owner.ad_id)
            .bind(owner.id)
            .bind(owner_kind)
            .bind(&ace.object_dn)
            .bind(&ace.object_guid)
            .bind(&ace.object_sid)
            .bind(&ace.object_cn)
            .bind(ace.ace_order)
            .bind(&ace.ace_type)
            .bind(ace.ace_flags)
            .bind(ace.access_mask)
            .bind(ace.object_type)
            .bind(ace.inherited_object_type)
            .bind(&ace.trustee_sid)
            .bind(ace.sd_control)
            .execute(&mut *self.tx)
            .await?;
        }

        for tg in &edges.token_groups {
            sqlx::query(
                r#"
                INSERT INTO ad_token_groups (
                    ad_id, owner_id, dn, object_guid, object_sid, cn, member_sid, kind
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(owner.ad_id)
            .bind(owner.id)
            .bind(&tg.dn)
            .bind(&tg.object_guid)
            .bind(&tg.object_sid)
            .bind(&tg.cn)
            .bind(&tg.member_sid)
            .bind(tg.kind.as_str())
            .execute(&mut *self.tx)
            .await?;
        }

        for delegation in &edges.delegations {
            sqlx::query(
                r#"
                INSERT INTO ad_constrained_delegations (
                    ad_id, owner_id, owner_kind, spn, target_account
                )
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(owner.ad_id)
            .bind(owner.id)
            .bind(owner_kind)
            .bind(&delegation.spn)
            .bind(&delegation.target_account)
            .execute(&mut *self.tx)
            .await?;
        }

        debug!(
            owner_id = %owner.id,
            table = principal_table(owner.kind),
            rows = edges.row_count(),
            "Replaced principal edges"
        );
        Ok(edges.row_count() as u64)
    }

    async fn clear_services(&mut self, ad_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM ad_spn_services WHERE ad_id = $1")
            .bind(ad_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_services(
        &mut self,
        ad_id: Uuid,
        owner_sam_account_name: &str,
        services: &[CreateSpnService],
    ) -> DbResult<u64> {
        sqlx::query("DELETE FROM ad_spn_services WHERE ad_id = $1 AND owner_sam_account_name = $2")
            .bind(ad_id)
            .bind(owner_sam_account_name)
            .execute(&mut *self.tx)
            .await?;

        for service in services {
            sqlx::query(
                r#"
                INSERT INTO ad_spn_services (
                    ad_id, owner_sam_account_name, computer_name, service, port
                )
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(ad_id)
            .bind(&service.owner_sam_account_name)
            .bind(&service.computer_name)
            .bind(&service.service)
            .bind(&service.port)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(services.len() as u64)
    }

    async fn resolve_delegation_targets(&mut self, ad_id: Uuid) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ad_constrained_delegations d
            SET target_machine_id = m.id
            FROM ad_machines m
            WHERE d.ad_id = $1
              AND m.ad_id = $1
              AND d.target_account = UPPER(m.sam_account_name)
            "#,
        )
        .bind(ad_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        let PgBatch { tx, batch } = *self;
        tx.commit().await.map_err(|e| DbError::CommitFailed {
            batch,
            message: e.to_string(),
        })
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.tx.rollback().await.map_err(DbError::QueryFailed)
    }
}
