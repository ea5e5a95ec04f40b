//! Domain info model. One row per enumeration run; its id is the run key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Domain-level attributes captured at the start of a run.
///
/// Policy intervals are kept in the directory's native form: negative
/// counts of 100-nanosecond ticks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreateDomainInfo {
    pub name: Option<String>,
    pub distinguished_name: Option<String>,
    pub object_sid: Option<String>,
    pub object_guid: Option<String>,
    pub functional_level: Option<i64>,
    pub when_created: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
    pub max_pwd_age: Option<i64>,
    pub min_pwd_age: Option<i64>,
    pub min_pwd_length: Option<i64>,
    pub pwd_history_length: Option<i64>,
    pub pwd_properties: Option<i64>,
    pub lockout_threshold: Option<i64>,
    pub lockout_duration: Option<i64>,
    pub lockout_observation_window: Option<i64>,
    pub force_logoff: Option<i64>,
    pub machine_account_quota: Option<i64>,
}

/// A stored run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DomainInfo {
    pub id: Uuid,
    pub fetched_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub info: CreateDomainInfo,
}

impl DomainInfo {
    /// Insert a new run row.
    pub async fn create(pool: &PgPool, input: &CreateDomainInfo) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO ad_info (
                name, distinguished_name, object_sid, object_guid, functional_level,
                when_created, when_changed, max_pwd_age, min_pwd_age, min_pwd_length,
                pwd_history_length, pwd_properties, lockout_threshold, lockout_duration,
                lockout_observation_window, force_logoff, machine_account_quota
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING *
            "#,
        )
        .bind(&input.name)
        .bind(&input.distinguished_name)
        .bind(&input.object_sid)
        .bind(&input.object_guid)
        .bind(input.functional_level)
        .bind(input.when_created)
        .bind(input.when_changed)
        .bind(input.max_pwd_age)
        .bind(input.min_pwd_age)
        .bind(input.min_pwd_length)
        .bind(input.pwd_history_length)
        .bind(input.pwd_properties)
        .bind(input.lockout_threshold)
        .bind(input.lockout_duration)
        .bind(input.lockout_observation_window)
        .bind(input.force_logoff)
        .bind(input.machine_account_quota)
        .fetch_one(pool)
        .await
    }

    /// Find a run by its key.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_info WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
