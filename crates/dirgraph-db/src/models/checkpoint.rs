//! Run checkpoints: the last stage of a run whose writes are committed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgPool};
use std::fmt;
use uuid::Uuid;

use super::principal::PrincipalKind;

/// Ingestion stage reached by a run.
///
/// Stages are strictly ordered. A run only moves to the next stage after
/// every write of the current one is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Start,
    DomainCreated,
    UsersIngested,
    MachinesIngested,
    GroupsIngested,
    ServicesIngested,
    Complete,
}

impl IngestStage {
    /// The stage that follows this one, `None` once complete.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::DomainCreated),
            Self::DomainCreated => Some(Self::UsersIngested),
            Self::UsersIngested => Some(Self::MachinesIngested),
            Self::MachinesIngested => Some(Self::GroupsIngested),
            Self::GroupsIngested => Some(Self::ServicesIngested),
            Self::ServicesIngested => Some(Self::Complete),
            Self::Complete => None,
        }
    }

    /// Principal kind ingested on the way into this stage, if any.
    pub fn principal_kind(&self) -> Option<PrincipalKind> {
        match self {
            Self::UsersIngested => Some(PrincipalKind::User),
            Self::MachinesIngested => Some(PrincipalKind::Machine),
            Self::GroupsIngested => Some(PrincipalKind::Group),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::DomainCreated => "domain_created",
            Self::UsersIngested => "users_ingested",
            Self::MachinesIngested => "machines_ingested",
            Self::GroupsIngested => "groups_ingested",
            Self::ServicesIngested => "services_ingested",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IngestStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "domain_created" => Ok(Self::DomainCreated),
            "users_ingested" => Ok(Self::UsersIngested),
            "machines_ingested" => Ok(Self::MachinesIngested),
            "groups_ingested" => Ok(Self::GroupsIngested),
            "services_ingested" => Ok(Self::ServicesIngested),
            "complete" => Ok(Self::Complete),
            _ => Err(format!("Unknown ingest stage: {}", s)),
        }
    }
}

/// Persisted checkpoint of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RunCheckpoint {
    pub ad_id: Uuid,
    pub stage: String,
    pub statistics: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// Get the stage enum. Unknown values read as `Start`.
    pub fn stage(&self) -> IngestStage {
        self.stage.parse().unwrap_or(IngestStage::Start)
    }

    pub async fn find(pool: &PgPool, ad_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_run_checkpoints WHERE ad_id = $1")
            .bind(ad_id)
            .fetch_optional(pool)
            .await
    }

    /// Record the stage reached by a run.
    pub async fn upsert(
        pool: &PgPool,
        ad_id: Uuid,
        stage: IngestStage,
        statistics: &JsonValue,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO ad_run_checkpoints (ad_id, stage, statistics)
            VALUES ($1, $2, $3)
            ON CONFLICT (ad_id) DO UPDATE SET
                stage = EXCLUDED.stage,
                statistics = EXCLUDED.statistics,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(ad_id)
        .bind(stage.as_str())
        .bind(statistics)
        .fetch_one(pool)
        .await
    }
}
