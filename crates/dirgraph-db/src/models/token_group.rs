//! Effective group membership rows.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::principal::PrincipalKind;

/// One (principal, effective group SID) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTokenGroup {
    pub dn: String,
    pub object_guid: String,
    pub object_sid: String,
    pub cn: Option<String>,
    pub member_sid: String,
    pub kind: PrincipalKind,
}

/// A stored membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AdTokenGroup {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub owner_id: Uuid,
    pub dn: String,
    pub object_guid: String,
    pub object_sid: String,
    pub cn: Option<String>,
    pub member_sid: String,
    pub kind: String,
}

impl AdTokenGroup {
    pub fn kind(&self) -> Option<PrincipalKind> {
        self.kind.parse().ok()
    }

    pub async fn list_for_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_token_groups WHERE owner_id = $1 ORDER BY member_sid")
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }
}
