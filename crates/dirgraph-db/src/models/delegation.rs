//! Constrained delegation edges from `msDS-AllowedToDelegateTo`.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::principal::PrincipalKind;

/// One delegation right held by a user or machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConstrainedDelegation {
    pub spn: String,
    /// Best-effort account name of the target host, e.g. `SQL01$`.
    pub target_account: Option<String>,
}

/// A stored delegation edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AdConstrainedDelegation {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub owner_id: Uuid,
    pub owner_kind: String,
    pub spn: String,
    pub target_account: Option<String>,
    /// Set once the services stage finds the target machine in the same run.
    pub target_machine_id: Option<Uuid>,
}

impl AdConstrainedDelegation {
    pub fn owner_kind(&self) -> Option<PrincipalKind> {
        self.owner_kind.parse().ok()
    }

    pub async fn list_for_run(pool: &PgPool, ad_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_constrained_delegations WHERE ad_id = $1 ORDER BY spn")
            .bind(ad_id)
            .fetch_all(pool)
            .await
    }
}
