//! Service principal name bindings of service accounts.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// One SPN owned by a service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreateSpnService {
    pub owner_sam_account_name: String,
    pub computer_name: String,
    pub service: String,
    pub port: Option<String>,
}

/// A stored SPN binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AdSpnService {
    pub id: Uuid,
    pub ad_id: Uuid,
    #[sqlx(flatten)]
    pub service: CreateSpnService,
}

impl AdSpnService {
    pub async fn list_for_run(pool: &PgPool, ad_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM ad_spn_services
            WHERE ad_id = $1
            ORDER BY owner_sam_account_name, service, computer_name
            "#,
        )
        .bind(ad_id)
        .fetch_all(pool)
        .await
    }
}
