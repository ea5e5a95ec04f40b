//! Access control entry rows flattened from security descriptors.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::principal::PrincipalKind;

/// One DACL entry of a securable object, ready for insertion.
///
/// The owning principal and the run are supplied by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreateAce {
    pub object_dn: Option<String>,
    pub object_guid: String,
    pub object_sid: Option<String>,
    pub object_cn: Option<String>,
    /// Position of the entry in the source DACL.
    pub ace_order: i32,
    pub ace_type: String,
    pub ace_flags: i32,
    pub access_mask: i64,
    pub object_type: Option<Uuid>,
    pub inherited_object_type: Option<Uuid>,
    pub trustee_sid: String,
    /// Control flags of the descriptor the entry came from.
    pub sd_control: i32,
}

/// A stored access control entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AdAce {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub owner_id: Uuid,
    pub owner_kind: String,
    #[sqlx(flatten)]
    pub ace: CreateAce,
}

impl AdAce {
    pub fn owner_kind(&self) -> Option<PrincipalKind> {
        self.owner_kind.parse().ok()
    }

    /// Entries of one owner in DACL order.
    pub async fn list_for_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_aces WHERE owner_id = $1 ORDER BY ace_order")
            .bind(owner_id)
            .fetch_all(pool)
            .await
    }
}
