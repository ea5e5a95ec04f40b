//! Principal models: users, machines and groups of one enumeration run.
//!
//! A principal is a closed sum over its three variants. Every variant shares
//! the same identity block; users and machines also carry account times,
//! decoded account-control flags and derived security properties.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub use dirgraph_connector::record::PrincipalKind;

/// Identity fields shared by every principal.
///
/// DN, GUID and SID are load-bearing for every downstream join and are
/// therefore mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PrincipalIdentity {
    pub dn: String,
    pub object_guid: String,
    pub object_sid: String,
    pub cn: Option<String>,
    pub sam_account_name: Option<String>,
}

/// Time attributes carried by account principals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AccountTimes {
    pub account_expires: Option<DateTime<Utc>>,
    pub bad_password_time: Option<DateTime<Utc>>,
    pub last_logoff: Option<DateTime<Utc>>,
    pub last_logon: Option<DateTime<Utc>>,
    pub last_logon_timestamp: Option<DateTime<Utc>>,
    pub pwd_last_set: Option<DateTime<Utc>>,
    pub when_changed: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
}

/// Named `userAccountControl` flags.
///
/// Always derived from the raw bitmask stored next to them; never set
/// independently. `na_1` and `na_2` are reserved placeholders kept so the
/// column set does not change across directory versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct AccountControlFlags {
    #[sqlx(rename = "uac_script")]
    pub script: bool,
    #[sqlx(rename = "uac_accountdisable")]
    pub account_disable: bool,
    #[sqlx(rename = "uac_homedir_required")]
    pub homedir_required: bool,
    #[sqlx(rename = "uac_lockout")]
    pub lockout: bool,
    #[sqlx(rename = "uac_passwd_notreqd")]
    pub passwd_notreqd: bool,
    #[sqlx(rename = "uac_passwd_cant_change")]
    pub passwd_cant_change: bool,
    #[sqlx(rename = "uac_encrypted_text_pwd_allowed")]
    pub encrypted_text_pwd_allowed: bool,
    #[sqlx(rename = "uac_temp_duplicate_account")]
    pub temp_duplicate_account: bool,
    #[sqlx(rename = "uac_normal_account")]
    pub normal_account: bool,
    #[sqlx(rename = "uac_interdomain_trust_account")]
    pub interdomain_trust_account: bool,
    #[sqlx(rename = "uac_workstation_trust_account")]
    pub workstation_trust_account: bool,
    #[sqlx(rename = "uac_server_trust_account")]
    pub server_trust_account: bool,
    #[sqlx(rename = "uac_na_1")]
    pub na_1: bool,
    #[sqlx(rename = "uac_na_2")]
    pub na_2: bool,
    #[sqlx(rename = "uac_dont_expire_passwd")]
    pub dont_expire_passwd: bool,
    #[sqlx(rename = "uac_mns_logon_account")]
    pub mns_logon_account: bool,
    #[sqlx(rename = "uac_smartcard_required")]
    pub smartcard_required: bool,
    #[sqlx(rename = "uac_trusted_for_delegation")]
    pub trusted_for_delegation: bool,
    #[sqlx(rename = "uac_not_delegated")]
    pub not_delegated: bool,
    #[sqlx(rename = "uac_use_des_key_only")]
    pub use_des_key_only: bool,
    #[sqlx(rename = "uac_dont_require_preauth")]
    pub dont_require_preauth: bool,
    #[sqlx(rename = "uac_password_expired")]
    pub password_expired: bool,
    #[sqlx(rename = "uac_trusted_to_auth_for_delegation")]
    pub trusted_to_auth_for_delegation: bool,
}

impl AccountControlFlags {
    /// Column names in storage order.
    pub const COLUMNS: [&'static str; 23] = [
        "uac_script",
        "uac_accountdisable",
        "uac_homedir_required",
        "uac_lockout",
        "uac_passwd_notreqd",
        "uac_passwd_cant_change",
        "uac_encrypted_text_pwd_allowed",
        "uac_temp_duplicate_account",
        "uac_normal_account",
        "uac_interdomain_trust_account",
        "uac_workstation_trust_account",
        "uac_server_trust_account",
        "uac_na_1",
        "uac_na_2",
        "uac_dont_expire_passwd",
        "uac_mns_logon_account",
        "uac_smartcard_required",
        "uac_trusted_for_delegation",
        "uac_not_delegated",
        "uac_use_des_key_only",
        "uac_dont_require_preauth",
        "uac_password_expired",
        "uac_trusted_to_auth_for_delegation",
    ];

    /// Flag values in the same order as [`Self::COLUMNS`].
    pub fn values(&self) -> [bool; 23] {
        [
            self.script,
            self.account_disable,
            self.homedir_required,
            self.lockout,
            self.passwd_notreqd,
            self.passwd_cant_change,
            self.encrypted_text_pwd_allowed,
            self.temp_duplicate_account,
            self.normal_account,
            self.interdomain_trust_account,
            self.workstation_trust_account,
            self.server_trust_account,
            self.na_1,
            self.na_2,
            self.dont_expire_passwd,
            self.mns_logon_account,
            self.smartcard_required,
            self.trusted_for_delegation,
            self.not_delegated,
            self.use_des_key_only,
            self.dont_require_preauth,
            self.password_expired,
            self.trusted_to_auth_for_delegation,
        ]
    }
}

/// Security properties computed from flags, times, policy and membership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DerivedSecurityProperties {
    pub can_logon: bool,
    pub is_admin: bool,
    pub when_pw_change: Option<DateTime<Utc>>,
    pub when_pw_expires: Option<DateTime<Utc>>,
    pub must_change_pw: Option<DateTime<Utc>>,
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdUser {
    #[sqlx(flatten)]
    pub identity: PrincipalIdentity,
    pub sn: Option<String>,
    pub initials: Option<String>,
    pub given_name: Option<String>,
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub object_category: Option<String>,
    pub object_class: Option<String>,
    pub primary_group_id: Option<i64>,
    pub user_principal_name: Option<String>,
    pub sam_account_type: Option<i64>,
    pub user_account_control: Option<i64>,
    pub bad_pwd_count: Option<i64>,
    pub logon_count: Option<i64>,
    pub code_page: Option<i64>,
    pub country_code: Option<i64>,
    pub admin_count: Option<i64>,
    #[sqlx(flatten)]
    pub times: AccountTimes,
    #[sqlx(flatten)]
    pub uac: AccountControlFlags,
    #[sqlx(flatten)]
    pub derived: DerivedSecurityProperties,
}

/// A computer account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdMachine {
    #[sqlx(flatten)]
    pub identity: PrincipalIdentity,
    pub dns_host_name: Option<String>,
    pub operating_system: Option<String>,
    pub operating_system_version: Option<String>,
    pub operating_system_service_pack: Option<String>,
    pub primary_group_id: Option<i64>,
    pub sam_account_type: Option<i64>,
    pub user_account_control: Option<i64>,
    pub bad_pwd_count: Option<i64>,
    pub logon_count: Option<i64>,
    #[sqlx(flatten)]
    pub times: AccountTimes,
    #[sqlx(flatten)]
    pub uac: AccountControlFlags,
    #[sqlx(flatten)]
    pub derived: DerivedSecurityProperties,
}

/// A group. Groups carry no account-control flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdGroup {
    #[sqlx(flatten)]
    pub identity: PrincipalIdentity,
    pub name: Option<String>,
    pub description: Option<String>,
    pub group_type: Option<i64>,
    pub admin_count: Option<i64>,
    pub system_flags: Option<i64>,
    pub when_changed: Option<DateTime<Utc>>,
    pub when_created: Option<DateTime<Utc>>,
    pub is_admin: bool,
}

/// One normalized principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User(AdUser),
    Machine(AdMachine),
    Group(AdGroup),
}

impl Principal {
    /// The kind discriminator of this principal.
    pub fn kind(&self) -> PrincipalKind {
        match self {
            Principal::User(_) => PrincipalKind::User,
            Principal::Machine(_) => PrincipalKind::Machine,
            Principal::Group(_) => PrincipalKind::Group,
        }
    }

    /// Shared identity fields.
    pub fn identity(&self) -> &PrincipalIdentity {
        match self {
            Principal::User(u) => &u.identity,
            Principal::Machine(m) => &m.identity,
            Principal::Group(g) => &g.identity,
        }
    }

    pub fn dn(&self) -> &str {
        &self.identity().dn
    }

    /// Mark the principal as privileged.
    pub fn set_admin(&mut self, is_admin: bool) {
        match self {
            Principal::User(u) => u.derived.is_admin = is_admin,
            Principal::Machine(m) => m.derived.is_admin = is_admin,
            Principal::Group(g) => g.is_admin = is_admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            Principal::User(u) => u.derived.is_admin,
            Principal::Machine(m) => m.derived.is_admin,
            Principal::Group(g) => g.is_admin,
        }
    }

    /// Decoded account-control flags; `None` for groups.
    pub fn account_control(&self) -> Option<&AccountControlFlags> {
        match self {
            Principal::User(u) => Some(&u.uac),
            Principal::Machine(m) => Some(&m.uac),
            Principal::Group(_) => None,
        }
    }
}

/// A principal that has been persisted, with its store-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub kind: PrincipalKind,
    pub identity: PrincipalIdentity,
}

/// A stored user row.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub user: AdUser,
}

/// A stored machine row.
#[derive(Debug, Clone, FromRow)]
pub struct MachineRow {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub machine: AdMachine,
}

/// A stored group row.
#[derive(Debug, Clone, FromRow)]
pub struct GroupRow {
    pub id: Uuid,
    pub ad_id: Uuid,
    pub fetched_at: DateTime<Utc>,
    #[sqlx(flatten)]
    pub group: AdGroup,
}

impl UserRow {
    pub async fn find_by_dn(
        pool: &sqlx::PgPool,
        ad_id: Uuid,
        dn: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_users WHERE ad_id = $1 AND dn = $2")
            .bind(ad_id)
            .bind(dn)
            .fetch_optional(pool)
            .await
    }
}

impl MachineRow {
    pub async fn find_by_dn(
        pool: &sqlx::PgPool,
        ad_id: Uuid,
        dn: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_machines WHERE ad_id = $1 AND dn = $2")
            .bind(ad_id)
            .bind(dn)
            .fetch_optional(pool)
            .await
    }
}

impl GroupRow {
    pub async fn find_by_dn(
        pool: &sqlx::PgPool,
        ad_id: Uuid,
        dn: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM ad_groups WHERE ad_id = $1 AND dn = $2")
            .bind(ad_id)
            .bind(dn)
            .fetch_optional(pool)
            .await
    }
}

/// Storage table for each principal kind.
pub fn principal_table(kind: PrincipalKind) -> &'static str {
    match kind {
        PrincipalKind::User => "ad_users",
        PrincipalKind::Machine => "ad_machines",
        PrincipalKind::Group => "ad_groups",
    }
}
