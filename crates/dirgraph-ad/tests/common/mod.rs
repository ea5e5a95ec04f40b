//! Integration test helpers for dirgraph-ad.
//!
//! ```ignore
//! let directory = corp_directory();
//! let sink = Arc::new(InMemorySink::new());
//! let report = ingestor(directory, sink.clone(), test_config()).run().await?;
//! ```

#![allow(dead_code)]

use std::sync::{Arc, Once};
use std::time::Duration;

use dirgraph_ad::{IngestConfig, Ingestor};
use dirgraph_connector::prelude::*;
use dirgraph_db::InMemorySink;

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const DOMAIN_SID: &str = "S-1-5-21-100-200-300";

pub const ALICE_DN: &str = "CN=Alice Admin,CN=Users,DC=corp,DC=local";
pub const ALICE_GUID: &str = "0a000000-0000-4000-8000-000000001101";
pub const SVC_SQL_DN: &str = "CN=svc_sql,OU=Service Accounts,DC=corp,DC=local";
pub const CAROL_DN: &str = "CN=Carol Gone,CN=Users,DC=corp,DC=local";
pub const SQL01_DN: &str = "CN=SQL01,OU=Servers,DC=corp,DC=local";
pub const DOMAIN_ADMINS_DN: &str = "CN=Domain Admins,CN=Users,DC=corp,DC=local";

/// Short delays so retry paths finish quickly.
pub fn test_config() -> IngestConfig {
    IngestConfig {
        workers: 4,
        query_timeout: Duration::from_secs(5),
        max_retries: 3,
        retry_initial_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        ..IngestConfig::default()
    }
}

pub fn ingestor(
    directory: InMemoryDirectory,
    sink: Arc<InMemorySink>,
    config: IngestConfig,
) -> Ingestor {
    init_test_logging();
    Ingestor::new(Arc::new(directory), sink, config)
}

pub fn domain_record() -> AttributeSet {
    AttributeSet::new()
        .with("name", vec!["corp"])
        .with("distinguishedName", vec!["DC=corp,DC=local"])
        .with("objectSid", vec![DOMAIN_SID])
        .with("objectGUID", vec!["9d1c7a52-1f0e-4b7e-8a8e-0c5d2f6e7a10"])
        .with("msDS-Behavior-Version", vec!["7"])
        // 42 days and 1 day, as negative 100ns intervals
        .with("maxPwdAge", vec!["-36288000000000"])
        .with("minPwdAge", vec!["-864000000000"])
        .with("minPwdLength", vec!["7"])
        .with("ms-DS-MachineAccountQuota", vec!["10"])
}

fn principal_record(dn: &str, guid: &str, rid: u32, sam: &str) -> AttributeSet {
    let cn = sam.trim_end_matches('$');
    AttributeSet::new()
        .with("distinguishedName", vec![dn])
        .with("objectGUID", vec![guid])
        .with("objectSid", vec![format!("{DOMAIN_SID}-{rid}")])
        .with("cn", vec![cn])
        .with("sAMAccountName", vec![sam])
}

pub fn user_record(dn: &str, guid: &str, rid: u32, sam: &str, uac: u32) -> AttributeSet {
    principal_record(dn, guid, rid, sam)
        .with("userAccountControl", vec![uac.to_string()])
        .with("sAMAccountType", vec!["805306368"])
        .with("pwdLastSet", vec!["133500000000000000"])
        .with("whenCreated", vec!["20230115093000.0Z"])
}

pub fn machine_record(dn: &str, guid: &str, rid: u32, sam: &str) -> AttributeSet {
    principal_record(dn, guid, rid, sam)
        .with("userAccountControl", vec!["4096"])
        .with("sAMAccountType", vec!["805306369"])
        .with("dNSHostName", vec![format!(
            "{}.corp.local",
            sam.trim_end_matches('$').to_lowercase()
        )])
        .with("operatingSystem", vec!["Windows Server 2019 Standard"])
}

/// A small domain: three users, one machine, one privileged group and one
/// service account with two SPNs, one of them malformed.
///
/// - alice is a member of Domain Admins
/// - svc_sql is trusted for delegation to the SQL01 machine
/// - carol is disabled
pub fn corp_directory() -> InMemoryDirectory {
    corp_directory_with_alice(ALICE_GUID)
}

/// [`corp_directory`] with alice under another GUID, as after she was
/// deleted and recreated.
pub fn corp_directory_with_alice(alice_guid: &str) -> InMemoryDirectory {
    let mut directory = InMemoryDirectory::new(domain_record());

    directory.add_principal(
        PrincipalKind::User,
        user_record(ALICE_DN, alice_guid, 1101, "alice", 512),
    );
    directory.add_principal(
        PrincipalKind::User,
        user_record(
            SVC_SQL_DN,
            "0a000000-0000-4000-8000-000000001102",
            1102,
            "svc_sql",
            0x80200,
        )
        .with(
            "msDS-AllowedToDelegateTo",
            vec!["MSSQLSvc/sql01.corp.local:1433"],
        ),
    );
    directory.add_principal(
        PrincipalKind::User,
        user_record(CAROL_DN, "0a000000-0000-4000-8000-000000001103", 1103, "carol", 514),
    );
    directory.add_principal(
        PrincipalKind::Machine,
        machine_record(SQL01_DN, "0a000000-0000-4000-8000-000000002001", 2001, "SQL01$"),
    );
    directory.add_principal(
        PrincipalKind::Group,
        principal_record(
            DOMAIN_ADMINS_DN,
            "0a000000-0000-4000-8000-000000000512",
            512,
            "Domain Admins",
        )
        .with("groupType", vec!["-2147483646"])
        .with("adminCount", vec!["1"]),
    );

    directory.set_token_groups(
        ALICE_DN,
        vec![format!("{DOMAIN_SID}-512"), format!("{DOMAIN_SID}-513")],
    );
    directory.set_token_groups(SVC_SQL_DN, vec![format!("{DOMAIN_SID}-513")]);
    directory.set_security_descriptor(
        ALICE_DN,
        SecurityDescriptor::new(alice_guid, 0x8C14)
            .with_dn(ALICE_DN)
            .with_ace(RawAce::new(AceType::AccessAllowed, 0xF01FF, "S-1-5-18"))
            .with_ace(RawAce::new(
                AceType::AccessAllowed,
                0xF01FF,
                format!("{DOMAIN_SID}-512"),
            )),
    );

    directory.add_search_result(
        SERVICE_ACCOUNT_FILTER,
        AttributeSet::new()
            .with("distinguishedName", vec![SVC_SQL_DN])
            .with("sAMAccountName", vec!["svc_sql"])
            .with(
                "servicePrincipalName",
                vec!["MSSQLSvc/sql01.corp.local:1433", "not-an-spn"],
            ),
    );

    directory
}
