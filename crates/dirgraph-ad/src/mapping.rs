//! Raw directory records to normalized entities.
//!
//! Each entity has one explicit struct literal so that adding a column is a
//! compile error until every mapper sets it. Fields decode independently;
//! only a missing DN, GUID or SID rejects the record.

use chrono::{DateTime, Utc};
use tracing::debug;

use dirgraph_connector::record::{AttributeSet, AttributeValue, PrincipalKind};
use dirgraph_db::{
    AccountControlFlags, AccountTimes, AdGroup, AdMachine, AdUser, CreateDomainInfo, Principal,
    PrincipalIdentity,
};

use crate::decode::RecordReader;
use crate::derived::{derive_properties, PasswordPolicy};
use crate::error::{AdError, AdResult};
use crate::user_account_control::UserAccountControl;

const IDENTITY_ATTRIBUTES: [&str; 5] = [
    "distinguishedName",
    "objectGUID",
    "objectSid",
    "cn",
    "sAMAccountName",
];

const ACCOUNT_TIME_ATTRIBUTES: [&str; 8] = [
    "accountExpires",
    "badPasswordTime",
    "lastLogoff",
    "lastLogon",
    "lastLogonTimestamp",
    "pwdLastSet",
    "whenChanged",
    "whenCreated",
];

/// Attributes requested for the domain object.
pub fn domain_attributes() -> Vec<&'static str> {
    vec![
        "name",
        "distinguishedName",
        "objectSid",
        "objectGUID",
        "msDS-Behavior-Version",
        "whenCreated",
        "whenChanged",
        "maxPwdAge",
        "minPwdAge",
        "minPwdLength",
        "pwdHistoryLength",
        "pwdProperties",
        "lockoutThreshold",
        "lockoutDuration",
        "lockOutObservationWindow",
        "forceLogoff",
        "ms-DS-MachineAccountQuota",
    ]
}

/// Attributes requested for user objects.
pub fn user_attributes() -> Vec<&'static str> {
    let mut attributes = IDENTITY_ATTRIBUTES.to_vec();
    attributes.extend([
        "sn",
        "initials",
        "givenName",
        "displayName",
        "name",
        "objectCategory",
        "objectClass",
        "primaryGroupID",
        "userPrincipalName",
        "sAMAccountType",
        "userAccountControl",
        "badPwdCount",
        "logonCount",
        "codePage",
        "countryCode",
        "adminCount",
        "msDS-AllowedToDelegateTo",
    ]);
    attributes.extend(ACCOUNT_TIME_ATTRIBUTES);
    attributes
}

/// Attributes requested for machine objects.
pub fn machine_attributes() -> Vec<&'static str> {
    let mut attributes = IDENTITY_ATTRIBUTES.to_vec();
    attributes.extend([
        "dNSHostName",
        "operatingSystem",
        "operatingSystemVersion",
        "operatingSystemServicePack",
        "primaryGroupID",
        "sAMAccountType",
        "userAccountControl",
        "badPwdCount",
        "logonCount",
        "msDS-AllowedToDelegateTo",
    ]);
    attributes.extend(ACCOUNT_TIME_ATTRIBUTES);
    attributes
}

/// Attributes requested for group objects.
pub fn group_attributes() -> Vec<&'static str> {
    let mut attributes = IDENTITY_ATTRIBUTES.to_vec();
    attributes.extend([
        "name",
        "description",
        "groupType",
        "adminCount",
        "systemFlags",
        "whenChanged",
        "whenCreated",
    ]);
    attributes
}

/// Attribute list for a principal kind.
pub fn attributes_for(kind: PrincipalKind) -> Vec<&'static str> {
    match kind {
        PrincipalKind::User => user_attributes(),
        PrincipalKind::Machine => machine_attributes(),
        PrincipalKind::Group => group_attributes(),
    }
}

/// Machine accounts carry a trailing `$` in their sAMAccountName.
pub fn is_machine_account_name(sam_account_name: &str) -> bool {
    sam_account_name.ends_with('$')
}

/// Whether a user-stream record is really a machine account.
pub fn is_machine_shaped(record: &AttributeSet) -> bool {
    RecordReader::new(record)
        .string("sAMAccountName")
        .is_some_and(|sam| is_machine_account_name(&sam))
}

/// Map the domain object. Never fails; absent fields stay absent.
pub fn map_domain(record: &AttributeSet) -> CreateDomainInfo {
    let r = RecordReader::new(record);
    CreateDomainInfo {
        name: r.string("name"),
        distinguished_name: r.string("distinguishedName"),
        object_sid: r.sid("objectSid"),
        object_guid: r.guid("objectGUID"),
        functional_level: r.int("msDS-Behavior-Version"),
        when_created: r.timestamp("whenCreated"),
        when_changed: r.timestamp("whenChanged"),
        max_pwd_age: r.int("maxPwdAge"),
        min_pwd_age: r.int("minPwdAge"),
        min_pwd_length: r.int("minPwdLength"),
        pwd_history_length: r.int("pwdHistoryLength"),
        pwd_properties: r.int("pwdProperties"),
        lockout_threshold: r.int("lockoutThreshold"),
        lockout_duration: r.int("lockoutDuration"),
        lockout_observation_window: r.int("lockOutObservationWindow"),
        force_logoff: r.int("forceLogoff"),
        machine_account_quota: r.int("ms-DS-MachineAccountQuota"),
    }
}

fn map_identity(r: &RecordReader<'_>) -> AdResult<PrincipalIdentity> {
    let dn = r
        .string("distinguishedName")
        .ok_or_else(|| AdError::malformed_record(r.dn(), "distinguishedName"))?;
    let object_guid = r
        .guid("objectGUID")
        .ok_or_else(|| AdError::malformed_record(&dn, "objectGUID"))?;
    let object_sid = r
        .sid("objectSid")
        .ok_or_else(|| AdError::malformed_record(&dn, "objectSid"))?;

    Ok(PrincipalIdentity {
        dn,
        object_guid,
        object_sid,
        cn: r.string("cn"),
        sam_account_name: r.string("sAMAccountName"),
    })
}

fn map_times(r: &RecordReader<'_>) -> AccountTimes {
    AccountTimes {
        account_expires: r.timestamp("accountExpires"),
        bad_password_time: r.timestamp("badPasswordTime"),
        last_logoff: r.timestamp("lastLogoff"),
        last_logon: r.timestamp("lastLogon"),
        last_logon_timestamp: r.timestamp("lastLogonTimestamp"),
        pwd_last_set: r.timestamp("pwdLastSet"),
        when_changed: r.timestamp("whenChanged"),
        when_created: r.timestamp("whenCreated"),
    }
}

fn map_uac(raw: Option<i64>) -> AccountControlFlags {
    raw.map(UserAccountControl::from_raw)
        .unwrap_or_default()
        .flags()
}

/// A raw `pwdLastSet` of zero forces a change at next logon.
fn pwd_reset_pending(r: &RecordReader<'_>) -> bool {
    match r.raw("pwdLastSet") {
        Some(AttributeValue::Integer(0)) => true,
        Some(AttributeValue::String(s)) => s.trim() == "0",
        _ => false,
    }
}

pub fn map_user(
    record: &AttributeSet,
    policy: &PasswordPolicy,
    now: DateTime<Utc>,
) -> AdResult<AdUser> {
    let r = RecordReader::new(record);
    let identity = map_identity(&r)?;
    let user_account_control = r.int("userAccountControl");
    let uac = map_uac(user_account_control);
    let times = map_times(&r);
    let derived = derive_properties(&uac, &times, pwd_reset_pending(&r), policy, now);

    Ok(AdUser {
        identity,
        sn: r.string("sn"),
        initials: r.string("initials"),
        given_name: r.string("givenName"),
        display_name: r.string("displayName"),
        name: r.string("name"),
        object_category: r.string("objectCategory"),
        object_class: r.string("objectClass"),
        primary_group_id: r.int("primaryGroupID"),
        user_principal_name: r.string("userPrincipalName"),
        sam_account_type: r.int("sAMAccountType"),
        user_account_control,
        bad_pwd_count: r.int("badPwdCount"),
        logon_count: r.int("logonCount"),
        code_page: r.int("codePage"),
        country_code: r.int("countryCode"),
        admin_count: r.int("adminCount"),
        times,
        uac,
        derived,
    })
}

pub fn map_machine(
    record: &AttributeSet,
    policy: &PasswordPolicy,
    now: DateTime<Utc>,
) -> AdResult<AdMachine> {
    let r = RecordReader::new(record);
    let identity = map_identity(&r)?;
    let user_account_control = r.int("userAccountControl");
    let uac = map_uac(user_account_control);
    let times = map_times(&r);
    let derived = derive_properties(&uac, &times, pwd_reset_pending(&r), policy, now);

    Ok(AdMachine {
        identity,
        dns_host_name: r.string("dNSHostName"),
        operating_system: r.string("operatingSystem"),
        operating_system_version: r.string("operatingSystemVersion"),
        operating_system_service_pack: r.string("operatingSystemServicePack"),
        primary_group_id: r.int("primaryGroupID"),
        sam_account_type: r.int("sAMAccountType"),
        user_account_control,
        bad_pwd_count: r.int("badPwdCount"),
        logon_count: r.int("logonCount"),
        times,
        uac,
        derived,
    })
}

pub fn map_group(record: &AttributeSet) -> AdResult<AdGroup> {
    let r = RecordReader::new(record);
    Ok(AdGroup {
        identity: map_identity(&r)?,
        name: r.string("name"),
        description: r.string("description"),
        group_type: r.int("groupType"),
        admin_count: r.int("adminCount"),
        system_flags: r.int("systemFlags"),
        when_changed: r.timestamp("whenChanged"),
        when_created: r.timestamp("whenCreated"),
        is_admin: false,
    })
}

/// Map a record of the given kind.
pub fn map_principal(
    kind: PrincipalKind,
    record: &AttributeSet,
    policy: &PasswordPolicy,
    now: DateTime<Utc>,
) -> AdResult<Principal> {
    let principal = match kind {
        PrincipalKind::User => Principal::User(map_user(record, policy, now)?),
        PrincipalKind::Machine => Principal::Machine(map_machine(record, policy, now)?),
        PrincipalKind::Group => Principal::Group(map_group(record)?),
    };
    debug!(kind = %kind, dn = %principal.dn(), "Mapped principal");
    Ok(principal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn sample_user_record() -> AttributeSet {
        AttributeSet::new()
            .with("distinguishedName", vec!["CN=Jane Doe,CN=Users,DC=corp,DC=local"])
            .with("objectGUID", vec!["0b9f7c1e-5a3d-4e2f-9c8b-7a6d5e4f3c2b"])
            .with("objectSid", vec!["S-1-5-21-100-200-300-1104"])
            .with("cn", vec!["Jane Doe"])
            .with("sAMAccountName", vec!["jdoe"])
            .with("givenName", vec!["Jane"])
            .with("sn", vec!["Doe"])
            .with("userAccountControl", vec!["514"])
            .with("logonCount", 42i64)
            .with("whenCreated", vec!["20190101000000.0Z"])
            .with("pwdLastSet", vec!["131908320000000000"])
            .with("accountExpires", vec!["9223372036854775807"])
    }

    #[test]
    fn test_map_user_fields() {
        let user = map_user(&sample_user_record(), &PasswordPolicy::default(), now()).unwrap();

        assert_eq!(user.identity.dn, "CN=Jane Doe,CN=Users,DC=corp,DC=local");
        assert_eq!(user.identity.sam_account_name.as_deref(), Some("jdoe"));
        assert_eq!(user.given_name.as_deref(), Some("Jane"));
        assert_eq!(user.user_account_control, Some(514));
        assert_eq!(user.logon_count, Some(42));
        assert!(user.uac.account_disable);
        assert!(user.uac.normal_account);
        assert!(!user.derived.can_logon);
        assert_eq!(
            user.times.when_created,
            Some(Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(user.times.account_expires, None);
    }

    #[test]
    fn test_map_user_password_policy() {
        let policy = PasswordPolicy {
            min_pwd_age: Some(Duration::days(1)),
            max_pwd_age: Some(Duration::days(30)),
        };
        let user = map_user(&sample_user_record(), &policy, now()).unwrap();
        let set = Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(user.times.pwd_last_set, Some(set));
        assert_eq!(user.derived.when_pw_expires, Some(set + Duration::days(30)));
        assert_eq!(user.derived.must_change_pw, user.derived.when_pw_expires);
    }

    #[test]
    fn test_zero_pwd_last_set_forces_change() {
        let mut record = sample_user_record();
        record.set("pwdLastSet", vec!["0"]);
        let user = map_user(&record, &PasswordPolicy::default(), now()).unwrap();
        assert_eq!(user.times.pwd_last_set, None);
        assert_eq!(user.derived.must_change_pw, Some(now()));
    }

    #[test]
    fn test_missing_sid_rejected() {
        let mut record = sample_user_record();
        record.remove("objectSid");
        let err = map_user(&record, &PasswordPolicy::default(), now()).unwrap_err();
        match err {
            AdError::MalformedRecord { dn, field } => {
                assert_eq!(dn, "CN=Jane Doe,CN=Users,DC=corp,DC=local");
                assert_eq!(field, "objectSid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_dn_rejected() {
        let mut record = sample_user_record();
        record.remove("distinguishedName");
        let err = map_group(&record).unwrap_err();
        assert!(matches!(
            err,
            AdError::MalformedRecord {
                field: "distinguishedName",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_field_is_absent_not_fatal() {
        let mut record = sample_user_record();
        record.set("whenCreated", vec!["garbage"]);
        let user = map_user(&record, &PasswordPolicy::default(), now()).unwrap();
        assert_eq!(user.times.when_created, None);
    }

    #[test]
    fn test_map_machine() {
        let record = AttributeSet::new()
            .with("distinguishedName", vec!["CN=SQL01,OU=Servers,DC=corp,DC=local"])
            .with("objectGUID", vec!["1c2d3e4f-0000-4000-8000-000000000001"])
            .with("objectSid", vec!["S-1-5-21-100-200-300-2001"])
            .with("sAMAccountName", vec!["SQL01$"])
            .with("dNSHostName", vec!["sql01.corp.local"])
            .with("operatingSystem", vec!["Windows Server 2019 Standard"])
            .with("userAccountControl", vec!["528384"]);

        let principal =
            map_principal(PrincipalKind::Machine, &record, &PasswordPolicy::default(), now())
                .unwrap();
        let Principal::Machine(machine) = principal else {
            panic!("expected a machine");
        };
        assert_eq!(machine.dns_host_name.as_deref(), Some("sql01.corp.local"));
        assert!(machine.uac.workstation_trust_account);
        assert!(machine.uac.trusted_for_delegation);
        assert!(machine.derived.can_logon);
    }

    #[test]
    fn test_map_group_has_no_flags() {
        let record = AttributeSet::new()
            .with("distinguishedName", vec!["CN=Domain Admins,CN=Users,DC=corp,DC=local"])
            .with("objectGUID", vec!["2d3e4f50-0000-4000-8000-000000000002"])
            .with("objectSid", vec!["S-1-5-21-100-200-300-512"])
            .with("groupType", vec!["-2147483646"])
            .with("adminCount", vec!["1"]);

        let principal =
            map_principal(PrincipalKind::Group, &record, &PasswordPolicy::default(), now())
                .unwrap();
        assert_eq!(principal.kind(), PrincipalKind::Group);
        assert!(principal.account_control().is_none());
        let Principal::Group(group) = principal else {
            panic!("expected a group");
        };
        assert_eq!(group.group_type, Some(-2147483646));
        assert_eq!(group.admin_count, Some(1));
    }

    #[test]
    fn test_map_domain() {
        let record = AttributeSet::new()
            .with("name", vec!["corp"])
            .with("distinguishedName", vec!["DC=corp,DC=local"])
            .with("objectSid", vec!["S-1-5-21-100-200-300"])
            .with("msDS-Behavior-Version", vec!["7"])
            .with("maxPwdAge", vec!["-36288000000000"])
            .with("ms-DS-MachineAccountQuota", vec!["10"]);

        let domain = map_domain(&record);
        assert_eq!(domain.name.as_deref(), Some("corp"));
        assert_eq!(domain.functional_level, Some(7));
        assert_eq!(domain.max_pwd_age, Some(-36288000000000));
        assert_eq!(domain.machine_account_quota, Some(10));
        assert_eq!(domain.object_guid, None);

        let policy = PasswordPolicy::from_domain(&domain);
        assert_eq!(policy.max_pwd_age, Some(Duration::days(42)));
        assert_eq!(policy.min_pwd_age, None);
    }

    #[test]
    fn test_machine_shaped_user() {
        let record = AttributeSet::new().with("sAMAccountName", vec!["WEB01$"]);
        assert!(is_machine_shaped(&record));
        assert!(!is_machine_shaped(&sample_user_record()));
        assert!(is_machine_account_name("X$"));
    }

    #[test]
    fn test_attribute_lists() {
        let users = user_attributes();
        assert!(users.contains(&"userAccountControl"));
        assert!(users.contains(&"pwdLastSet"));
        assert!(machine_attributes().contains(&"dNSHostName"));
        assert!(!group_attributes().contains(&"userAccountControl"));
        assert_eq!(attributes_for(PrincipalKind::Group), group_attributes());
    }

    /// Keep only the requested attributes, as a directory server would.
    fn requested(record: &AttributeSet, attributes: &[&str]) -> AttributeSet {
        attributes
            .iter()
            .filter_map(|name| record.get(name).map(|v| (name.to_string(), v.clone())))
            .collect()
    }

    #[test]
    fn test_attribute_lists_cover_mapped_fields() {
        let user = sample_user_record()
            .with("userPrincipalName", vec!["jdoe@corp.local"])
            .with("msDS-AllowedToDelegateTo", vec!["cifs/fs01.corp.local"])
            .with("thumbnailPhoto", AttributeValue::Binary(vec![0xff; 8]));
        let machine = AttributeSet::new()
            .with("distinguishedName", vec!["CN=SQL01,OU=Servers,DC=corp,DC=local"])
            .with("objectGUID", vec!["1c2d3e4f-0000-4000-8000-000000000001"])
            .with("objectSid", vec!["S-1-5-21-100-200-300-2001"])
            .with("sAMAccountName", vec!["SQL01$"])
            .with("dNSHostName", vec!["sql01.corp.local"])
            .with("operatingSystemVersion", vec!["10.0 (17763)"])
            .with("lastLogonTimestamp", vec!["131908320000000000"]);
        let group = AttributeSet::new()
            .with("distinguishedName", vec!["CN=Backup,CN=Builtin,DC=corp,DC=local"])
            .with("objectGUID", vec!["2d3e4f50-0000-4000-8000-000000000003"])
            .with("objectSid", vec!["S-1-5-32-551"])
            .with("description", vec!["Backup Operators"])
            .with("systemFlags", vec!["-1946157056"]);

        for (kind, record) in [
            (PrincipalKind::User, user),
            (PrincipalKind::Machine, machine),
            (PrincipalKind::Group, group),
        ] {
            let policy = PasswordPolicy::default();
            let full = map_principal(kind, &record, &policy, now()).unwrap();
            let fetched = requested(&record, &attributes_for(kind));
            let projected = map_principal(kind, &fetched, &policy, now()).unwrap();
            assert_eq!(projected, full, "{kind} list misses a mapped attribute");
        }

        let domain = AttributeSet::new()
            .with("name", vec!["corp"])
            .with("lockoutThreshold", vec!["5"])
            .with("pwdProperties", vec!["1"]);
        assert_eq!(
            map_domain(&requested(&domain, &domain_attributes())),
            map_domain(&domain)
        );
    }
}
