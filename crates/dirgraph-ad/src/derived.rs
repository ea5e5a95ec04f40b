//! Derived security properties of account principals.
//!
//! Computed from decoded account-control flags, account times and the
//! domain password policy. `is_admin` is not set here; it depends on token
//! groups and is applied once membership is resolved.

use chrono::{DateTime, Duration, Utc};

use dirgraph_db::{AccountControlFlags, AccountTimes, CreateDomainInfo, DerivedSecurityProperties};

/// Password age limits of a domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub min_pwd_age: Option<Duration>,
    pub max_pwd_age: Option<Duration>,
}

impl PasswordPolicy {
    pub fn from_domain(domain: &CreateDomainInfo) -> Self {
        Self {
            min_pwd_age: domain.min_pwd_age.and_then(interval_from_ticks),
            max_pwd_age: domain.max_pwd_age.and_then(interval_from_ticks),
        }
    }
}

/// Convert a policy interval in 100ns ticks into a duration.
///
/// The directory stores intervals as negative tick counts. `0` and
/// `i64::MIN` mean "no limit".
pub fn interval_from_ticks(ticks: i64) -> Option<Duration> {
    if ticks == 0 || ticks == i64::MIN {
        return None;
    }
    Some(Duration::microseconds((ticks.unsigned_abs() / 10) as i64))
}

/// Compute the derived properties of a user or machine.
///
/// `pwd_reset_pending` is set when the raw `pwdLastSet` is zero, which
/// forces a password change at next logon.
pub fn derive_properties(
    flags: &AccountControlFlags,
    times: &AccountTimes,
    pwd_reset_pending: bool,
    policy: &PasswordPolicy,
    now: DateTime<Utc>,
) -> DerivedSecurityProperties {
    let account_expired = times.account_expires.is_some_and(|expires| expires < now);
    let can_logon =
        !flags.account_disable && !flags.lockout && !flags.password_expired && !account_expired;

    // Without a minimum age the password may change as soon as it is set.
    let when_pw_change = times.pwd_last_set.and_then(|set| match policy.min_pwd_age {
        Some(age) => set.checked_add_signed(age),
        None => Some(set),
    });

    let when_pw_expires = if flags.dont_expire_passwd {
        None
    } else {
        times
            .pwd_last_set
            .zip(policy.max_pwd_age)
            .and_then(|(set, age)| set.checked_add_signed(age))
    };

    let must_change_pw = if pwd_reset_pending {
        Some(now)
    } else {
        when_pw_expires
    };

    DerivedSecurityProperties {
        can_logon,
        is_admin: false,
        when_pw_change,
        when_pw_expires,
        must_change_pw,
    }
}
