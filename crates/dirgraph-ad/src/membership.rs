//! Effective group membership from token groups.

use dirgraph_db::{CreateTokenGroup, Principal};

/// Builtin groups whose members hold administrative rights on domain
/// controllers: Administrators, Account Operators, Server Operators and
/// Backup Operators.
const PRIVILEGED_BUILTIN_SIDS: [&str; 4] = [
    "S-1-5-32-544",
    "S-1-5-32-548",
    "S-1-5-32-549",
    "S-1-5-32-551",
];

/// Domain-relative RIDs of Domain Admins, Schema Admins and Enterprise Admins.
const PRIVILEGED_DOMAIN_RIDS: [u32; 3] = [512, 518, 519];

/// Whether a SID names a well-known privileged group.
pub fn is_privileged_sid(sid: &str) -> bool {
    if PRIVILEGED_BUILTIN_SIDS.contains(&sid) {
        return true;
    }
    // S-1-5-21-<domain>-<rid>
    if !sid.starts_with("S-1-5-21-") {
        return false;
    }
    sid.rsplit('-')
        .next()
        .and_then(|rid| rid.parse::<u32>().ok())
        .is_some_and(|rid| PRIVILEGED_DOMAIN_RIDS.contains(&rid))
}

/// Whether any token group of a principal is privileged.
pub fn has_privileged_membership<'a>(sids: impl IntoIterator<Item = &'a str>) -> bool {
    sids.into_iter().any(is_privileged_sid)
}

/// Whether a principal should be flagged as an administrator.
///
/// A group also counts when its own SID is privileged, since token groups
/// of a group do not include the group itself.
pub fn is_admin(principal: &Principal, token_groups: &[String]) -> bool {
    let own_sid = matches!(principal, Principal::Group(_))
        && is_privileged_sid(&principal.identity().object_sid);
    own_sid || has_privileged_membership(token_groups.iter().map(String::as_str))
}

/// One membership row per token-group SID, stamped with the principal's
/// identity and kind. Duplicates and cycles are kept as returned.
pub fn effective_memberships(
    principal: &Principal,
    token_groups: Vec<String>,
) -> impl Iterator<Item = CreateTokenGroup> + '_ {
    let identity = principal.identity();
    let kind = principal.kind();
    token_groups
        .into_iter()
        .map(move |member_sid| CreateTokenGroup {
            dn: identity.dn.clone(),
            object_guid: identity.object_guid.clone(),
            object_sid: identity.object_sid.clone(),
            cn: identity.cn.clone(),
            member_sid,
            kind,
        })
}
