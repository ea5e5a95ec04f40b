//! In-memory directory for testing and offline replay.
//!
//! Serves a fixed set of records through the [`DirectoryQuery`] contract and
//! can inject transient or permanent failures for individual DNs.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use crate::error::{DirectoryError, DirectoryResult};
use crate::record::{AttributeSet, PrincipalKind};
use crate::security::SecurityDescriptor;
use crate::traits::{DirectoryQuery, RecordStream};

/// Failure to inject for a query against one DN.
#[derive(Debug, Clone)]
enum InjectedFailure {
    /// Fail with a transient error this many more times, then succeed.
    Transient(u32),
    /// Always fail with a permanent error.
    Permanent,
}

/// In-memory [`DirectoryQuery`] implementation.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    domain: AttributeSet,
    principals: HashMap<PrincipalKind, Vec<AttributeSet>>,
    searches: HashMap<String, Vec<AttributeSet>>,
    token_groups: HashMap<String, Vec<String>>,
    descriptors: HashMap<String, SecurityDescriptor>,
    /// Kinds whose enumeration stream breaks after yielding this many records.
    broken_streams: HashMap<PrincipalKind, usize>,
    failures: Mutex<HashMap<String, InjectedFailure>>,
}

impl InMemoryDirectory {
    /// Create a directory serving the given domain object.
    pub fn new(domain: AttributeSet) -> Self {
        Self {
            domain,
            ..Self::default()
        }
    }

    /// Add a principal record of the given kind.
    pub fn add_principal(&mut self, kind: PrincipalKind, record: AttributeSet) {
        self.principals.entry(kind).or_default().push(record);
    }

    /// Register the records returned for a paged search filter.
    pub fn add_search_result(&mut self, filter: impl Into<String>, record: AttributeSet) {
        self.searches.entry(filter.into()).or_default().push(record);
    }

    /// Register the token groups of the object at `dn`.
    pub fn set_token_groups(&mut self, dn: impl Into<String>, sids: Vec<String>) {
        self.token_groups.insert(dn.into(), sids);
    }

    /// Register the security descriptor of the object at `dn`.
    pub fn set_security_descriptor(&mut self, dn: impl Into<String>, sd: SecurityDescriptor) {
        self.descriptors.insert(dn.into(), sd);
    }

    /// Make queries against `dn` fail transiently `times` times before succeeding.
    pub fn fail_transiently(&mut self, dn: impl Into<String>, times: u32) {
        self.failures
            .get_mut()
            .insert(dn.into(), InjectedFailure::Transient(times));
    }

    /// Make every query against `dn` fail permanently.
    pub fn fail_permanently(&mut self, dn: impl Into<String>) {
        self.failures
            .get_mut()
            .insert(dn.into(), InjectedFailure::Permanent);
    }

    /// Break the enumeration stream of `kind` after `after` records.
    pub fn break_stream(&mut self, kind: PrincipalKind, after: usize) {
        self.broken_streams.insert(kind, after);
    }

    async fn check_failure(&self, dn: &str, operation: &str) -> DirectoryResult<()> {
        let mut failures = self.failures.lock().await;
        match failures.get_mut(dn) {
            Some(InjectedFailure::Permanent) => Err(DirectoryError::InsufficientAccess {
                operation: operation.to_string(),
            }),
            Some(InjectedFailure::Transient(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(DirectoryError::unavailable(format!(
                    "{operation} on {dn} temporarily unavailable"
                )))
            }
            _ => Ok(()),
        }
    }
}

fn project(record: &AttributeSet, attributes: &[&str]) -> AttributeSet {
    if attributes.is_empty() {
        return record.clone();
    }
    attributes
        .iter()
        .filter_map(|name| record.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

#[async_trait]
impl DirectoryQuery for InMemoryDirectory {
    fn paged_search<'a>(&'a self, filter: &'a str, attributes: &'a [&'a str]) -> RecordStream<'a> {
        let records: Vec<AttributeSet> = self
            .searches
            .get(filter)
            .map(|records| records.iter().map(|r| project(r, attributes)).collect())
            .unwrap_or_default();
        stream::iter(records.into_iter().map(Ok)).boxed()
    }

    async fn domain_info(&self, attributes: &[&str]) -> DirectoryResult<AttributeSet> {
        Ok(project(&self.domain, attributes))
    }

    fn all_principals<'a>(
        &'a self,
        kind: PrincipalKind,
        attributes: &'a [&'a str],
    ) -> RecordStream<'a> {
        let records: Vec<AttributeSet> = self
            .principals
            .get(&kind)
            .map(|records| records.iter().map(|r| project(r, attributes)).collect())
            .unwrap_or_default();
        match self.broken_streams.get(&kind) {
            Some(&after) => {
                let head = records.into_iter().take(after).map(Ok);
                let tail = std::iter::once(Err(DirectoryError::network(format!(
                    "{kind} enumeration interrupted"
                ))));
                stream::iter(head.chain(tail)).boxed()
            }
            None => stream::iter(records.into_iter().map(Ok)).boxed(),
        }
    }

    async fn token_groups(&self, dn: &str) -> DirectoryResult<Vec<String>> {
        self.check_failure(dn, "token_groups").await?;
        Ok(self.token_groups.get(dn).cloned().unwrap_or_default())
    }

    async fn security_descriptor(&self, dn: &str) -> DirectoryResult<Option<SecurityDescriptor>> {
        self.check_failure(dn, "security_descriptor").await?;
        Ok(self.descriptors.get(dn).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::{AceType, RawAce};

    const DN: &str = "CN=alice,CN=Users,DC=corp,DC=local";

    fn directory() -> InMemoryDirectory {
        let mut dir = InMemoryDirectory::new(AttributeSet::new().with("name", "corp.local"));
        dir.add_principal(
            PrincipalKind::User,
            AttributeSet::new()
                .with("distinguishedName", DN)
                .with("sAMAccountName", "alice"),
        );
        dir.set_token_groups(DN, vec!["S-1-5-32-545".to_string()]);
        dir.set_security_descriptor(
            DN,
            SecurityDescriptor::new("guid", 4).with_ace(RawAce::new(
                AceType::AccessAllowed,
                1,
                "S-1-1-0",
            )),
        );
        dir
    }

    #[tokio::test]
    async fn test_serves_registered_records() {
        let dir = directory();
        let users: Vec<_> = dir.all_principals(PrincipalKind::User, &[]).collect().await;
        assert_eq!(users.len(), 1);
        assert!(dir
            .all_principals(PrincipalKind::Group, &[])
            .collect::<Vec<_>>()
            .await
            .is_empty());
        assert_eq!(dir.token_groups(DN).await.unwrap(), vec!["S-1-5-32-545"]);
        assert!(dir.security_descriptor(DN).await.unwrap().is_some());
        assert!(dir.security_descriptor("CN=other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paged_search_projects_attributes() {
        let mut dir = directory();
        dir.add_search_result(
            "(objectClass=*)",
            AttributeSet::new().with("a", "1").with("b", "2"),
        );
        let rows: Vec<_> = dir
            .paged_search("(objectClass=*)", &["a"])
            .collect::<Vec<_>>()
            .await;
        let row = rows[0].as_ref().unwrap();
        assert!(row.has("a"));
        assert!(!row.has("b"));
    }

    #[tokio::test]
    async fn test_principals_and_domain_project_attributes() {
        let dir = directory();
        let users: Vec<_> = dir
            .all_principals(PrincipalKind::User, &["sAMAccountName"])
            .collect()
            .await;
        let user = users[0].as_ref().unwrap();
        assert_eq!(user.get_string("samaccountname"), Some("alice"));
        assert!(!user.has("distinguishedName"));

        let domain = dir.domain_info(&["maxPwdAge"]).await.unwrap();
        assert!(domain.is_empty());
        assert!(dir.domain_info(&[]).await.unwrap().has("name"));
    }

    #[tokio::test]
    async fn test_transient_failures_clear() {
        let mut dir = directory();
        dir.fail_transiently(DN, 2);
        assert!(dir.token_groups(DN).await.unwrap_err().is_transient());
        assert!(dir.token_groups(DN).await.unwrap_err().is_transient());
        assert!(dir.token_groups(DN).await.is_ok());
    }

    #[tokio::test]
    async fn test_broken_stream_yields_error() {
        let mut dir = directory();
        dir.break_stream(PrincipalKind::User, 1);
        let items: Vec<_> = dir.all_principals(PrincipalKind::User, &[]).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }
}
