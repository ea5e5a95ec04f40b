//! Directory query contract
//!
//! The ingestion pipeline never speaks the wire protocol itself. It consumes
//! a [`DirectoryQuery`] implementation that owns the connection, paging and
//! session lifecycle.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::DirectoryResult;
use crate::record::{AttributeSet, PrincipalKind};
use crate::security::SecurityDescriptor;

/// Lazily paged, finite, non-restartable sequence of directory records.
pub type RecordStream<'a> = BoxStream<'a, DirectoryResult<AttributeSet>>;

/// LDAP filter selecting accounts whose `sAMAccountType` marks them as
/// service-bearing machine accounts.
pub const SERVICE_ACCOUNT_FILTER: &str = "(&(sAMAccountType=805306369))";

/// Query interface onto a directory domain.
///
/// Implementations must tolerate concurrent calls: the ingestion pipeline
/// resolves several principals at once and issues `token_groups` and
/// `security_descriptor` queries for each of them in parallel.
#[async_trait]
pub trait DirectoryQuery: Send + Sync {
    /// Run a paged search with an LDAP filter, returning the requested attributes.
    fn paged_search<'a>(&'a self, filter: &'a str, attributes: &'a [&'a str]) -> RecordStream<'a>;

    /// Fetch the domain object (naming context root) with the requested
    /// policy attributes.
    async fn domain_info(&self, attributes: &[&str]) -> DirectoryResult<AttributeSet>;

    /// Enumerate every principal of the given kind, returning the requested
    /// attributes. An empty list asks for everything the server returns by
    /// default.
    fn all_principals<'a>(
        &'a self,
        kind: PrincipalKind,
        attributes: &'a [&'a str],
    ) -> RecordStream<'a>;

    /// Expand the transitive token groups of the object at `dn`, as SID strings.
    ///
    /// Cycle safety is the implementation's responsibility.
    async fn token_groups(&self, dn: &str) -> DirectoryResult<Vec<String>>;

    /// Fetch the parsed security descriptor of the object at `dn`.
    ///
    /// Returns `Ok(None)` when the object has no readable descriptor.
    async fn security_descriptor(&self, dn: &str) -> DirectoryResult<Option<SecurityDescriptor>>;
}
