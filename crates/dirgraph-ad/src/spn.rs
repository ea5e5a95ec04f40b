//! Service principal names.
//!
//! An SPN has the shape `service/host[:port]`. Bindings are read from
//! `servicePrincipalName` of service accounts; delegation edges come from
//! `msDS-AllowedToDelegateTo` of users and machines.

use std::fmt;

use tracing::warn;

use dirgraph_db::{CreateConstrainedDelegation, CreateSpnService};

use crate::error::{AdError, AdResult};

/// A parsed service principal name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipalName {
    pub service: String,
    pub host: String,
    /// Kept verbatim; some services put instance names here.
    pub port: Option<String>,
}

impl ServicePrincipalName {
    /// Split on the rightmost `/`, then split the host segment on its
    /// rightmost `:`.
    pub fn parse(spn: &str) -> AdResult<Self> {
        let (service, target) = spn
            .rsplit_once('/')
            .ok_or_else(|| AdError::malformed_spn(spn, "missing '/'"))?;
        if service.is_empty() {
            return Err(AdError::malformed_spn(spn, "empty service class"));
        }

        let (host, port) = match target.rsplit_once(':') {
            Some((host, port)) => (host, Some(port).filter(|p| !p.is_empty())),
            None => (target, None),
        };
        if host.is_empty() {
            return Err(AdError::malformed_spn(spn, "empty host"));
        }

        Ok(Self {
            service: service.to_string(),
            host: host.to_string(),
            port: port.map(str::to_string),
        })
    }

    /// Account name of the host: first DNS label, upper-cased, with the
    /// machine-account suffix.
    ///
    /// Only the first label is kept, and any port is dropped, because
    /// `sAMAccountName` of a machine is its NetBIOS name. Keeping the whole
    /// FQDN would never match a machine row when delegation targets are
    /// resolved.
    pub fn target_account(&self) -> String {
        let label = self.host.split('.').next().unwrap_or(&self.host);
        format!("{}$", label.to_uppercase())
    }
}

impl fmt::Display for ServicePrincipalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.host)?;
        if let Some(port) = &self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

/// Best-effort target account of an SPN, e.g. `SQL01$` for
/// `MSSQLSvc/sql01.corp.local:1433`.
pub fn delegation_target_account(spn: &str) -> AdResult<String> {
    ServicePrincipalName::parse(spn).map(|parsed| parsed.target_account())
}

/// SPN bindings of one service account. Malformed SPNs are logged and
/// returned alongside the bindings that parsed.
pub fn service_bindings(
    owner_sam_account_name: &str,
    spns: &[String],
) -> (Vec<CreateSpnService>, Vec<AdError>) {
    let mut bindings = Vec::with_capacity(spns.len());
    let mut errors = Vec::new();

    for spn in spns {
        match ServicePrincipalName::parse(spn) {
            Ok(parsed) => bindings.push(CreateSpnService {
                owner_sam_account_name: owner_sam_account_name.to_string(),
                computer_name: parsed.host,
                service: parsed.service,
                port: parsed.port,
            }),
            Err(err) => {
                warn!(owner = owner_sam_account_name, error = %err, "Skipping service principal name");
                errors.push(err);
            }
        }
    }

    (bindings, errors)
}

/// Delegation edges for each `msDS-AllowedToDelegateTo` SPN.
///
/// The edge is kept even when the SPN is malformed, since the right exists
/// regardless; only the target account is left unresolved.
pub fn delegation_edges(
    owner_dn: &str,
    spns: Vec<String>,
) -> (Vec<CreateConstrainedDelegation>, Vec<AdError>) {
    let mut errors = Vec::new();
    let edges = spns
        .into_iter()
        .map(|spn| {
            let target_account = match delegation_target_account(&spn) {
                Ok(account) => Some(account),
                Err(err) => {
                    warn!(dn = owner_dn, error = %err, "Delegation target not derivable");
                    errors.push(err);
                    None
                }
            };
            CreateConstrainedDelegation {
                spn,
                target_account,
            }
        })
        .collect();
    (edges, errors)
}
