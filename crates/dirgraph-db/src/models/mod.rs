//! Normalized directory security model.

pub mod ace;
pub mod checkpoint;
pub mod delegation;
pub mod domain_info;
pub mod principal;
pub mod spn_service;
pub mod token_group;

pub use ace::{AdAce, CreateAce};
pub use checkpoint::{IngestStage, RunCheckpoint};
pub use delegation::{AdConstrainedDelegation, CreateConstrainedDelegation};
pub use domain_info::{CreateDomainInfo, DomainInfo};
pub use principal::{
    principal_table, AccountControlFlags, AccountTimes, AdGroup, AdMachine, AdUser,
    DerivedSecurityProperties, GroupRow, MachineRow, Principal, PrincipalIdentity, PrincipalKind,
    PrincipalRef, UserRow,
};
pub use spn_service::{AdSpnService, CreateSpnService};
pub use token_group::{AdTokenGroup, CreateTokenGroup};
