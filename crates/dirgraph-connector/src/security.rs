//! Raw security descriptor types as delivered by the directory client.
//!
//! The client has already parsed `nTSecurityDescriptor`; these types carry the
//! parts the ingestion pipeline needs: the control flags and the ordered DACL,
//! together with the identity of the object the descriptor belongs to.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ACE type codes from MS-DTYP 2.4.4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AceType {
    AccessAllowed,
    AccessDenied,
    SystemAudit,
    SystemAlarm,
    AccessAllowedCompound,
    AccessAllowedObject,
    AccessDeniedObject,
    SystemAuditObject,
    SystemAlarmObject,
    AccessAllowedCallback,
    AccessDeniedCallback,
    AccessAllowedCallbackObject,
    AccessDeniedCallbackObject,
    SystemAuditCallback,
    SystemAlarmCallback,
    SystemAuditCallbackObject,
    SystemAlarmCallbackObject,
    SystemMandatoryLabel,
    SystemResourceAttribute,
    SystemScopedPolicyId,
    /// A type code this client does not know.
    Unknown(u8),
}

impl AceType {
    /// Map a raw header type byte to an ACE type.
    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => Self::AccessAllowed,
            0x01 => Self::AccessDenied,
            0x02 => Self::SystemAudit,
            0x03 => Self::SystemAlarm,
            0x04 => Self::AccessAllowedCompound,
            0x05 => Self::AccessAllowedObject,
            0x06 => Self::AccessDeniedObject,
            0x07 => Self::SystemAuditObject,
            0x08 => Self::SystemAlarmObject,
            0x09 => Self::AccessAllowedCallback,
            0x0A => Self::AccessDeniedCallback,
            0x0B => Self::AccessAllowedCallbackObject,
            0x0C => Self::AccessDeniedCallbackObject,
            0x0D => Self::SystemAuditCallback,
            0x0E => Self::SystemAlarmCallback,
            0x0F => Self::SystemAuditCallbackObject,
            0x10 => Self::SystemAlarmCallbackObject,
            0x11 => Self::SystemMandatoryLabel,
            0x12 => Self::SystemResourceAttribute,
            0x13 => Self::SystemScopedPolicyId,
            other => Self::Unknown(other),
        }
    }

    /// Protocol name of the type, as stored in the `ace_type` column.
    pub fn name(&self) -> String {
        let name = match self {
            Self::AccessAllowed => "ACCESS_ALLOWED_ACE_TYPE",
            Self::AccessDenied => "ACCESS_DENIED_ACE_TYPE",
            Self::SystemAudit => "SYSTEM_AUDIT_ACE_TYPE",
            Self::SystemAlarm => "SYSTEM_ALARM_ACE_TYPE",
            Self::AccessAllowedCompound => "ACCESS_ALLOWED_COMPOUND_ACE_TYPE",
            Self::AccessAllowedObject => "ACCESS_ALLOWED_OBJECT_ACE_TYPE",
            Self::AccessDeniedObject => "ACCESS_DENIED_OBJECT_ACE_TYPE",
            Self::SystemAuditObject => "SYSTEM_AUDIT_OBJECT_ACE_TYPE",
            Self::SystemAlarmObject => "SYSTEM_ALARM_OBJECT_ACE_TYPE",
            Self::AccessAllowedCallback => "ACCESS_ALLOWED_CALLBACK_ACE_TYPE",
            Self::AccessDeniedCallback => "ACCESS_DENIED_CALLBACK_ACE_TYPE",
            Self::AccessAllowedCallbackObject => "ACCESS_ALLOWED_CALLBACK_OBJECT_ACE_TYPE",
            Self::AccessDeniedCallbackObject => "ACCESS_DENIED_CALLBACK_OBJECT_ACE_TYPE",
            Self::SystemAuditCallback => "SYSTEM_AUDIT_CALLBACK_ACE_TYPE",
            Self::SystemAlarmCallback => "SYSTEM_ALARM_CALLBACK_ACE_TYPE",
            Self::SystemAuditCallbackObject => "SYSTEM_AUDIT_CALLBACK_OBJECT_ACE_TYPE",
            Self::SystemAlarmCallbackObject => "SYSTEM_ALARM_CALLBACK_OBJECT_ACE_TYPE",
            Self::SystemMandatoryLabel => "SYSTEM_MANDATORY_LABEL_ACE_TYPE",
            Self::SystemResourceAttribute => "SYSTEM_RESOURCE_ATTRIBUTE_ACE_TYPE",
            Self::SystemScopedPolicyId => "SYSTEM_SCOPED_POLICY_ID_ACE_TYPE",
            Self::Unknown(code) => return format!("UNKNOWN_ACE_TYPE_{:#04x}", code),
        };
        name.to_string()
    }

    /// Whether the ACE body carries object-type GUIDs.
    pub fn is_object_specific(&self) -> bool {
        matches!(
            self,
            Self::AccessAllowedObject
                | Self::AccessDeniedObject
                | Self::SystemAuditObject
                | Self::SystemAlarmObject
                | Self::AccessAllowedCallbackObject
                | Self::AccessDeniedCallbackObject
                | Self::SystemAuditCallbackObject
                | Self::SystemAlarmCallbackObject
        )
    }
}

impl fmt::Display for AceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// One access-control entry of a DACL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAce {
    pub ace_type: AceType,
    /// ACE header flags (inheritance bits).
    pub flags: u8,
    pub mask: u32,
    pub object_type: Option<Uuid>,
    pub inherited_object_type: Option<Uuid>,
    /// Trustee SID in string form.
    pub sid: String,
}

impl RawAce {
    /// Create a plain (non-object) ACE.
    pub fn new(ace_type: AceType, mask: u32, sid: impl Into<String>) -> Self {
        Self {
            ace_type,
            flags: 0,
            mask,
            object_type: None,
            inherited_object_type: None,
            sid: sid.into(),
        }
    }

    /// Set the object type GUID.
    pub fn with_object_type(mut self, guid: Uuid) -> Self {
        self.object_type = Some(guid);
        self
    }

    /// Set the inherited object type GUID.
    pub fn with_inherited_object_type(mut self, guid: Uuid) -> Self {
        self.inherited_object_type = Some(guid);
        self
    }

    /// Set the header flags.
    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }
}

/// A parsed security descriptor of one directory object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityDescriptor {
    pub object_dn: Option<String>,
    pub object_guid: String,
    pub object_sid: Option<String>,
    pub object_cn: Option<String>,
    /// `SECURITY_DESCRIPTOR_CONTROL` bits.
    pub control: u16,
    /// Discretionary ACL in source order; `None` when the descriptor has no DACL.
    pub dacl: Option<Vec<RawAce>>,
}

impl SecurityDescriptor {
    /// Create a descriptor for the given object with an empty DACL.
    pub fn new(object_guid: impl Into<String>, control: u16) -> Self {
        Self {
            object_dn: None,
            object_guid: object_guid.into(),
            object_sid: None,
            object_cn: None,
            control,
            dacl: Some(Vec::new()),
        }
    }

    /// Set the object DN.
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.object_dn = Some(dn.into());
        self
    }

    /// Set the object SID.
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.object_sid = Some(sid.into());
        self
    }

    /// Set the object common name.
    pub fn with_cn(mut self, cn: impl Into<String>) -> Self {
        self.object_cn = Some(cn.into());
        self
    }

    /// Append an ACE to the DACL, creating it if absent.
    pub fn with_ace(mut self, ace: RawAce) -> Self {
        self.dacl.get_or_insert_with(Vec::new).push(ace);
        self
    }

    /// Drop the DACL entirely.
    pub fn without_dacl(mut self) -> Self {
        self.dacl = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ace_type_codes() {
        assert_eq!(AceType::from_code(0x00), AceType::AccessAllowed);
        assert_eq!(AceType::from_code(0x05), AceType::AccessAllowedObject);
        assert_eq!(AceType::from_code(0x7F), AceType::Unknown(0x7F));
        assert_eq!(AceType::AccessDenied.name(), "ACCESS_DENIED_ACE_TYPE");
        assert_eq!(AceType::Unknown(0x7F).name(), "UNKNOWN_ACE_TYPE_0x7f");
    }

    #[test]
    fn test_object_specific_types() {
        assert!(AceType::AccessAllowedObject.is_object_specific());
        assert!(AceType::SystemAuditCallbackObject.is_object_specific());
        assert!(!AceType::AccessAllowed.is_object_specific());
        assert!(!AceType::SystemMandatoryLabel.is_object_specific());
    }

    #[test]
    fn test_descriptor_builder_keeps_order() {
        let sd = SecurityDescriptor::new("guid-1", 0x8004)
            .with_ace(RawAce::new(AceType::AccessDenied, 0x10, "S-1-1-0"))
            .with_ace(RawAce::new(AceType::AccessAllowed, 0x20, "S-1-5-11"));
        let sids: Vec<_> = sd
            .dacl
            .as_ref()
            .map(|d| d.iter().map(|a| a.sid.as_str()).collect())
            .unwrap_or_default();
        assert_eq!(sids, vec!["S-1-1-0", "S-1-5-11"]);
        assert!(sd.without_dacl().dacl.is_none());
    }
}
