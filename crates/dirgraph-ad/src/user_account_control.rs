//! `userAccountControl` bitmask decoding.

use dirgraph_db::AccountControlFlags;

/// Wrapper over the raw `userAccountControl` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UserAccountControl {
    pub value: u32,
}

impl UserAccountControl {
    pub const SCRIPT: u32 = 0x0000_0001;
    pub const ACCOUNTDISABLE: u32 = 0x0000_0002;
    pub const HOMEDIR_REQUIRED: u32 = 0x0000_0008;
    pub const LOCKOUT: u32 = 0x0000_0010;
    pub const PASSWD_NOTREQD: u32 = 0x0000_0020;
    pub const PASSWD_CANT_CHANGE: u32 = 0x0000_0040;
    pub const ENCRYPTED_TEXT_PWD_ALLOWED: u32 = 0x0000_0080;
    pub const TEMP_DUPLICATE_ACCOUNT: u32 = 0x0000_0100;
    pub const NORMAL_ACCOUNT: u32 = 0x0000_0200;
    pub const INTERDOMAIN_TRUST_ACCOUNT: u32 = 0x0000_0800;
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x0000_1000;
    pub const SERVER_TRUST_ACCOUNT: u32 = 0x0000_2000;
    pub const DONT_EXPIRE_PASSWD: u32 = 0x0001_0000;
    pub const MNS_LOGON_ACCOUNT: u32 = 0x0002_0000;
    pub const SMARTCARD_REQUIRED: u32 = 0x0004_0000;
    pub const TRUSTED_FOR_DELEGATION: u32 = 0x0008_0000;
    pub const NOT_DELEGATED: u32 = 0x0010_0000;
    pub const USE_DES_KEY_ONLY: u32 = 0x0020_0000;
    pub const DONT_REQUIRE_PREAUTH: u32 = 0x0040_0000;
    pub const PASSWORD_EXPIRED: u32 = 0x0080_0000;
    pub const TRUSTED_TO_AUTH_FOR_DELEGATION: u32 = 0x0100_0000;

    pub fn from_value(value: u32) -> Self {
        Self { value }
    }

    /// Decode a raw attribute integer. Values outside `u32` keep their low
    /// 32 bits, which is how the directory stores negative overflows.
    pub fn from_raw(raw: i64) -> Self {
        Self::from_value(raw as u32)
    }

    pub fn has(&self, bit: u32) -> bool {
        self.value & bit != 0
    }

    pub fn is_disabled(&self) -> bool {
        self.has(Self::ACCOUNTDISABLE)
    }

    pub fn is_active(&self) -> bool {
        !self.is_disabled()
    }

    /// Decompose into named flags. The two reserved placeholders are
    /// always false.
    pub fn flags(&self) -> AccountControlFlags {
        AccountControlFlags {
            script: self.has(Self::SCRIPT),
            account_disable: self.has(Self::ACCOUNTDISABLE),
            homedir_required: self.has(Self::HOMEDIR_REQUIRED),
            lockout: self.has(Self::LOCKOUT),
            passwd_notreqd: self.has(Self::PASSWD_NOTREQD),
            passwd_cant_change: self.has(Self::PASSWD_CANT_CHANGE),
            encrypted_text_pwd_allowed: self.has(Self::ENCRYPTED_TEXT_PWD_ALLOWED),
            temp_duplicate_account: self.has(Self::TEMP_DUPLICATE_ACCOUNT),
            normal_account: self.has(Self::NORMAL_ACCOUNT),
            interdomain_trust_account: self.has(Self::INTERDOMAIN_TRUST_ACCOUNT),
            workstation_trust_account: self.has(Self::WORKSTATION_TRUST_ACCOUNT),
            server_trust_account: self.has(Self::SERVER_TRUST_ACCOUNT),
            na_1: false,
            na_2: false,
            dont_expire_passwd: self.has(Self::DONT_EXPIRE_PASSWD),
            mns_logon_account: self.has(Self::MNS_LOGON_ACCOUNT),
            smartcard_required: self.has(Self::SMARTCARD_REQUIRED),
            trusted_for_delegation: self.has(Self::TRUSTED_FOR_DELEGATION),
            not_delegated: self.has(Self::NOT_DELEGATED),
            use_des_key_only: self.has(Self::USE_DES_KEY_ONLY),
            dont_require_preauth: self.has(Self::DONT_REQUIRE_PREAUTH),
            password_expired: self.has(Self::PASSWORD_EXPIRED),
            trusted_to_auth_for_delegation: self.has(Self::TRUSTED_TO_AUTH_FOR_DELEGATION),
        }
    }
}

impl From<u32> for UserAccountControl {
    fn from(value: u32) -> Self {
        Self::from_value(value)
    }
}

impl From<UserAccountControl> for u32 {
    fn from(uac: UserAccountControl) -> Self {
        uac.value
    }
}
