//! Credential negotiation flags.
//!
//! 凭据协商标志。

use bitflags::bitflags;

bitflags! {
    /// Peer credentials and capabilities requested from the bus during
    /// authentication.
    ///
    /// 认证期间向总线请求的对端凭据和能力。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CredentialFlags: u64 {
        const PID = 1 << 0;
        const UID = 1 << 1;
        const EUID = 1 << 2;
        const GID = 1 << 3;
        const EGID = 1 << 4;
        const EFFECTIVE_CAPS = 1 << 5;
        const PERMITTED_CAPS = 1 << 6;
        const SELINUX_CONTEXT = 1 << 7;
    }
}

impl Default for CredentialFlags {
    fn default() -> Self {
        CredentialFlags::UID | CredentialFlags::EUID | CredentialFlags::EFFECTIVE_CAPS
    }
}
