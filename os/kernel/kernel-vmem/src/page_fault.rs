//! Decoding page faults into what the pager needs to know.

use bitfield_struct::bitfield;
use core::fmt;

/// The access that faulted, as far as permission checks are concerned.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FaultKind {
    /// Load or instruction fetch.
    Read,
    /// Store.
    Write,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Page-fault error code layout (x86-64).
///
/// Each bit describes the condition that caused the page fault.
/// Reference: Intel SDM Vol. 3A, §6.15.1 “Page-Fault Exception (#PF)”.
#[bitfield(u64)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read or execute.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    /// 1 = instruction fetch (execute access).
    pub instruction_fetch: bool, // bit 4

    /// 1 = protection-key violation (if CR4.PKE=1).
    pub protection_key: bool, // bit 5

    /// 1 = shadow stack access (if CET-SS enabled).
    pub shadow_stack: bool, // bit 6

    #[bits(57)]
    __: u64,
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if !self.present() {
            "Non-present page (not mapped yet)"
        } else if self.instruction_fetch() {
            if self.user() {
                "User-mode instruction fetch on protected page (likely NX or SMEP)"
            } else {
                "Kernel instruction fetch on protected page"
            }
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

impl From<PageFaultError> for FaultKind {
    /// Instruction fetches count as reads: demand-paged mappings are always
    /// executable, so only the read bit can reject them.
    fn from(err: PageFaultError) -> Self {
        if err.write() { Self::Write } else { Self::Read }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_access_kind() {
        assert_eq!(FaultKind::from(PageFaultError::from_bits(0b000)), FaultKind::Read);
        assert_eq!(FaultKind::from(PageFaultError::from_bits(0b110)), FaultKind::Write);
        // user-mode instruction fetch of a non-present page
        assert_eq!(FaultKind::from(PageFaultError::from_bits(0b10100)), FaultKind::Read);
    }

    #[test]
    fn explains_protection_faults() {
        let err = PageFaultError::new().with_present(true).with_write(true);
        assert_eq!(err.explain(), "Write access to protected page");
        assert_eq!(
            PageFaultError::new().explain(),
            "Non-present page (not mapped yet)"
        );
    }
}
