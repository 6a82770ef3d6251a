use crate::page_fault::FaultKind;
use bitfield_struct::bitfield;
use core::fmt;

/// Access rights of a virtual memory area, and of the pages mapped for it.
///
/// | Bit | Name | Meaning |
/// |-----|------|---------|
/// | 0 | `read` | Loads are allowed |
/// | 1 | `write` | Stores are allowed |
/// | 2 | `execute` | Instruction fetches are allowed |
/// | 3 | `user` | Accessible from user mode |
/// | 4–7 | | Reserved |
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PagePermissions;
/// let vma = PagePermissions::READ_ONLY;
/// let page = vma.demand_paged();
/// assert!(page.read() && page.execute() && page.user());
/// assert!(!page.write());
/// ```
#[bitfield(u8)]
#[derive(PartialEq, Eq, Hash)]
pub struct PagePermissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub user: bool,
    #[bits(4)]
    __: u8,
}

impl PagePermissions {
    pub const NONE: Self = Self::new();
    pub const READ_ONLY: Self = Self::new().with_read(true);
    pub const READ_WRITE: Self = Self::new().with_read(true).with_write(true);

    /// Whether an access of `kind` is allowed.
    #[inline]
    #[must_use]
    pub const fn allows(self, kind: FaultKind) -> bool {
        match kind {
            FaultKind::Read => self.read(),
            FaultKind::Write => self.write(),
        }
    }

    /// Bits to install for a page materialized on demand: these permissions
    /// plus execute and user, which demand-paged mappings always carry.
    #[inline]
    #[must_use]
    pub const fn demand_paged(self) -> Self {
        self.with_execute(true).with_user(true)
    }
}

impl fmt::Display for PagePermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            flag(self.read(), 'r'),
            flag(self.write(), 'w'),
            flag(self.execute(), 'x'),
            flag(self.user(), 'u'),
        )
    }
}
