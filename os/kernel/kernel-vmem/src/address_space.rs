//! # Address space and process seams
//!
//! The pager never touches page-table entries itself. It asks the process's
//! [`AddressSpace`] to install or remove translations, and leaves the entry
//! encoding (x86-64 PTEs, RISC-V Sv39, a recording stub in tests) to the
//! implementation.

use crate::PagePermissions;
use crate::vma_list::VmaList;
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress, VirtualPage};

/// Installing a translation failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("no memory for intermediate page tables")]
    OutOfMemory,
    #[error("{0} is already mapped")]
    AlreadyMapped(VirtualAddress),
}

/// The page tables of one process.
pub trait AddressSpace {
    /// Map `len` bytes starting at `page` to physical memory starting at `pa`.
    ///
    /// On failure some of the range may already be mapped; the caller cleans
    /// up with [`unmap`](Self::unmap). A page that was mapped before the call
    /// is reported as [`MapError::AlreadyMapped`] and left as it was.
    ///
    /// # Errors
    /// The translation could not be installed.
    fn map(
        &mut self,
        page: VirtualPage<Size4K>,
        len: u64,
        pa: PhysicalAddress,
        permissions: PagePermissions,
    ) -> Result<(), MapError>;

    /// Remove `pages` translations starting at `page`. Missing translations
    /// are skipped. With `release_backing`, the mapped frames are released
    /// too.
    fn unmap(&mut self, page: VirtualPage<Size4K>, pages: u64, release_backing: bool);
}

/// What the fault handler needs from the faulting process.
pub trait Process {
    type Space: AddressSpace;

    /// The VMAs this process owns.
    fn vmas(&self) -> &VmaList;

    /// The page tables faults are resolved into.
    fn address_space(&mut self) -> &mut Self::Space;
}
