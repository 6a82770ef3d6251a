//! The kernel's VMA registry and fault entry point.

use crate::address_space::Process;
use crate::page_fault::FaultKind;
use crate::pager::{DemandPager, FaultError};
use crate::vma::{Vma, VmaHandle, VmaRegistry};
use kernel_alloc::phys_mapper::HhdmPhysMapper;
use kernel_info::memory::VMA_CAPACITY;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

static VMAS: VmaRegistry<VMA_CAPACITY> = VmaRegistry::new();

/// The registry shared by all processes.
#[inline]
pub fn vmas() -> &'static VmaRegistry<VMA_CAPACITY> {
    &VMAS
}

/// See [`VmaRegistry::allocate`]; halts when all slots are taken.
#[inline]
pub fn vma_allocate(vma: Vma) -> VmaHandle {
    VMAS.allocate(vma)
}

/// See [`VmaRegistry::release`].
#[inline]
pub fn vma_release(handle: VmaHandle) -> Option<Vma> {
    VMAS.release(handle)
}

/// Page-fault entry for the trap dispatcher, backed by the global frame
/// allocator and the HHDM.
///
/// # Errors
/// See [`DemandPager::handle_fault`].
pub fn handle_fault<P: Process>(
    process: &mut P,
    va: VirtualAddress,
    kind: FaultKind,
) -> Result<PhysicalPage<Size4K>, FaultError> {
    DemandPager::new(kernel_alloc::global::frames(), &HhdmPhysMapper, &VMAS)
        .handle_fault(process, va, kind)
}
