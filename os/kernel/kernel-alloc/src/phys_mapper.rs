//! # HHDM-based [`PhysMapper`]
//!
//! With a higher-half direct map every physical address is visible at
//! `HHDM_BASE + pa`, so converting a frame address into something the kernel
//! can write through is a single addition.

use crate::PhysMapper;
use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// [`PhysMapper`] for kernels with a higher-half direct map.
///
/// # Safety
/// The HHDM must be installed and cover every physical address passed in.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

impl HhdmPhysMapper {
    /// Where `pa` appears in the direct map.
    #[inline]
    #[must_use]
    pub const fn virtual_address(pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(HHDM_BASE + pa.as_u64())
    }
}

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = Self::virtual_address(pa).as_u64() as *mut T;
        // SAFETY: Caller guarantees the address is covered by the HHDM and unaliased.
        unsafe { &mut *va }
    }
}
