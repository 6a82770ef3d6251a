//! The kernel's frame allocator.
//!
//! One process-wide [`RefCountedFrameAlloc`] reaching frame contents through
//! the HHDM. It manages nothing until [`initialize`] has run during boot.

use crate::frame_alloc::RefCountedFrameAlloc;
use crate::phys_mapper::HhdmPhysMapper;
use kernel_info::memory::MANAGED_FRAMES;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// The global allocator type.
pub type KernelFrameAlloc = RefCountedFrameAlloc<HhdmPhysMapper, MANAGED_FRAMES>;

static FRAMES: KernelFrameAlloc = RefCountedFrameAlloc::new(HhdmPhysMapper);

/// The global allocator, for code that is generic over [`FrameAlloc`](crate::FrameAlloc).
#[inline]
pub fn frames() -> &'static KernelFrameAlloc {
    &FRAMES
}

/// Hand the physical range `[start, end)` to the allocator. Boot only; a
/// second call halts.
pub fn initialize(start: PhysicalAddress, end: PhysicalAddress) -> usize {
    FRAMES.initialize(start, end)
}

/// See [`RefCountedFrameAlloc::allocate`].
#[inline]
pub fn allocate() -> Option<PhysicalPage<Size4K>> {
    FRAMES.allocate()
}

/// See [`RefCountedFrameAlloc::free`].
#[inline]
pub fn free(pa: PhysicalAddress) {
    FRAMES.free(pa);
}

/// See [`RefCountedFrameAlloc::adjust_refcount`].
#[inline]
pub fn adjust_refcount(pa: PhysicalAddress, delta: i32) -> u32 {
    FRAMES.adjust_refcount(pa, delta)
}
