//! # Memory Layout and Capacities

use kernel_memory_addresses::{PageSize, Size4K};

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Largest amount of physical memory the global frame allocator can manage.
///
/// The reference-count table is sized for this at compile time; a boot range
/// larger than this is rejected.
pub const MANAGED_MEMORY_BYTES: u64 = 128 * 1024 * 1024;

/// Number of reference-count slots in the global frame table.
#[allow(clippy::cast_possible_truncation)]
pub const MANAGED_FRAMES: usize = (MANAGED_MEMORY_BYTES >> Size4K::SHIFT) as usize;

/// Number of slots in the global VMA registry, shared by all processes.
pub const VMA_CAPACITY: usize = 100;

/// Byte pattern written over a frame when it is handed out.
pub const ALLOC_FILL_BYTE: u8 = 0x05;

/// Byte pattern written over a frame when its last reference goes away.
pub const FREE_FILL_BYTE: u8 = 0x01;

const _: () = {
    assert!(MANAGED_MEMORY_BYTES.is_multiple_of(Size4K::SIZE));
    // Frame indices are stored as u32 in the free list.
    assert!(MANAGED_FRAMES < u32::MAX as usize);
    assert!(VMA_CAPACITY > 0);
    // Canonical higher half.
    assert!(HHDM_BASE >= 0xffff_8000_0000_0000);
    assert!(ALLOC_FILL_BYTE != 0 && FREE_FILL_BYTE != 0);
};
