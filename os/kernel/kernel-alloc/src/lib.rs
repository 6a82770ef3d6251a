//! # Kernel Physical Memory Allocation
//!
//! Physical frames, and who owns them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          RefCountedFrameAlloc (frame_alloc)         │
//! │    • allocate / free / adjust_refcount              │
//! │    • LIFO free list under one SpinLock              │
//! └───────────┬───────────────────────────┬─────────────┘
//!             │                           │
//! ┌───────────▼─────────────┐ ┌───────────▼─────────────┐
//! │  FrameRefCount table    │ │   PhysMapper            │
//! │  (refcount)             │ │   (phys_mapper)         │
//! │  one atomic per frame   │ │   PA → usable pointer   │
//! └─────────────────────────┘ └─────────────────────────┘
//! ```
//!
//! A frame may be mapped by several address spaces at once (after a fork, or
//! while copy-on-write pages are still shared). Each mapping holds one
//! reference; the frame returns to the free list when the last one goes away.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::frame_alloc::{FrameRelease, RefCountedFrameAlloc};
//! use kernel_alloc::testing::TestRam;
//! use kernel_memory_addresses::PhysicalAddress;
//!
//! let ram = TestRam::new(0x8000_0000, 4);
//! let frames = RefCountedFrameAlloc::<_, 4>::new(ram);
//! frames.initialize(PhysicalAddress::new(0x8000_0000), PhysicalAddress::new(0x8000_4000));
//!
//! let frame = frames.allocate().unwrap();
//! frames.adjust_refcount(frame.base(), 1); // shared with a child
//! assert_eq!(frames.try_free(frame.base()), Ok(FrameRelease::Shared { remaining: 1 }));
//! assert_eq!(frames.try_free(frame.base()), Ok(FrameRelease::Reclaimed));
//! ```
//!
//! The kernel itself goes through the statics in [`global`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "test-support"))]
extern crate alloc;

pub mod frame_alloc;
mod free_list;
pub mod global;
pub mod phys_mapper;
pub mod refcount;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

/// Bytes in one frame.
pub const FRAME_BYTES: usize = Size4K::BYTES;

/// The contents of one frame, as seen through a [`PhysMapper`].
pub type FrameBytes = [u8; FRAME_BYTES];

/// Access physical memory from the current address space.
///
/// How a physical address becomes dereferenceable differs between the kernel
/// (higher-half direct map) and tests (a heap buffer standing in for RAM), so
/// everything that touches frame contents goes through this trait.
pub trait PhysMapper {
    /// Convert a physical address to a mutable reference.
    ///
    /// # Safety
    /// `pa` must be mapped, suitably aligned for `T`, and not aliased by any
    /// other live reference for `'a`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Source of 4 KiB frames.
pub trait FrameAlloc {
    /// A fresh frame with exactly one reference, or `None` if memory is exhausted.
    fn alloc_4k(&self) -> Option<PhysicalPage<Size4K>>;

    /// Drop one reference to `frame`.
    fn free_4k(&self, frame: PhysicalPage<Size4K>);
}

impl<A: FrameAlloc + ?Sized> FrameAlloc for &A {
    fn alloc_4k(&self) -> Option<PhysicalPage<Size4K>> {
        (**self).alloc_4k()
    }

    fn free_4k(&self, frame: PhysicalPage<Size4K>) {
        (**self).free_4k(frame);
    }
}
