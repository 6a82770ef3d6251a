//! Hosted stand-ins for physical memory.

use crate::{FRAME_BYTES, FrameBytes, PhysMapper};
use alloc::boxed::Box;
use core::cell::UnsafeCell;
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};

#[repr(C, align(4096))]
struct Frame(UnsafeCell<FrameBytes>);

/// A run of heap-backed, 4 KiB aligned frames posing as physical RAM at
/// `base..base + frames * 4096`.
///
/// Frame contents are reachable through [`PhysMapper`] like real memory, so
/// they can be inspected after the code under test wrote to them.
pub struct TestRam {
    base: u64,
    frames: Box<[Frame]>,
}

// SAFETY: Access is coordinated by the code under test, exactly as with real RAM.
unsafe impl Sync for TestRam {}
// SAFETY: See above.
unsafe impl Send for TestRam {}

impl TestRam {
    /// `frames` zeroed frames starting at physical address `base`.
    ///
    /// # Panics
    /// If `base` is not page aligned.
    #[must_use]
    pub fn new(base: u64, frames: usize) -> Self {
        assert!(
            PhysicalAddress::new(base).is_aligned::<Size4K>(),
            "test RAM base must be page aligned"
        );
        let frames = (0..frames)
            .map(|_| Frame(UnsafeCell::new([0; FRAME_BYTES])))
            .collect();
        Self { base, frames }
    }

    /// First physical address backed by this RAM.
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// One past the last physical address backed by this RAM.
    #[must_use]
    pub fn end(&self) -> PhysicalAddress {
        self.start() + self.frames.len() as u64 * Size4K::SIZE
    }

    /// Snapshot of a frame's contents.
    ///
    /// # Panics
    /// If the frame is not backed by this RAM.
    #[must_use]
    pub fn frame(&self, frame: PhysicalPage<Size4K>) -> FrameBytes {
        // SAFETY: Tests only read frames nobody is writing concurrently.
        unsafe { *self.slot(frame.base()).get() }
    }

    /// Mutable view of a frame's contents, for seeding data.
    ///
    /// # Panics
    /// If the frame is not backed by this RAM.
    #[allow(clippy::mut_from_ref)]
    #[must_use]
    pub fn frame_mut(&self, frame: PhysicalPage<Size4K>) -> &mut FrameBytes {
        // SAFETY: Tests hold at most one view per frame at a time.
        unsafe { &mut *self.slot(frame.base()).get() }
    }

    fn slot(&self, pa: PhysicalAddress) -> &UnsafeCell<FrameBytes> {
        let index = pa
            .checked_offset_from(self.start())
            .and_then(|offset| usize::try_from(offset >> Size4K::SHIFT).ok())
            .filter(|&index| index < self.frames.len())
            .unwrap_or_else(|| panic!("{pa} is not backed by test RAM"));
        &self.frames[index].0
    }
}

impl PhysMapper for TestRam {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        #[allow(clippy::cast_possible_truncation)]
        let offset = pa.as_u64() as usize % FRAME_BYTES;
        assert!(
            offset + size_of::<T>() <= FRAME_BYTES,
            "access at {pa} crosses a frame boundary"
        );
        let frame = self.slot(pa).get().cast::<u8>();
        // SAFETY: In bounds of one frame; aliasing is the caller's contract.
        unsafe { &mut *frame.add(offset).cast::<T>() }
    }
}
