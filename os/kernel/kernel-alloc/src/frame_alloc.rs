//! Reference-counted physical frame allocator.
//!
//! Frames in the managed range cycle through
//!
//! ```text
//!            allocate()                adjust_refcount(+1)   (fork/COW sharing)
//!   free ───────────────► count = 1 ──────────────────────► count = n
//!    ▲                        │    ◄──────────────────────     │
//!    │     reclaim             │       free / adjust(-1)        │
//!    └──────────── count = 0 ◄─┴───────────────────────────────┘
//! ```
//!
//! A frame is on the free list **iff** its count is zero. Only the transition
//! that drops the count to zero puts it back, so a frame shared by several
//! address spaces survives until the last of them lets go.
//!
//! ## Locking
//! Per-frame counts are atomics (see [`refcount`](crate::refcount)); the free
//! list sits behind one [`SpinLock`] that is held only for the O(1) splice.
//! The count is always settled before the list lock is taken, never the other
//! way around, and no path touches two counts at once.
//!
//! ## Fatal misuse
//! Addresses that are misaligned or outside the managed range, and counts
//! that would go negative, mean the bookkeeping can no longer be trusted. The
//! plain operations halt the kernel in that case; the `try_` variants report
//! the [`FrameError`] instead.

use crate::free_list::FreeList;
use crate::refcount::{FrameRefCount, RefCountError};
use crate::{FrameAlloc, FrameBytes, PhysMapper};
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use kernel_memory_addresses::{PageSize, PhysicalAddress, PhysicalPage, Size4K};
use kernel_sync::SpinLock;
use log::{error, info, trace};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("frame address {0} is not page aligned")]
    Misaligned(PhysicalAddress),
    #[error("frame address {0} is outside the managed range")]
    OutOfRange(PhysicalAddress),
    #[error("frame {frame}: {source}")]
    RefCount {
        frame: PhysicalAddress,
        source: RefCountError,
    },
    #[error("range {start}..{end} holds no whole frame")]
    EmptyRange {
        start: PhysicalAddress,
        end: PhysicalAddress,
    },
    #[error("range {start}..{end} spans {frames} frames but the table has {capacity}")]
    RangeTooLarge {
        start: PhysicalAddress,
        end: PhysicalAddress,
        frames: u64,
        capacity: usize,
    },
    #[error("frame allocator is already initialized")]
    AlreadyInitialized,
}

/// What a successful release did to the frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameRelease {
    /// Other mappings still reference the frame.
    Shared { remaining: u32 },
    /// The last reference went away; the frame is back on the free list.
    Reclaimed,
}

/// Physical frame allocator with one reference count per frame.
///
/// `N` is the capacity of the reference-count table; the range passed to
/// [`initialize`](Self::initialize) may use at most `N` frames. `M` gives the
/// allocator access to frame contents for the diagnostic fill patterns.
///
/// All operations take `&self` and may be called concurrently from any CPU.
pub struct RefCountedFrameAlloc<M, const N: usize> {
    mapper: M,
    initialized: AtomicBool,
    /// First managed frame; meaningful once `frames` is non-zero.
    start: AtomicU64,
    /// Number of managed frames; zero before initialization.
    frames: AtomicUsize,
    refcounts: [FrameRefCount; N],
    free: SpinLock<FreeList<N>>,
}

impl<M, const N: usize> RefCountedFrameAlloc<M, N> {
    /// An allocator managing nothing yet. `const` so it can live in a `static`.
    pub const fn new(mapper: M) -> Self {
        Self {
            mapper,
            initialized: AtomicBool::new(false),
            start: AtomicU64::new(0),
            frames: AtomicUsize::new(0),
            refcounts: [const { FrameRefCount::new() }; N],
            free: SpinLock::new(FreeList::new()),
        }
    }

    /// The mapper used to reach frame contents.
    #[inline]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Capacity of the reference-count table.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of managed frames (zero before initialization).
    #[inline]
    pub fn total_frames(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    /// Number of frames currently on the free list.
    pub fn free_frames(&self) -> usize {
        self.free.lock().len()
    }

    /// The managed range `[start, end)`, if initialized.
    pub fn managed_range(&self) -> Option<(PhysicalAddress, PhysicalAddress)> {
        let frames = self.total_frames();
        if frames == 0 {
            return None;
        }
        let start = PhysicalAddress::new(self.start.load(Ordering::Acquire));
        Some((start, start + frames as u64 * Size4K::SIZE))
    }

    /// Table index of the frame containing `pa`.
    fn index_of(&self, pa: PhysicalAddress) -> Result<usize, FrameError> {
        let frames = self.total_frames();
        let start = PhysicalAddress::new(self.start.load(Ordering::Acquire));
        let index = pa
            .checked_offset_from(start)
            .and_then(|offset| usize::try_from(offset >> Size4K::SHIFT).ok())
            .filter(|&index| index < frames)
            .ok_or(FrameError::OutOfRange(pa))?;
        Ok(index)
    }

    fn frame_at(&self, index: usize) -> PhysicalPage<Size4K> {
        let start = PhysicalAddress::new(self.start.load(Ordering::Acquire));
        (start + index as u64 * Size4K::SIZE).page()
    }
}

impl<M: PhysMapper, const N: usize> RefCountedFrameAlloc<M, N> {
    /// Take ownership of every whole frame in `[start, end)` and put it on
    /// the free list. Returns the number of frames now managed.
    ///
    /// One-time boot step. Each frame's count is seeded to 1 and then
    /// released, so the frames enter the free list through the same
    /// reclamation path as any other free.
    pub fn initialize(&self, start: PhysicalAddress, end: PhysicalAddress) -> usize {
        self.try_initialize(start, end).unwrap_or_else(|err| halt(err))
    }

    /// Fallible [`initialize`](Self::initialize).
    ///
    /// # Errors
    /// The range holds no whole frame, exceeds the table, or the allocator
    /// was already initialized.
    pub fn try_initialize(
        &self,
        start: PhysicalAddress,
        end: PhysicalAddress,
    ) -> Result<usize, FrameError> {
        let first = start
            .checked_align_up::<Size4K>()
            .ok_or(FrameError::EmptyRange { start, end })?;
        let last = end.align_down::<Size4K>();
        let frames = last
            .checked_offset_from(first)
            .map(|bytes| bytes >> Size4K::SHIFT)
            .filter(|&frames| frames > 0)
            .ok_or(FrameError::EmptyRange { start, end })?;
        let count = usize::try_from(frames)
            .ok()
            .filter(|&count| count <= N)
            .ok_or(FrameError::RangeTooLarge {
                start,
                end,
                frames,
                capacity: N,
            })?;

        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(FrameError::AlreadyInitialized);
        }

        self.start.store(first.as_u64(), Ordering::Release);
        for refcount in &self.refcounts[..count] {
            refcount.set(1);
        }
        self.frames.store(count, Ordering::Release);

        for index in 0..count {
            self.release(self.frame_at(index).base())?;
        }

        info!(
            "frame allocator: managing {count} frames in {first}..{last} ({} KiB)",
            count as u64 * Size4K::SIZE / 1024
        );
        Ok(count)
    }

    /// Hand out one frame with a reference count of exactly 1.
    ///
    /// Returns `None` when no frame is free; there is no waiting or retry.
    pub fn allocate(&self) -> Option<PhysicalPage<Size4K>> {
        let index = self.free.lock().pop()?;
        let frame = self.frame_at(index);
        self.scribble(frame, kernel_info::memory::ALLOC_FILL_BYTE);
        self.refcounts[index].set(1);
        trace!("frame allocator: allocated {frame}");
        Some(frame)
    }

    /// Drop one reference to the frame at `pa`, reclaiming it when that was
    /// the last one.
    ///
    /// Halts the kernel if `pa` is misaligned, outside the managed range, or
    /// the frame has no references left (double free).
    pub fn free(&self, pa: PhysicalAddress) {
        if let Err(err) = self.try_free(pa) {
            halt(err);
        }
    }

    /// Fallible [`free`](Self::free).
    ///
    /// # Errors
    /// See [`FrameError`]; on error nothing was changed.
    pub fn try_free(&self, pa: PhysicalAddress) -> Result<FrameRelease, FrameError> {
        if !pa.is_aligned::<Size4K>() {
            return Err(FrameError::Misaligned(pa));
        }
        self.release(pa)
    }

    /// Atomically add `delta` to the reference count of the frame containing
    /// `pa` and return the new count.
    ///
    /// Sharing paths (fork, COW) call this with `+1` *before* the new mapping
    /// becomes visible; teardown paths call it with `-1`. Reaching zero
    /// reclaims the frame exactly like [`free`](Self::free).
    ///
    /// Halts the kernel if `pa` is outside the managed range or the count
    /// would go negative.
    pub fn adjust_refcount(&self, pa: PhysicalAddress, delta: i32) -> u32 {
        self.try_adjust_refcount(pa, delta)
            .unwrap_or_else(|err| halt(err))
    }

    /// Fallible [`adjust_refcount`](Self::adjust_refcount).
    ///
    /// # Errors
    /// See [`FrameError`]; on error nothing was changed.
    pub fn try_adjust_refcount(&self, pa: PhysicalAddress, delta: i32) -> Result<u32, FrameError> {
        let index = self.index_of(pa)?;
        let change = self.refcounts[index]
            .adjust(delta)
            .map_err(|source| FrameError::RefCount { frame: pa, source })?;
        if change.reached_zero() {
            self.reclaim(index);
        }
        Ok(change.current)
    }

    /// Snapshot of the frame's reference count, `None` outside the managed
    /// range. Diagnostic only: the value may be stale by the time it returns.
    pub fn refcount(&self, pa: PhysicalAddress) -> Option<u32> {
        let index = self.index_of(pa).ok()?;
        Some(self.refcounts[index].get())
    }

    fn release(&self, pa: PhysicalAddress) -> Result<FrameRelease, FrameError> {
        match self.try_adjust_refcount(pa, -1)? {
            0 => Ok(FrameRelease::Reclaimed),
            remaining => Ok(FrameRelease::Shared { remaining }),
        }
    }

    /// Put a frame whose count just reached zero back on the free list.
    fn reclaim(&self, index: usize) {
        let frame = self.frame_at(index);
        self.scribble(frame, kernel_info::memory::FREE_FILL_BYTE);
        self.free.lock().push(index);
        trace!("frame allocator: reclaimed {frame}");
    }

    #[cfg(feature = "junk-fill")]
    fn scribble(&self, frame: PhysicalPage<Size4K>, byte: u8) {
        // SAFETY: the frame is managed by us and currently owned by nobody else.
        let bytes = unsafe { self.mapper.phys_to_mut::<FrameBytes>(frame.base()) };
        bytes.fill(byte);
    }

    #[cfg(not(feature = "junk-fill"))]
    #[inline(always)]
    fn scribble(&self, _frame: PhysicalPage<Size4K>, _byte: u8) {}
}

impl<M: PhysMapper, const N: usize> FrameAlloc for RefCountedFrameAlloc<M, N> {
    fn alloc_4k(&self) -> Option<PhysicalPage<Size4K>> {
        self.allocate()
    }

    fn free_4k(&self, frame: PhysicalPage<Size4K>) {
        self.free(frame.base());
    }
}

/// Bookkeeping is broken; nothing that follows can be trusted.
#[cold]
#[track_caller]
fn halt(err: FrameError) -> ! {
    error!("frame allocator: {err}");
    panic!("frame allocator: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestRam;

    const BASE: u64 = 0x8000_0000;

    fn allocator<const N: usize>(frames: usize) -> RefCountedFrameAlloc<TestRam, N> {
        let alloc = RefCountedFrameAlloc::<_, N>::new(TestRam::new(BASE, frames));
        let end = PhysicalAddress::new(BASE + frames as u64 * Size4K::SIZE);
        assert_eq!(alloc.initialize(PhysicalAddress::new(BASE), end), frames);
        alloc
    }

    #[test]
    fn initialize_puts_every_frame_on_the_free_list() {
        let alloc = allocator::<16>(16);
        assert_eq!(alloc.total_frames(), 16);
        assert_eq!(alloc.free_frames(), 16);
        for i in 0..16 {
            let pa = PhysicalAddress::new(BASE + i * Size4K::SIZE);
            assert_eq!(alloc.refcount(pa), Some(0));
        }
        assert_eq!(
            alloc.managed_range(),
            Some((
                PhysicalAddress::new(BASE),
                PhysicalAddress::new(BASE + 16 * Size4K::SIZE)
            ))
        );
    }

    #[test]
    fn initialize_trims_partial_frames() {
        let alloc = RefCountedFrameAlloc::<_, 8>::new(TestRam::new(BASE, 8));
        let start = PhysicalAddress::new(BASE + 0x10);
        let end = PhysicalAddress::new(BASE + 4 * Size4K::SIZE + 0x800);
        assert_eq!(alloc.try_initialize(start, end), Ok(3));
        assert_eq!(
            alloc.managed_range().unwrap().0,
            PhysicalAddress::new(BASE + Size4K::SIZE)
        );
    }

    #[test]
    fn initialize_rejects_bad_ranges() {
        let alloc = RefCountedFrameAlloc::<_, 4>::new(TestRam::new(BASE, 8));
        let base = PhysicalAddress::new(BASE);

        assert!(matches!(
            alloc.try_initialize(base, base + 0x800),
            Err(FrameError::EmptyRange { .. })
        ));
        assert!(matches!(
            alloc.try_initialize(base, base + 8 * Size4K::SIZE),
            Err(FrameError::RangeTooLarge { frames: 8, capacity: 4, .. })
        ));
        assert_eq!(alloc.total_frames(), 0);

        assert_eq!(alloc.try_initialize(base, base + 4 * Size4K::SIZE), Ok(4));
        assert_eq!(
            alloc.try_initialize(base, base + 4 * Size4K::SIZE),
            Err(FrameError::AlreadyInitialized)
        );
    }

    #[test]
    fn allocated_frames_start_with_refcount_one() {
        let alloc = allocator::<8>(8);
        let frame = alloc.allocate().unwrap();
        assert_eq!(alloc.refcount(frame.base()), Some(1));
        assert_eq!(alloc.free_frames(), 7);
    }

    #[test]
    fn live_allocations_are_distinct_and_exhaustion_returns_none() {
        let alloc = allocator::<8>(8);
        let mut frames: Vec<_> = core::iter::from_fn(|| alloc.allocate()).collect();
        assert_eq!(frames.len(), 8);
        assert!(alloc.allocate().is_none());

        frames.sort();
        frames.dedup();
        assert_eq!(frames.len(), 8);
    }

    #[test]
    fn free_list_is_lifo() {
        let alloc = allocator::<8>(8);
        let a = alloc.allocate().unwrap();
        let b = alloc.allocate().unwrap();
        alloc.free(a.base());
        alloc.free(b.base());
        assert_eq!(alloc.allocate(), Some(b));
        assert_eq!(alloc.allocate(), Some(a));
    }

    #[test]
    fn shared_frame_is_reclaimed_only_by_the_last_release() {
        let alloc = allocator::<8>(8);
        let frame = alloc.allocate().unwrap();
        let pa = frame.base();
        assert_eq!(alloc.adjust_refcount(pa, 1), 2);
        assert_eq!(alloc.adjust_refcount(pa, 1), 3);
        let free_before = alloc.free_frames();

        assert_eq!(alloc.try_free(pa), Ok(FrameRelease::Shared { remaining: 2 }));
        assert_eq!(alloc.try_free(pa), Ok(FrameRelease::Shared { remaining: 1 }));
        assert_eq!(alloc.free_frames(), free_before);

        assert_eq!(alloc.try_free(pa), Ok(FrameRelease::Reclaimed));
        assert_eq!(alloc.free_frames(), free_before + 1);
        assert_eq!(alloc.refcount(pa), Some(0));
    }

    #[test]
    fn adjusting_down_to_zero_reclaims_once() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        alloc.adjust_refcount(pa, 2);
        let free_before = alloc.free_frames();

        assert_eq!(alloc.adjust_refcount(pa, -2), 1);
        assert_eq!(alloc.free_frames(), free_before);
        assert_eq!(alloc.adjust_refcount(pa, -1), 0);
        assert_eq!(alloc.free_frames(), free_before + 1);
    }

    #[test]
    fn adjust_accepts_addresses_inside_a_frame() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        assert_eq!(alloc.adjust_refcount(pa + 0x123, 1), 2);
        assert_eq!(alloc.adjust_refcount(pa, 0), 2);
    }

    #[test]
    fn misuse_is_reported_without_side_effects() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        let free_before = alloc.free_frames();

        assert_eq!(alloc.try_free(pa + 8), Err(FrameError::Misaligned(pa + 8)));
        let below = PhysicalAddress::new(BASE - Size4K::SIZE);
        assert_eq!(alloc.try_free(below), Err(FrameError::OutOfRange(below)));
        let above = PhysicalAddress::new(BASE + 8 * Size4K::SIZE);
        assert_eq!(alloc.try_free(above), Err(FrameError::OutOfRange(above)));
        assert_eq!(
            alloc.try_adjust_refcount(above, 1),
            Err(FrameError::OutOfRange(above))
        );

        assert_eq!(alloc.free_frames(), free_before);
        assert_eq!(alloc.refcount(pa), Some(1));
    }

    #[test]
    fn double_free_is_detected() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        alloc.free(pa);
        let free_before = alloc.free_frames();
        assert!(matches!(
            alloc.try_free(pa),
            Err(FrameError::RefCount {
                source: RefCountError::Underflow { current: 0, by: 1 },
                ..
            })
        ));
        assert_eq!(alloc.free_frames(), free_before);
    }

    #[test]
    fn sharing_a_free_frame_is_rejected() {
        let alloc = allocator::<8>(8);
        let pa = PhysicalAddress::new(BASE);
        assert!(matches!(
            alloc.try_adjust_refcount(pa, 1),
            Err(FrameError::RefCount {
                source: RefCountError::Unowned,
                ..
            })
        ));
    }

    #[test]
    #[should_panic(expected = "not page aligned")]
    fn free_of_misaligned_address_halts() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        alloc.free(pa + 1);
    }

    #[test]
    #[should_panic(expected = "outside the managed range")]
    fn free_outside_range_halts() {
        let alloc = allocator::<8>(8);
        alloc.free(PhysicalAddress::new(BASE + 64 * Size4K::SIZE));
    }

    #[test]
    #[should_panic(expected = "cannot drop by 1")]
    fn double_free_halts() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        alloc.free(pa);
        alloc.free(pa);
    }

    #[test]
    #[should_panic(expected = "cannot drop by 3")]
    fn negative_adjust_halts() {
        let alloc = allocator::<8>(8);
        let pa = alloc.allocate().unwrap().base();
        alloc.adjust_refcount(pa, -3);
    }

    #[test]
    #[should_panic(expected = "outside the managed range")]
    fn operations_before_initialize_halt() {
        let alloc = RefCountedFrameAlloc::<_, 8>::new(TestRam::new(BASE, 8));
        alloc.adjust_refcount(PhysicalAddress::new(BASE), 1);
    }

    #[cfg(feature = "junk-fill")]
    #[test]
    fn reused_frame_never_shows_previous_contents() {
        use kernel_info::memory::{ALLOC_FILL_BYTE, FREE_FILL_BYTE};

        let alloc = allocator::<4>(4);
        let frame = alloc.allocate().unwrap();
        assert!(alloc.mapper().frame(frame).iter().all(|&b| b == ALLOC_FILL_BYTE));

        alloc.mapper().frame_mut(frame).fill(0xAB);
        alloc.free(frame.base());
        assert!(alloc.mapper().frame(frame).iter().all(|&b| b == FREE_FILL_BYTE));

        let again = alloc.allocate().unwrap();
        assert_eq!(again, frame);
        assert!(alloc.mapper().frame(again).iter().all(|&b| b == ALLOC_FILL_BYTE));
    }

    #[cfg(feature = "junk-fill")]
    #[test]
    fn shared_release_leaves_contents_alone() {
        let alloc = allocator::<4>(4);
        let frame = alloc.allocate().unwrap();
        alloc.mapper().frame_mut(frame).fill(0x42);
        alloc.adjust_refcount(frame.base(), 1);
        alloc.free(frame.base());
        assert!(alloc.mapper().frame(frame).iter().all(|&b| b == 0x42));
    }
}
