use kernel_alloc::FrameAlloc;
use kernel_alloc::frame_alloc::{FrameError, FrameRelease, RefCountedFrameAlloc};
use kernel_alloc::testing::TestRam;
use kernel_memory_addresses::PhysicalAddress;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const BASE: u64 = 0x4000_0000;
const FRAMES: usize = 64;

fn allocator() -> Arc<RefCountedFrameAlloc<TestRam, FRAMES>> {
    let ram = TestRam::new(BASE, FRAMES);
    let (start, end) = (ram.start(), ram.end());
    let alloc = RefCountedFrameAlloc::new(ram);
    alloc.initialize(start, end);
    Arc::new(alloc)
}

#[test]
fn fork_then_exit_reclaims_once() {
    let alloc = allocator();
    let parent: Vec<_> = (0..8).map(|_| alloc.allocate().unwrap()).collect();

    // fork: the child shares every frame
    for frame in &parent {
        assert_eq!(alloc.adjust_refcount(frame.base(), 1), 2);
    }
    let after_fork = alloc.free_frames();

    // parent exits
    for frame in &parent {
        assert_eq!(
            alloc.try_free(frame.base()),
            Ok(FrameRelease::Shared { remaining: 1 })
        );
    }
    assert_eq!(alloc.free_frames(), after_fork);

    // child exits
    for frame in &parent {
        assert_eq!(alloc.try_free(frame.base()), Ok(FrameRelease::Reclaimed));
    }
    assert_eq!(alloc.free_frames(), FRAMES);
}

#[test]
fn concurrent_sharers_never_underflow_or_double_reclaim() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 2_000;

    let alloc = allocator();
    let frame = alloc.allocate().unwrap();
    let pa = frame.base();
    let free_before = alloc.free_frames();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    // The owner's reference keeps the count >= 1 throughout.
                    assert!(alloc.adjust_refcount(pa, 1) >= 2);
                    assert!(alloc.adjust_refcount(pa, -1) >= 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(alloc.refcount(pa), Some(1));
    assert_eq!(alloc.free_frames(), free_before);
    alloc.free(pa);
    assert_eq!(alloc.free_frames(), free_before + 1);
}

#[test]
fn racing_last_references_reclaim_exactly_once() {
    const SHARERS: u32 = 16;

    let alloc = allocator();
    let frame = alloc.allocate().unwrap();
    let pa = frame.base();
    alloc.adjust_refcount(pa, i32::try_from(SHARERS - 1).unwrap());
    let free_before = alloc.free_frames();

    let reclaimed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(SHARERS as usize));
    let handles: Vec<_> = (0..SHARERS)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            let barrier = Arc::clone(&barrier);
            let reclaimed = Arc::clone(&reclaimed);
            thread::spawn(move || {
                barrier.wait();
                if alloc.try_free(pa) == Ok(FrameRelease::Reclaimed) {
                    reclaimed.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(reclaimed.load(Ordering::Relaxed), 1);
    assert_eq!(alloc.free_frames(), free_before + 1);
    assert!(matches!(alloc.try_free(pa), Err(FrameError::RefCount { .. })));
}

#[test]
fn concurrent_allocations_are_distinct() {
    const THREADS: usize = 4;

    let alloc = allocator();
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                core::iter::from_fn(|| alloc.alloc_4k()).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for frame in h.join().unwrap() {
            assert!(seen.insert(frame), "{frame} handed out twice");
        }
    }
    assert_eq!(seen.len(), FRAMES);
    assert_eq!(alloc.free_frames(), 0);

    for frame in seen {
        alloc.free_4k(frame);
    }
    assert_eq!(alloc.free_frames(), FRAMES);
}

#[test]
#[should_panic(expected = "outside the managed range")]
fn adjusting_a_foreign_frame_halts() {
    let alloc = allocator();
    alloc.adjust_refcount(PhysicalAddress::new(BASE - 0x1000), 1);
}
