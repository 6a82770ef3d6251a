#![allow(dead_code)]

use kernel_alloc::frame_alloc::RefCountedFrameAlloc;
use kernel_alloc::testing::TestRam;
use kernel_memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress, VirtualPage};
use kernel_sync::{RawSleep, Waiter};
use kernel_vmem::{
    AddressSpace, BackingFile, FileReadError, MapError, PagePermissions, Process, Vma,
    VmaList, VmaRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

pub const RAM_BASE: u64 = 0x8000_0000;

pub fn frames<const N: usize>(count: usize) -> RefCountedFrameAlloc<TestRam, N> {
    let ram = TestRam::new(RAM_BASE, count);
    let (start, end) = (ram.start(), ram.end());
    let alloc = RefCountedFrameAlloc::new(ram);
    alloc.initialize(start, end);
    alloc
}

/// Yields the thread while a file's content lock is contended.
pub struct YieldWaiter;

impl Waiter for YieldWaiter {
    fn wait(_still_held: &dyn Fn() -> bool) {
        thread::yield_now();
    }

    fn wake_all() {}
}

/// File contents in memory, with a sleeping content lock.
pub struct MemFile {
    lock: RawSleep<YieldWaiter>,
    data: Vec<u8>,
    fail: bool,
    pub reads: AtomicUsize,
    pub locks: AtomicUsize,
}

impl MemFile {
    /// A file of `len` bytes where byte `i` is `(i / 4096 + i) as u8`,
    /// so every page has distinct contents.
    pub fn patterned(len: usize) -> &'static Self {
        let data = (0..len).map(|i| (i / 4096 + i) as u8).collect();
        Self::leak(data, false)
    }

    pub fn failing() -> &'static Self {
        Self::leak(vec![0xEE; 3 * 4096], true)
    }

    fn leak(data: Vec<u8>, fail: bool) -> &'static Self {
        Box::leak(Box::new(Self {
            lock: RawSleep::new(),
            data,
            fail,
            reads: AtomicUsize::new(0),
            locks: AtomicUsize::new(0),
        }))
    }

    pub fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl BackingFile for MemFile {
    fn lock(&self) {
        self.lock.lock();
        self.locks.fetch_add(1, Ordering::Relaxed);
    }

    unsafe fn unlock(&self) {
        unsafe { self.lock.unlock() };
    }

    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<usize, FileReadError> {
        assert!(self.lock.is_locked(), "read without the content lock");
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(FileReadError::Io { offset });
        }
        let start = usize::try_from(offset).unwrap().min(self.data.len());
        let n = dest.len().min(self.data.len() - start);
        dest[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Mapping {
    pub page: VirtualPage<Size4K>,
    pub len: u64,
    pub pa: PhysicalAddress,
    pub permissions: PagePermissions,
}

/// Records what the pager asks of the page tables. Like real page tables,
/// it refuses to map a page twice.
#[derive(Debug, Default)]
pub struct RecordingSpace {
    pub mapped: Vec<Mapping>,
    pub unmapped: Vec<(VirtualPage<Size4K>, u64, bool)>,
    /// Fail the next `map` after recording a partial mapping.
    pub fail_with: Option<MapError>,
}

impl RecordingSpace {
    pub fn is_mapped(&self, page: VirtualPage<Size4K>) -> bool {
        self.mapped.iter().any(|m| m.page == page)
    }
}

impl AddressSpace for RecordingSpace {
    fn map(
        &mut self,
        page: VirtualPage<Size4K>,
        len: u64,
        pa: PhysicalAddress,
        permissions: PagePermissions,
    ) -> Result<(), MapError> {
        if self.is_mapped(page) {
            return Err(MapError::AlreadyMapped(page.base()));
        }
        self.mapped.push(Mapping {
            page,
            len,
            pa,
            permissions,
        });
        match self.fail_with.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn unmap(&mut self, page: VirtualPage<Size4K>, pages: u64, release_backing: bool) {
        self.mapped.retain(|m| m.page != page);
        self.unmapped.push((page, pages, release_backing));
    }
}

#[derive(Default)]
pub struct TestProcess {
    pub vmas: VmaList,
    pub space: RecordingSpace,
}

impl TestProcess {
    /// Give this process a VMA of `pages` pages at `start` backed by `file`.
    pub fn mmap<const N: usize>(
        &mut self,
        registry: &VmaRegistry<N>,
        start: u64,
        pages: u64,
        permissions: PagePermissions,
        file: &'static dyn BackingFile,
    ) {
        let vma = Vma::new(
            VirtualAddress::new(start),
            VirtualAddress::new(start + pages * Size4K::SIZE),
            permissions,
            file,
        )
        .unwrap();
        self.vmas.attach(registry.allocate(vma));
    }
}

impl Process for TestProcess {
    type Space = RecordingSpace;

    fn vmas(&self) -> &VmaList {
        &self.vmas
    }

    fn address_space(&mut self) -> &mut RecordingSpace {
        &mut self.space
    }
}
