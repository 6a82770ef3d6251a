//! # Demand paging of file-backed VMAs
//!
//! VMAs are created without any frames behind them. The first access to a
//! page faults, and [`DemandPager::handle_fault`] materializes it:
//!
//! ```text
//!  fault(va, kind)
//!     │
//!     ├─ VMA containing va in the process's list? ── no ──► NoMapping
//!     ├─ kind allowed by the VMA's permissions?   ── no ──► Protection
//!     ├─ frame = alloc_4k()                       ── none ─► OutOfMemory
//!     ├─ zero the frame
//!     ├─ map page(va) → frame, permissions + x + u ─ err ─► unmap, free, MapFailed
//!     └─ lock file; read one page at page(va) - vma.start; unlock
//! ```
//!
//! A page that is already mapped (another thread of the process won the
//! race for it) is left alone: only the frame taken for this fault goes
//! back, and the error carries [`MapError::AlreadyMapped`].
//!
//! Everything up to the permission check leaves no trace. Reading the file
//! is best effort: a failed or short read leaves the rest of the page zeroed
//! and the fault still succeeds.
//!
//! Failures are reported to the trap dispatcher, which decides the fate of
//! the faulting process. Nothing is retried here.

use crate::address_space::{AddressSpace, MapError, Process};
use crate::backing_file::ContentGuard;
use crate::page_fault::FaultKind;
use crate::vma::VmaRegistry;
use crate::vma_list::VmaHit;
use crate::PagePermissions;
use kernel_alloc::{FRAME_BYTES, FrameAlloc, FrameBytes, PhysMapper};
use kernel_memory_addresses::{PageSize, PhysicalPage, Size4K, VirtualAddress};
use log::{trace, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FaultError {
    #[error("no VMA covers {0}")]
    NoMapping(VirtualAddress),
    #[error("{kind} access to {va} not permitted ({permissions})")]
    Protection {
        va: VirtualAddress,
        kind: FaultKind,
        permissions: PagePermissions,
    },
    #[error("out of memory paging in {0}")]
    OutOfMemory(VirtualAddress),
    #[error("failed to map {va}: {source}")]
    MapFailed {
        va: VirtualAddress,
        source: MapError,
    },
}

/// Resolves page faults in file-backed VMAs.
pub struct DemandPager<'a, A, M, const N: usize> {
    frames: &'a A,
    mapper: &'a M,
    vmas: &'a VmaRegistry<N>,
}

impl<'a, A, M, const N: usize> DemandPager<'a, A, M, N>
where
    A: FrameAlloc,
    M: PhysMapper,
{
    pub const fn new(frames: &'a A, mapper: &'a M, vmas: &'a VmaRegistry<N>) -> Self {
        Self {
            frames,
            mapper,
            vmas,
        }
    }

    /// Materialize the page containing `va` in `process`. Returns the frame
    /// now mapped there.
    ///
    /// # Errors
    /// See [`FaultError`]. On error the process's page tables are unchanged
    /// and no frame has been consumed.
    pub fn handle_fault<P: Process>(
        &self,
        process: &mut P,
        va: VirtualAddress,
        kind: FaultKind,
    ) -> Result<PhysicalPage<Size4K>, FaultError> {
        let result = self.page_in(process, va, kind);
        if let Err(err) = &result {
            warn!("page fault: {err}");
        }
        result
    }

    fn page_in<P: Process>(
        &self,
        process: &mut P,
        va: VirtualAddress,
        kind: FaultKind,
    ) -> Result<PhysicalPage<Size4K>, FaultError> {
        let VmaHit {
            handle,
            vma,
            offset,
        } = process
            .vmas()
            .find(self.vmas, va)
            .ok_or(FaultError::NoMapping(va))?;

        let permissions = vma.permissions();
        if !permissions.allows(kind) {
            return Err(FaultError::Protection {
                va,
                kind,
                permissions,
            });
        }

        let frame = self.frames.alloc_4k().ok_or(FaultError::OutOfMemory(va))?;
        // SAFETY: Freshly allocated; nobody else references the frame.
        let bytes = unsafe { self.mapper.phys_to_mut::<FrameBytes>(frame.base()) };
        bytes.fill(0);

        let page = va.page::<Size4K>();
        let space = process.address_space();
        if let Err(source) = space.map(page, Size4K::SIZE, frame.base(), permissions.demand_paged()) {
            if !matches!(source, MapError::AlreadyMapped(_)) {
                space.unmap(page, 1, false);
            }
            self.frames.free_4k(frame);
            return Err(FaultError::MapFailed { va, source });
        }

        let read = {
            let file = ContentGuard::lock(vma.file());
            file.read_at(offset, bytes)
        };
        match read {
            Ok(n) if n < FRAME_BYTES => {
                trace!("page fault: short read of {n} bytes at offset {offset:#x} for {va}");
            }
            Ok(_) => {}
            Err(err) => warn!("page fault: {handle} {err}; leaving {va} zeroed"),
        }

        trace!("page fault: {kind} {va} → {frame} ({handle})");
        Ok(frame)
    }
}
