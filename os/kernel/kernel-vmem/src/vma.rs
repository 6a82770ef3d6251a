//! # Virtual memory areas
//!
//! A [`Vma`] describes one file-backed range of a process's address space.
//! Descriptors live in a fixed-capacity [`VmaRegistry`] shared by all
//! processes and are referred to by [`VmaHandle`], a slot index paired with
//! the slot's generation. Releasing a slot bumps its generation, so handles
//! left over from an earlier occupant stop resolving once the slot is reused.
//! Processes keep their handles in a [`VmaList`](crate::VmaList).
//!
//! The registry hands out the first free slot after an O(capacity) scan and
//! never grows. Running out of slots halts the kernel; [`VmaRegistry::try_allocate`]
//! reports it instead.
//!
//! Releasing a VMA forgets the descriptor only. Frames mapped for it are
//! owned by the page tables and released through the frame allocator.

use crate::PagePermissions;
use crate::backing_file::BackingFile;
use core::fmt;
use kernel_memory_addresses::{PageSize, Size4K, VirtualAddress};
use kernel_sync::SpinLock;
use log::{debug, error, warn};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmaError {
    #[error("VMA bounds {start}..{end} are not page aligned")]
    Misaligned {
        start: VirtualAddress,
        end: VirtualAddress,
    },
    #[error("VMA {start}..{end} is empty")]
    Empty {
        start: VirtualAddress,
        end: VirtualAddress,
    },
    #[error("all {capacity} VMA slots are in use")]
    Exhausted { capacity: usize },
    #[error("{0} does not refer to a live VMA")]
    StaleHandle(VmaHandle),
}

/// A file-backed range `[start, end)` of virtual memory.
#[derive(Copy, Clone)]
pub struct Vma {
    start: VirtualAddress,
    end: VirtualAddress,
    permissions: PagePermissions,
    file: &'static dyn BackingFile,
}

impl Vma {
    /// Describe `[start, end)` backed by `file`, with file offset 0 at `start`.
    ///
    /// # Errors
    /// Either bound is not page aligned, or the range is empty.
    pub fn new(
        start: VirtualAddress,
        end: VirtualAddress,
        permissions: PagePermissions,
        file: &'static dyn BackingFile,
    ) -> Result<Self, VmaError> {
        if !start.is_aligned::<Size4K>() || !end.is_aligned::<Size4K>() {
            return Err(VmaError::Misaligned { start, end });
        }
        if end <= start {
            return Err(VmaError::Empty { start, end });
        }
        Ok(Self {
            start,
            end,
            permissions,
            file,
        })
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> VirtualAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn end(&self) -> VirtualAddress {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> PagePermissions {
        self.permissions
    }

    #[inline]
    #[must_use]
    pub fn file(&self) -> &'static dyn BackingFile {
        self.file
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        self.start <= va && va < self.end
    }

    /// Number of pages spanned.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        (self.end.as_u64() - self.start.as_u64()) >> Size4K::SHIFT
    }

    /// File offset of the page containing `va`, or `None` outside the VMA.
    #[must_use]
    pub fn file_offset(&self, va: VirtualAddress) -> Option<u64> {
        if !self.contains(va) {
            return None;
        }
        va.page::<Size4K>().base().checked_offset_from(self.start)
    }
}

impl fmt::Debug for Vma {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vma")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("permissions", &format_args!("{}", self.permissions))
            .finish_non_exhaustive()
    }
}

/// Stable reference to a slot in a [`VmaRegistry`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VmaHandle {
    index: usize,
    generation: u32,
}

impl VmaHandle {
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for VmaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vma#{}.{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    vma: Option<Vma>,
}

impl Slot {
    const EMPTY: Self = Self {
        generation: 0,
        vma: None,
    };

    /// The descriptor, if `handle` names the current occupant.
    fn occupant(&mut self, handle: VmaHandle) -> Option<&mut Option<Vma>> {
        (self.generation == handle.generation && self.vma.is_some()).then_some(&mut self.vma)
    }
}

/// Fixed pool of `N` VMA descriptors. A slot holding `Some` is valid.
pub struct VmaRegistry<const N: usize> {
    slots: SpinLock<[Slot; N]>,
}

impl<const N: usize> Default for VmaRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> VmaRegistry<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: SpinLock::new([const { Slot::EMPTY }; N]),
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of valid slots.
    pub fn in_use(&self) -> usize {
        self.slots
            .with_lock(|slots| slots.iter().filter(|s| s.vma.is_some()).count())
    }

    /// Store `vma` in the first free slot.
    ///
    /// Halts the kernel if every slot is taken.
    pub fn allocate(&self, vma: Vma) -> VmaHandle {
        self.try_allocate(vma).unwrap_or_else(|err| halt(err))
    }

    /// Fallible [`allocate`](Self::allocate).
    ///
    /// # Errors
    /// [`VmaError::Exhausted`] if every slot is taken.
    pub fn try_allocate(&self, vma: Vma) -> Result<VmaHandle, VmaError> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|s| s.vma.is_none())
            .ok_or(VmaError::Exhausted { capacity: N })?;
        let slot = &mut slots[index];
        slot.vma = Some(vma);
        let handle = VmaHandle {
            index,
            generation: slot.generation,
        };
        drop(slots);

        debug!("{handle}: {vma:?}");
        Ok(handle)
    }

    /// Invalidate the slot so it can be reused. Returns the descriptor it held.
    ///
    /// Releasing a slot that is not valid is logged and otherwise ignored.
    pub fn release(&self, handle: VmaHandle) -> Option<Vma> {
        match self.try_release(handle) {
            Ok(vma) => Some(vma),
            Err(err) => {
                warn!("ignoring release: {err}");
                None
            }
        }
    }

    /// Fallible [`release`](Self::release).
    ///
    /// # Errors
    /// [`VmaError::StaleHandle`] if the slot is free or has been reused
    /// since `handle` was issued.
    pub fn try_release(&self, handle: VmaHandle) -> Result<Vma, VmaError> {
        let vma = self
            .slots
            .with_lock(|slots| {
                let slot = slots.get_mut(handle.index)?;
                let vma = slot.occupant(handle)?.take();
                slot.generation = slot.generation.wrapping_add(1);
                vma
            })
            .ok_or(VmaError::StaleHandle(handle))?;
        debug!("{handle}: released");
        Ok(vma)
    }

    /// Copy of the descriptor `handle` was issued for, if it is still live.
    pub fn get(&self, handle: VmaHandle) -> Option<Vma> {
        self.slots.with_lock(|slots| {
            slots
                .get_mut(handle.index)
                .and_then(|slot| *slot.occupant(handle)?)
        })
    }
}

#[cold]
#[track_caller]
fn halt(err: VmaError) -> ! {
    error!("VMA registry: {err}");
    panic!("VMA registry: {err}");
}
