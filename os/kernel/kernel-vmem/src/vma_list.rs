use crate::vma::{Vma, VmaError, VmaHandle, VmaRegistry};
use alloc::vec::Vec;
use kernel_memory_addresses::VirtualAddress;

/// A VMA of a process that covers some address.
#[derive(Debug, Copy, Clone)]
pub struct VmaHit {
    pub handle: VmaHandle,
    pub vma: Vma,
    /// File offset of the page holding the address.
    pub offset: u64,
}

/// The VMAs owned by one process, as handles into a [`VmaRegistry`].
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct VmaList(Vec<VmaHandle>);

impl VmaList {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn attach(&mut self, handle: VmaHandle) {
        self.0.push(handle);
    }

    /// Remove `handle` from the list; `false` if it was not attached.
    /// The registry slot is left alone.
    pub fn detach(&mut self, handle: VmaHandle) -> bool {
        let Some(pos) = self.0.iter().position(|&h| h == handle) else {
            return false;
        };
        self.0.remove(pos);
        true
    }

    /// Detach `handle` and release its registry slot, as on munmap.
    /// `None` if the handle was not attached or no longer live.
    pub fn remove<const N: usize>(
        &mut self,
        registry: &VmaRegistry<N>,
        handle: VmaHandle,
    ) -> Option<Vma> {
        if self.detach(handle) {
            registry.release(handle)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = VmaHandle> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First live VMA in this list that contains `va`.
    pub fn find<const N: usize>(
        &self,
        registry: &VmaRegistry<N>,
        va: VirtualAddress,
    ) -> Option<VmaHit> {
        self.iter().find_map(|handle| {
            let vma = registry.get(handle)?;
            let offset = vma.file_offset(va)?;
            Some(VmaHit {
                handle,
                vma,
                offset,
            })
        })
    }

    /// Copy every valid VMA into fresh registry slots, for a child process.
    ///
    /// Only descriptors are copied; sharing the frames mapped for them is up
    /// to the caller. If the registry runs out, the slots taken so far are
    /// released again.
    ///
    /// # Errors
    /// [`VmaError::Exhausted`] if the registry cannot hold the copies.
    pub fn duplicate<const N: usize>(&self, registry: &VmaRegistry<N>) -> Result<Self, VmaError> {
        let mut child = Self(Vec::with_capacity(self.len()));
        for vma in self.iter().filter_map(|h| registry.get(h)) {
            match registry.try_allocate(vma) {
                Ok(handle) => child.attach(handle),
                Err(err) => {
                    child.release_all(registry);
                    return Err(err);
                }
            }
        }
        Ok(child)
    }

    /// Detach and release every VMA, as on process exit.
    pub fn release_all<const N: usize>(&mut self, registry: &VmaRegistry<N>) {
        for handle in self.0.drain(..) {
            registry.release(handle);
        }
    }
}
