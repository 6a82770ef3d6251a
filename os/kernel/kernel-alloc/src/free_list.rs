/// LIFO stack of free frame indices, linked through a side table.
///
/// ```text
///  head ──► 7 ──► 3 ──► 0 ──► ∅
///  links:  [∅, _, _, 0, _, _, _, 3]   (stored as index + 1, 0 = end)
/// ```
///
/// Links live in `next` rather than inside the free frames themselves, so
/// frame contents stay untouched by the allocator apart from the fill
/// pattern, and a bogus index can never make the list point into random
/// memory. The all-zero state is the empty list, which keeps a `static`
/// instance in `.bss`.
///
/// # Invariants
/// - An index appears in the list at most once.
/// - `len` equals the number of linked indices.
/// - The caller serializes all access (the allocator wraps it in a `SpinLock`).
pub(crate) struct FreeList<const N: usize> {
    head: u32,
    next: [u32; N],
    len: usize,
}

impl<const N: usize> FreeList<N> {
    /// Links are `index + 1` stored in a `u32`.
    const CAPACITY_FITS: () = assert!(N < u32::MAX as usize, "free list too large");

    pub(crate) const fn new() -> Self {
        let () = Self::CAPACITY_FITS;
        Self {
            head: 0,
            next: [0; N],
            len: 0,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    /// Push a frame index; O(1).
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn push(&mut self, index: usize) {
        debug_assert!(index < N, "frame index {index} out of bounds");
        debug_assert!(self.len < N, "free list overfull");
        self.next[index] = self.head;
        self.head = index as u32 + 1;
        self.len += 1;
    }

    /// Pop the most recently pushed frame index; O(1).
    pub(crate) fn pop(&mut self) -> Option<usize> {
        if self.head == 0 {
            return None;
        }
        let index = (self.head - 1) as usize;
        self.head = self.next[index];
        self.next[index] = 0;
        self.len -= 1;
        Some(index)
    }
}
