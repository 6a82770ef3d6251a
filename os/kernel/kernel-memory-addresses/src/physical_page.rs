use crate::{MemoryPage, PageSize, PhysicalAddress};
use core::fmt;

/// Physical memory page base for size `S`, i.e. one **frame**.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalAddress::new(0x8000_1fff).page::<Size4K>();
/// assert_eq!(frame.base().as_u64(), 0x8000_1000);
/// assert_eq!(frame.next().base().as_u64(), 0x8000_2000);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize>(pub(crate) MemoryPage<S>);

impl<S: PageSize> PhysicalPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        addr.page::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0.base())
    }

    /// The frame directly after this one.
    ///
    /// # Panics
    /// If the address space would wrap around.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.checked_forward(1) {
            Some(p) => Self(p),
            None => panic!("physical page overflow"),
        }
    }

    /// The frame `count` frames after this one, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_forward(self, count: u64) -> Option<Self> {
        match self.0.checked_forward(count) {
            Some(p) => Some(Self(p)),
            None => None,
        }
    }
}

impl<S> fmt::Display for PhysicalPage<S>
where
    S: PageSize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{}>({:#018X})", S::as_str(), self.0.base().as_u64())
    }
}

impl<S: PageSize> TryFrom<PhysicalAddress> for PhysicalPage<S> {
    type Error = PhysicalAddress;

    /// Accepts only page-aligned addresses; hands the address back otherwise.
    #[inline]
    fn try_from(pa: PhysicalAddress) -> Result<Self, Self::Error> {
        if pa.is_aligned::<S>() {
            Ok(pa.page())
        } else {
            Err(pa)
        }
    }
}
