//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! frame allocator and the demand pager.
//!
//! ## Overview
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] / [`MemoryPage<S>`] | Raw 64-bit address and page base, either kind. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical RAM; a `PhysicalPage<Size4K>` is a frame. |
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Addresses as seen through a process's page tables. |
//!
//! Frames are always 4 KiB ([`Size4K`]); huge pages are not supported.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let fault = VirtualAddress::new(0x4000_2abc);
//! let page = fault.page::<Size4K>();
//! assert_eq!(page.base().as_u64(), 0x4000_2000);
//!
//! let frame = PhysicalPage::<Size4K>::try_from(PhysicalAddress::new(0x8000_3000)).unwrap();
//! assert_eq!(frame.base().as_u64(), 0x8000_3000);
//! assert!(PhysicalPage::<Size4K>::try_from(PhysicalAddress::new(0x8000_3001)).is_err());
//! ```
//!
//! All alignment and offset calculations are `const fn`.

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use memory_address::{MemoryAddress, MemoryPage};
pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;
