//! # File-backed Virtual Memory
//!
//! Virtual memory areas and the page-fault path that fills them lazily.
//!
//! ## What you get
//! - [`PagePermissions`]: R/W/X/U bits of a VMA.
//! - [`Vma`] descriptors in a fixed-capacity [`VmaRegistry`], referenced by
//!   [`VmaHandle`] from each process's [`VmaList`].
//! - [`DemandPager`]: resolves a fault by allocating a frame, mapping it and
//!   reading the page from the VMA's [`BackingFile`].
//! - [`PageFaultError`]: the x86-64 error code, decoded into a [`FaultKind`].
//! - Seams to the rest of the kernel: [`AddressSpace`] (page tables),
//!   [`Process`] (the faulting process) and [`BackingFile`] (inode I/O).
//!
//! ## Lifetimes of things
//!
//! ```text
//!  mmap ──► VmaRegistry::allocate ──► VmaList::attach
//!                                        │
//!  first touch ──► DemandPager::handle_fault ──► frame (refcount 1) mapped
//!                                        │
//!  fork ──► VmaList::duplicate + adjust_refcount(+1) per mapped frame
//!                                        │
//!  munmap ──► AddressSpace::unmap(release) + VmaList::remove
//!  exit   ──► AddressSpace::unmap(release) + VmaList::release_all
//! ```
//!
//! A VMA never owns frames; the page tables do, through the frame
//! allocator's reference counts.
//!
//! The kernel's instances live in [`global`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod address_space;
pub mod backing_file;
pub mod global;
pub mod page_fault;
pub mod pager;
mod permissions;
pub mod vma;
mod vma_list;

pub use crate::address_space::{AddressSpace, MapError, Process};
pub use crate::backing_file::{BackingFile, ContentGuard, FileReadError};
pub use crate::page_fault::{FaultKind, PageFaultError};
pub use crate::pager::{DemandPager, FaultError};
pub use crate::permissions::PagePermissions;
pub use crate::vma::{Vma, VmaError, VmaHandle, VmaRegistry};
pub use crate::vma_list::{VmaHit, VmaList};

/// Re-export constants as info module.
pub use kernel_info::memory as info;
