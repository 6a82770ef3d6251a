//! # Kernel Memory-Management Configuration
//!
//! Compile-time configuration shared by the frame allocator and the demand
//! pager. Everything here is a constant; the only run-time configuration is the
//! physical range handed to the frame allocator at boot.
//!
//! ```text
//! Virtual Address Space Layout (64-bit):
//!
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │   User Space                    │
//!                       │   (file-backed VMAs live here,  │
//!                       │    populated on first touch)    │
//! 0x0000_7FFF_FFFF_FFFF ├─────────────────────────────────┤
//!                       │   Non-canonical hole            │
//! HHDM_BASE             ├─────────────────────────────────┤
//!                       │   Higher Half Direct Map        │
//!                       │   (frame contents are touched   │
//!                       │    through here)                │
//! 0xFFFF_FFFF_FFFF_FFFF └─────────────────────────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

pub mod memory;
