//! # Kernel synchronization primitives
//!
//! Two lock classes, both built on the same [`Mutex<T, R>`] over a raw lock:
//!
//! * [`SpinLock`] busy-waits. For short critical sections (free list, VMA
//!   table); never hold one across anything that can block.
//! * [`SleepLock`] parks the caller through a [`Waiter`] while another
//!   context holds it. Used around file content during demand paging, where
//!   the holder may itself wait for I/O.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod mutex;
mod raw_sleep;
mod raw_spin;

pub use mutex::{Mutex, MutexGuard};
pub use raw_sleep::{RawSleep, SpinWaiter, Waiter};
pub use raw_spin::RawSpin;

pub type SpinLock<T> = Mutex<T, RawSpin>;
pub type SpinLockGuard<'a, T> = MutexGuard<'a, T, RawSpin>;

pub type SleepLock<T, W = SpinWaiter> = Mutex<T, RawSleep<W>>;
pub type SleepLockGuard<'a, T, W = SpinWaiter> = MutexGuard<'a, T, RawSleep<W>>;

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

impl<T, W: Waiter> SleepLock<T, W> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSleep::new(), value)
    }
}

pub trait RawLock {
    fn raw_lock(&self);
    fn raw_try_lock(&self) -> bool;
    fn raw_is_locked(&self) -> bool;
}

pub trait RawUnlock {
    /// # Safety
    /// The caller must currently hold the lock.
    unsafe fn raw_unlock(&self);
}
