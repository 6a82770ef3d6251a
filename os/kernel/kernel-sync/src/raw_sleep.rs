use crate::{RawLock, RawUnlock};
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How a context waits for a [`RawSleep`] lock to be released.
///
/// The kernel plugs in its scheduler here (block the current task, wake the
/// sleepers on release). Returning spuriously is fine; the lock re-checks
/// after every wakeup.
///
/// A waiter that blocks must call `still_held` under the same scheduler lock
/// that [`wake_all`](Self::wake_all) takes, and block only if it returns
/// `true`. Otherwise a release between the check and the block is missed.
pub trait Waiter {
    /// Give up the CPU until a holder releases the lock (or spuriously).
    fn wait(still_held: &dyn Fn() -> bool);

    /// Called by the releasing context when at least one waiter is parked.
    fn wake_all();
}

/// Busy-waiting [`Waiter`] for contexts without a scheduler.
pub struct SpinWaiter;

impl Waiter for SpinWaiter {
    #[inline]
    fn wait(_still_held: &dyn Fn() -> bool) {
        spin_loop();
    }

    #[inline]
    fn wake_all() {}
}

/// Raw sleeping lock.
///
/// Unlike [`RawSpin`](crate::RawSpin) the holder may block while holding it
/// (e.g. waiting for a disk read); contenders go through `W` instead of
/// burning the CPU.
///
/// A contender publishes itself in `sleepers` before its last look at `held`,
/// and a releaser clears `held` before looking at `sleepers`. Both pairs are
/// `SeqCst`, so at least one side sees the other: the contender finds the lock
/// free, or the releaser calls [`Waiter::wake_all`].
pub struct RawSleep<W = SpinWaiter> {
    held: AtomicBool,
    sleepers: AtomicUsize,
    _waiter: PhantomData<fn() -> W>,
}

impl<W: Waiter> Default for RawSleep<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Waiter> RawSleep<W> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
            sleepers: AtomicUsize::new(0),
            _waiter: PhantomData,
        }
    }

    pub fn lock(&self) {
        loop {
            if self.try_lock() {
                return;
            }
            self.sleepers.fetch_add(1, Ordering::SeqCst);
            let still_held = || self.held.load(Ordering::SeqCst);
            while still_held() {
                W::wait(&still_held);
            }
            self.sleepers.fetch_sub(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn try_lock(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }

    /// Number of contexts currently parked on this lock.
    #[inline]
    pub fn sleepers(&self) -> usize {
        self.sleepers.load(Ordering::Relaxed)
    }

    /// # Safety
    /// The caller must currently hold the lock.
    pub unsafe fn unlock(&self) {
        self.held.store(false, Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            W::wake_all();
        }
    }
}

impl<W: Waiter> RawLock for RawSleep<W> {
    fn raw_lock(&self) {
        self.lock();
    }

    fn raw_try_lock(&self) -> bool {
        self.try_lock()
    }

    fn raw_is_locked(&self) -> bool {
        self.is_locked()
    }
}

impl<W: Waiter> RawUnlock for RawSleep<W> {
    unsafe fn raw_unlock(&self) {
        unsafe { self.unlock() }
    }
}
