//! Per-frame reference counts.
//!
//! One [`FrameRefCount`] per managed frame. The count is the number of live
//! mappings (across all address spaces) pointing at the frame; a frame is on
//! the free list exactly when its count is zero.
//!
//! Every adjustment is a single compare-and-swap that refuses to go negative
//! and reports both the previous and the new value, so "decrement and tell me
//! whether I reached zero" cannot race with another context observing a stale
//! or transient count.

use core::sync::atomic::{AtomicU32, Ordering};

/// Reference count of one physical frame.
#[derive(Debug, Default)]
pub struct FrameRefCount(AtomicU32);

/// Outcome of a successful [`FrameRefCount::adjust`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RefCountChange {
    pub previous: u32,
    pub current: u32,
}

impl RefCountChange {
    /// This adjustment dropped the last reference.
    #[inline]
    #[must_use]
    pub const fn reached_zero(self) -> bool {
        self.previous > 0 && self.current == 0
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RefCountError {
    #[error("reference count {current} cannot drop by {by}")]
    Underflow { current: u32, by: u32 },
    #[error("reference count {current} cannot grow by {by}")]
    Overflow { current: u32, by: u32 },
    #[error("frame has no owner; its reference count cannot be raised")]
    Unowned,
}

impl FrameRefCount {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Current count. Only a snapshot; never base lifecycle decisions on it.
    #[inline]
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Unconditionally set the count. Only valid while the caller exclusively
    /// owns the frame (boot seeding, fresh allocation).
    #[inline]
    pub(crate) fn set(&self, value: u32) {
        self.0.store(value, Ordering::Release);
    }

    /// Atomically add `delta` (which may be negative).
    ///
    /// A `delta` of zero is a plain read. Raising the count of a frame whose
    /// count is zero is rejected: such a frame sits on the free list and
    /// belongs to nobody.
    ///
    /// # Errors
    /// The count is left untouched if it would go negative, overflow, or be
    /// raised from zero.
    pub fn adjust(&self, delta: i32) -> Result<RefCountChange, RefCountError> {
        let by = delta.unsigned_abs();
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = if delta < 0 {
                current
                    .checked_sub(by)
                    .ok_or(RefCountError::Underflow { current, by })?
            } else if delta > 0 {
                if current == 0 {
                    return Err(RefCountError::Unowned);
                }
                current
                    .checked_add(by)
                    .ok_or(RefCountError::Overflow { current, by })?
            } else {
                return Ok(RefCountChange {
                    previous: current,
                    current,
                });
            };

            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(previous) => {
                    return Ok(RefCountChange {
                        previous,
                        current: next,
                    });
                }
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_to_zero_is_reported_once() {
        let rc = FrameRefCount::new();
        rc.set(2);

        let first = rc.adjust(-1).unwrap();
        assert_eq!(first, RefCountChange { previous: 2, current: 1 });
        assert!(!first.reached_zero());

        let second = rc.adjust(-1).unwrap();
        assert!(second.reached_zero());
        assert_eq!(rc.get(), 0);
    }

    #[test]
    fn underflow_is_rejected_and_leaves_count_alone() {
        let rc = FrameRefCount::new();
        rc.set(1);
        assert_eq!(
            rc.adjust(-2),
            Err(RefCountError::Underflow { current: 1, by: 2 })
        );
        assert_eq!(rc.get(), 1);

        rc.set(0);
        assert_eq!(
            rc.adjust(-1),
            Err(RefCountError::Underflow { current: 0, by: 1 })
        );
        assert_eq!(rc.get(), 0);
    }

    #[test]
    fn raising_an_unowned_frame_is_rejected() {
        let rc = FrameRefCount::new();
        assert_eq!(rc.adjust(1), Err(RefCountError::Unowned));
        assert_eq!(rc.get(), 0);
    }

    #[test]
    fn zero_delta_reads_without_changing() {
        let rc = FrameRefCount::new();
        rc.set(3);
        let change = rc.adjust(0).unwrap();
        assert_eq!(change.current, 3);
        assert!(!change.reached_zero());
        assert_eq!(rc.adjust(0).unwrap().current, 3);
    }

    #[test]
    fn overflow_is_rejected() {
        let rc = FrameRefCount::new();
        rc.set(u32::MAX);
        assert_eq!(
            rc.adjust(1),
            Err(RefCountError::Overflow { current: u32::MAX, by: 1 })
        );
    }

    #[test]
    fn extreme_negative_delta_does_not_wrap() {
        let rc = FrameRefCount::new();
        rc.set(5);
        assert!(matches!(
            rc.adjust(i32::MIN),
            Err(RefCountError::Underflow { current: 5, .. })
        ));
    }
}
