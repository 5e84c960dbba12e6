//! Synchronization primitives
//!
//! The spin locks come from the `spin` crate; the one primitive built
//! here is the counting semaphore used to signal child exit to a waiting
//! parent. P spins, so it must only be used where the count is known to
//! arrive from another thread of control.

use core::sync::atomic::{AtomicU32, Ordering};

/// A counting semaphore.
pub struct Semaphore {
    count: AtomicU32,
}

impl Semaphore {
    pub const fn new(initial: u32) -> Self {
        Self {
            count: AtomicU32::new(initial),
        }
    }

    /// Decrement the count, spinning until it is positive.
    pub fn p(&self) {
        loop {
            if self.try_p() {
                return;
            }
            core::hint::spin_loop();
        }
    }

    /// Decrement the count if it is positive. Returns whether it was.
    pub fn try_p(&self) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        while current > 0 {
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(seen) => current = seen,
            }
        }
        false
    }

    /// Increment the count.
    pub fn v(&self) {
        self.count.fetch_add(1, Ordering::Release);
    }
}
