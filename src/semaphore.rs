// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A binary semaphore used to suspend a caller until a single signal arrives
// (the RMAP transaction's reply-wait, a bus channel's availability signal).
// Built on the same `Waiter` primitive as `BoundedQueue`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::waiter::Waiter;

/// A semaphore with exactly two states, released or acquired.
pub struct BinarySemaphore {
    available: AtomicBool,
    waiter: Waiter,
}

impl BinarySemaphore {
    /// Create a semaphore whose initial state is `acquired` (the caller must
    /// wait for a `release` before `acquire` succeeds) or released.
    pub fn new(initially_acquired: bool) -> Self {
        Self {
            available: AtomicBool::new(!initially_acquired),
            waiter: Waiter::new(),
        }
    }

    /// Block up to `timeout` (or indefinitely if `None`) for the semaphore
    /// to become available, then consume the signal. Returns `false` on
    /// timeout.
    pub fn acquire(&self, timeout: Option<Duration>) -> bool {
        let mut consumed = false;
        self.waiter.wait_if(
            || {
                if self.available.swap(false, Ordering::AcqRel) {
                    consumed = true;
                    false // signal seen, stop waiting
                } else {
                    true // still acquired elsewhere, keep waiting
                }
            },
            timeout,
        );
        consumed
    }

    /// Signal the semaphore, waking one waiter.
    pub fn release(&self) {
        self.available.store(true, Ordering::Release);
        self.waiter.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_times_out_when_never_released() {
        let sem = BinarySemaphore::new(true);
        assert!(!sem.acquire(Some(Duration::from_millis(20))));
    }

    #[test]
    fn release_then_acquire_succeeds_immediately() {
        let sem = BinarySemaphore::new(true);
        sem.release();
        assert!(sem.acquire(Some(Duration::from_millis(50))));
    }

    #[test]
    fn acquire_unblocks_on_release_from_other_thread() {
        let sem = Arc::new(BinarySemaphore::new(true));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sem2.release();
        });
        assert!(sem.acquire(Some(Duration::from_secs(2))));
        handle.join().unwrap();
    }
}
