// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// TimeCode fan-out: an append-only registry of listener queues for
// SpaceWire time-code packets. Registration takes a mutex; dispatch does
// not, relying on the registry only ever growing so a dispatching reader
// never observes a torn intermediate state. This is what lets
// `dispatch_time_code` be called from an interrupt context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::queue::BoundedQueue;

/// A SpaceWire time-code value (6-bit counter + 2-bit flags, per
/// ECSS-E-ST-50-12C); carried as a plain byte.
pub type TimeCode = u8;

struct Slot {
    queue: BoundedQueue<TimeCode>,
}

/// Append-only fan-out of time-code listener queues, bounded to `N` entries.
pub struct TimeCodeFanout<const N: usize> {
    slots: [Mutex<Option<Slot>>; N],
    count: AtomicUsize,
    registration_lock: Mutex<()>,
}

impl<const N: usize> TimeCodeFanout<N> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Mutex::new(None)),
            count: AtomicUsize::new(0),
            registration_lock: Mutex::new(()),
        }
    }

    /// Register a new listener queue. Returns `false` if the fan-out is full.
    pub fn add_listener(&self, queue: BoundedQueue<TimeCode>) -> bool {
        let _guard = self.registration_lock.lock().unwrap();
        let n = self.count.load(Ordering::Acquire);
        if n >= N {
            return false;
        }
        *self.slots[n].lock().unwrap() = Some(Slot { queue });
        // Publish the new count only after the slot is populated, so a
        // concurrent dispatcher that observes the incremented count always
        // sees a fully initialized slot.
        self.count.store(n + 1, Ordering::Release);
        true
    }

    pub fn number_of_listeners(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Non-blockingly enqueue `tc` to every registered listener. Safe to
    /// call from an interrupt context: no lock is taken, and the listener
    /// count only ever grows.
    pub fn dispatch_time_code(&self, tc: TimeCode) {
        let n = self.count.load(Ordering::Acquire);
        for slot in &self.slots[..n] {
            if let Ok(guard) = slot.try_lock() {
                if let Some(s) = guard.as_ref() {
                    s.queue.send(tc);
                }
            }
        }
    }
}

impl<const N: usize> Default for TimeCodeFanout<N> {
    fn default() -> Self {
        Self::new()
    }
}
