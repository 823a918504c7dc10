// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Bounded FIFO queue of pool-owned buffers (or any `Send` payload). Multiple
// producers and consumers may use the same queue concurrently. `send` is
// always non-blocking: a full queue simply fails so the caller can count the
// drop. `receive` blocks up to a caller-supplied timeout, backed by the same
// condvar-based `Waiter` the rest of this crate's blocking primitives use.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::waiter::Waiter;

struct Inner<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    waiter: Waiter,
}

/// A bounded, thread-safe FIFO queue.
pub struct BoundedQueue<T> {
    inner: std::sync::Arc<Inner<T>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: std::sync::Arc::new(Inner {
                items: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                waiter: Waiter::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Current number of queued items.
    pub fn len(&self) -> usize {
        self.inner.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue `item`. Returns `false` without blocking if the queue is full.
    pub fn send(&self, item: T) -> bool {
        {
            let mut items = self.inner.items.lock().unwrap();
            if items.len() >= self.inner.capacity {
                return false;
            }
            items.push_back(item);
        }
        self.inner.waiter.notify();
        true
    }

    /// Dequeue the oldest item, blocking up to `timeout` (or indefinitely if
    /// `None`) for one to arrive. A zero duration polls without blocking.
    pub fn receive(&self, timeout: Option<Duration>) -> Option<T> {
        if timeout != Some(Duration::ZERO) {
            self.inner
                .waiter
                .wait_if(|| self.inner.items.lock().unwrap().is_empty(), timeout);
        }
        self.inner.items.lock().unwrap().pop_front()
    }
}
