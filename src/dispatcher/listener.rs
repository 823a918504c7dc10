// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A dispatcher listener: a protocol-ID match (or `None` for the default
// listener), the pool it draws delivery buffers from, the queue it forwards
// onto, and the truncation/drop counters for that one registration.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::pool::{SharedBufferPool, SharedChildPointer};
use crate::queue::BoundedQueue;

/// Counters for one listener registration. Shared between the dispatcher's
/// internal bookkeeping and whatever handle was returned at registration, so
/// callers can observe their own drop/partial/retrieved history without a
/// lookup-by-queue-identity API.
#[derive(Default)]
pub struct ListenerCounters {
    dropped: AtomicU32,
    partial: AtomicU32,
    overflowed_bytes: AtomicU32,
    retrieved: AtomicU32,
}

impl ListenerCounters {
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn partial(&self) -> u32 {
        self.partial.load(Ordering::Relaxed)
    }

    pub fn overflowed_bytes(&self) -> u32 {
        self.overflowed_bytes.load(Ordering::Relaxed)
    }

    /// Number of packets this listener has actually pulled off its queue.
    /// The dispatcher never calls this; it is for the consumer side to
    /// report back, since the dispatcher only knows about enqueue, not
    /// dequeue.
    pub fn retrieved(&self) -> u32 {
        self.retrieved.load(Ordering::Relaxed)
    }

    pub fn record_retrieved(&self) {
        self.retrieved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_partial(&self, overflow_bytes: u32) {
        self.partial.fetch_add(1, Ordering::Relaxed);
        self.overflowed_bytes.fetch_add(overflow_bytes, Ordering::Relaxed);
    }
}

pub(crate) struct Listener<P> {
    pub(crate) id: Option<P>,
    pub(crate) pool: SharedBufferPool,
    pub(crate) queue: BoundedQueue<SharedChildPointer>,
    pub(crate) drop_partial: bool,
    pub(crate) counters: Arc<ListenerCounters>,
}

impl<P> Listener<P> {
    pub(crate) fn new(
        id: Option<P>,
        pool: SharedBufferPool,
        queue: BoundedQueue<SharedChildPointer>,
        drop_partial: bool,
    ) -> (Self, Arc<ListenerCounters>) {
        let counters = Arc::new(ListenerCounters::default());
        (
            Self {
                id,
                pool,
                queue,
                drop_partial,
                counters: counters.clone(),
            },
            counters,
        )
    }
}
