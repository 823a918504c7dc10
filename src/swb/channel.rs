// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A bus channel: a filter, a bounded deque of accepted messages, and the
// availability semaphore a consumer blocks on to drain it.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::semaphore::BinarySemaphore;

use super::filter::MessageFilter;
use super::types::{Message, OperationResult};

#[derive(Default)]
struct ChannelCounters {
    incoming: AtomicU32,
    appended: AtomicU32,
    failed: AtomicU32,
    retrieved: AtomicU32,
}

/// A filtered, bounded inbox fed by the bus distributor and drained by one
/// consumer.
pub struct BusChannel<IdType> {
    filter: Box<dyn MessageFilter<IdType> + Send + Sync>,
    capacity: usize,
    buffer: Mutex<VecDeque<Message<IdType>>>,
    available: BinarySemaphore,
    counters: ChannelCounters,
}

impl<IdType> BusChannel<IdType> {
    pub fn new(capacity: usize, filter: Box<dyn MessageFilter<IdType> + Send + Sync>) -> Self {
        Self {
            filter,
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            available: BinarySemaphore::new(true),
            counters: ChannelCounters::default(),
        }
    }

    pub fn matches(&self, id: &IdType, data: &[u8]) -> bool {
        self.filter.accepts(id, data)
    }

    /// Called by the bus distributor for every distributed message,
    /// regardless of whether this channel's filter ultimately accepts it.
    pub fn send_message(&self, message: &Message<IdType>) -> OperationResult
    where
        IdType: Clone,
    {
        self.counters.incoming.fetch_add(1, Ordering::Relaxed);
        if !self.matches(&message.id, message.buffer.as_slice()) {
            return OperationResult::InvalidMessage;
        }

        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            return OperationResult::NoBufferAvailable;
        }
        buffer.push_back(message.clone());
        drop(buffer);
        self.counters.appended.fetch_add(1, Ordering::Relaxed);
        // BinarySemaphore models a single pending signal; a channel already
        // signaled non-empty does not need a second release.
        self.available.release();
        OperationResult::Success
    }

    /// Block up to `timeout` for a message, then pop the head. `None` waits
    /// indefinitely, matching `BoundedQueue::receive`.
    pub fn receive_message(&self, timeout: Option<Duration>) -> Result<Message<IdType>, OperationResult> {
        if !self.available.acquire(timeout) {
            return Err(OperationResult::NoMessageAvailable);
        }
        let mut buffer = self.buffer.lock().unwrap();
        match buffer.pop_front() {
            Some(message) => {
                if !buffer.is_empty() {
                    drop(buffer);
                    self.available.release();
                }
                self.counters.retrieved.fetch_add(1, Ordering::Relaxed);
                Ok(message)
            }
            None => Err(OperationResult::InvalidState),
        }
    }

    pub fn number_of_incoming_messages(&self) -> u32 {
        self.counters.incoming.load(Ordering::Relaxed)
    }

    pub fn number_of_appended_messages(&self) -> u32 {
        self.counters.appended.load(Ordering::Relaxed)
    }

    pub fn number_of_failed_receptions(&self) -> u32 {
        self.counters.failed.load(Ordering::Relaxed)
    }

    pub fn number_of_retrieved_messages(&self) -> u32 {
        self.counters.retrieved.load(Ordering::Relaxed)
    }

    pub fn current_number_of_messages(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }
}
