// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The software bus proper: validates and copies/enqueues outgoing messages
// onto the distributor's input queue. Distribution itself happens on
// `BusHandlerThread` (or synchronously via `handle_all_messages` in tests).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::pool::SharedBufferPool;
use crate::queue::BoundedQueue;

use super::types::{CopyMode, Message, OperationResult};

#[derive(Default)]
struct SoftwareBusCounters {
    invalid_messages: AtomicU32,
    failed_copy_operations: AtomicU32,
    failed_send_operations: AtomicU32,
    accepted_messages: AtomicU32,
}

/// Validity predicate applied to every outgoing message before it is even
/// copied. The default accepts everything; a caller-supplied closure lets
/// one bus instance reject messages the way `SoftwareBusFiltered` does.
pub trait OutgoingValidator<IdType>: Send + Sync {
    fn valid(&self, id: &IdType, data: &[u8]) -> bool;
}

pub struct AcceptAll;
impl<IdType> OutgoingValidator<IdType> for AcceptAll {
    fn valid(&self, _id: &IdType, _data: &[u8]) -> bool {
        true
    }
}

/// Entry point senders use to publish messages; owns the pool sends copy
/// into and the queue the distributor thread drains.
pub struct SoftwareBus<IdType> {
    pool: SharedBufferPool,
    queue: BoundedQueue<Message<IdType>>,
    validator: Box<dyn OutgoingValidator<IdType>>,
    send_lock: Mutex<()>,
    counters: SoftwareBusCounters,
}

impl<IdType: Clone> SoftwareBus<IdType> {
    pub fn new(pool: SharedBufferPool, queue: BoundedQueue<Message<IdType>>) -> Self {
        Self::with_validator(pool, queue, Box::new(AcceptAll))
    }

    pub fn with_validator(
        pool: SharedBufferPool,
        queue: BoundedQueue<Message<IdType>>,
        validator: Box<dyn OutgoingValidator<IdType>>,
    ) -> Self {
        Self {
            pool,
            queue,
            validator,
            send_lock: Mutex::new(()),
            counters: SoftwareBusCounters::default(),
        }
    }

    pub fn number_of_declined_messages(&self) -> u32 {
        self.counters.invalid_messages.load(Ordering::Relaxed)
    }

    pub fn number_of_failed_copy_operations(&self) -> u32 {
        self.counters.failed_copy_operations.load(Ordering::Relaxed)
    }

    pub fn number_of_failed_send_operations(&self) -> u32 {
        self.counters.failed_send_operations.load(Ordering::Relaxed)
    }

    pub fn number_of_accepted_messages(&self) -> u32 {
        self.counters.accepted_messages.load(Ordering::Relaxed)
    }

    /// Copy `data` into a pool-allocated buffer, then enqueue.
    pub fn send_slice(&self, id: IdType, data: &[u8]) -> OperationResult {
        let _guard = self.send_lock.lock().unwrap();
        if !self.validator.valid(&id, data) {
            self.counters.invalid_messages.fetch_add(1, Ordering::Relaxed);
            return OperationResult::InvalidMessage;
        }
        let buffer = match self.copy_into_pool(data) {
            Ok(buffer) => buffer,
            Err(result) => {
                self.counters.failed_copy_operations.fetch_add(1, Ordering::Relaxed);
                return result;
            }
        };
        self.enqueue(Message { id, buffer })
    }

    /// Enqueue a pre-formed `SharedChildPointer`, copying it first iff
    /// `mode == CopyOnce`.
    pub fn send_buffer(
        &self,
        id: IdType,
        buffer: crate::pool::SharedChildPointer,
        mode: CopyMode,
    ) -> OperationResult {
        let _guard = self.send_lock.lock().unwrap();
        if !self.validator.valid(&id, buffer.as_slice()) {
            self.counters.invalid_messages.fetch_add(1, Ordering::Relaxed);
            return OperationResult::InvalidMessage;
        }

        let buffer = if mode == CopyMode::CopyOnce {
            match self.copy_into_pool(buffer.as_slice()) {
                Ok(buffer) => buffer,
                Err(result) => {
                    self.counters.failed_copy_operations.fetch_add(1, Ordering::Relaxed);
                    return result;
                }
            }
        } else {
            buffer
        };

        self.enqueue(Message { id, buffer })
    }

    /// Zero-copy enqueue of a pre-formed message.
    pub fn send_message(&self, message: Message<IdType>) -> OperationResult {
        let _guard = self.send_lock.lock().unwrap();
        if !self.validator.valid(&message.id, message.buffer.as_slice()) {
            self.counters.invalid_messages.fetch_add(1, Ordering::Relaxed);
            return OperationResult::InvalidMessage;
        }
        self.enqueue(message)
    }

    fn enqueue(&self, message: Message<IdType>) -> OperationResult {
        if self.queue.send(message) {
            self.counters.accepted_messages.fetch_add(1, Ordering::Relaxed);
            OperationResult::Success
        } else {
            log::warn!("software bus input queue full, dropping message");
            self.counters.failed_send_operations.fetch_add(1, Ordering::Relaxed);
            OperationResult::SendFailed
        }
    }

    fn copy_into_pool(&self, data: &[u8]) -> Result<crate::pool::SharedChildPointer, OperationResult> {
        if data.is_empty() {
            // An empty message still needs a valid (zero-length) buffer.
            let element = self.pool.allocate().ok_or(OperationResult::NoBufferAvailable)?;
            return element
                .get_child(0, 0, 0)
                .ok_or(OperationResult::NoBufferAvailable);
        }
        if data.len() > self.pool.element_size() {
            return Err(OperationResult::MessageTooLong);
        }
        let element = self.pool.allocate().ok_or(OperationResult::NoBufferAvailable)?;
        element.as_mut_slice()[..data.len()].copy_from_slice(data);
        element
            .get_child(0, 0, data.len())
            .ok_or(OperationResult::NoBufferAvailable)
    }
}
