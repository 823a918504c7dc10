// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Single-threaded packet demultiplexer: extracts a protocol ID at a
// configured byte offset and fans the packet out to every listener
// registered for that ID, falling back to a single default listener.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::pool::SharedBufferPool;
use crate::queue::BoundedQueue;

use super::listener::{Listener, ListenerCounters};

/// Global dispatcher-wide counters, independent of any one listener.
#[derive(Default)]
pub struct DispatcherCounters {
    dropped: AtomicU32,
    unmatched: AtomicU32,
    partial: AtomicU32,
    overflowed_bytes: AtomicU32,
}

impl DispatcherCounters {
    /// Packets accepted by no listener at all (regular or default).
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Packets whose protocol ID matched no regular listener and that the
    /// default listener (if any) also failed to accept.
    pub fn unmatched(&self) -> u32 {
        self.unmatched.load(Ordering::Relaxed)
    }

    /// Packets whose reported size exceeded the dispatcher's main receive
    /// buffer, before any per-listener delivery was attempted.
    pub fn partial(&self) -> u32 {
        self.partial.load(Ordering::Relaxed)
    }

    pub fn overflowed_bytes(&self) -> u32 {
        self.overflowed_bytes.load(Ordering::Relaxed)
    }
}

/// Single-producer multi-consumer packet router. `P` is the protocol-ID
/// type extracted from each packet; `extract_id` reads it out of the raw
/// bytes (the analogue of a byte-copy at a configured offset, made safe).
pub struct ProtocolDispatcher<P> {
    listeners: Mutex<Vec<Listener<P>>>,
    default_listener: Mutex<Option<Listener<P>>>,
    capacity: usize,
    extract_id: Box<dyn Fn(&[u8]) -> Option<P> + Send + Sync>,
    counters: DispatcherCounters,
}

impl<P: Copy + PartialEq> ProtocolDispatcher<P> {
    /// `capacity` bounds the number of regular (non-default) listeners.
    pub fn new(capacity: usize, extract_id: impl Fn(&[u8]) -> Option<P> + Send + Sync + 'static) -> Self {
        Self {
            listeners: Mutex::new(Vec::with_capacity(capacity)),
            default_listener: Mutex::new(None),
            capacity,
            extract_id: Box::new(extract_id),
            counters: DispatcherCounters::default(),
        }
    }

    pub fn counters(&self) -> &DispatcherCounters {
        &self.counters
    }

    /// Register a queue for one protocol ID. Fails once `capacity` regular
    /// listeners are already registered.
    pub fn add_listener(
        &self,
        id: P,
        pool: SharedBufferPool,
        queue: BoundedQueue<crate::pool::SharedChildPointer>,
        drop_partial: bool,
    ) -> Option<Arc<ListenerCounters>> {
        let mut listeners = self.listeners.lock().unwrap();
        if listeners.len() >= self.capacity {
            return None;
        }
        let (listener, counters) = Listener::new(Some(id), pool, queue, drop_partial);
        listeners.push(listener);
        Some(counters)
    }

    /// Register the catch-all listener for packets matching no regular ID.
    /// Fails if one is already set.
    pub fn set_default_listener(
        &self,
        pool: SharedBufferPool,
        queue: BoundedQueue<crate::pool::SharedChildPointer>,
        drop_partial: bool,
    ) -> Option<Arc<ListenerCounters>> {
        let mut default_listener = self.default_listener.lock().unwrap();
        if default_listener.is_some() {
            return None;
        }
        let (listener, counters) = Listener::new(None, pool, queue, drop_partial);
        *default_listener = Some(listener);
        Some(counters)
    }

    /// Route one received packet. `buffer` is the bytes actually captured
    /// (already capped to the dispatcher's main receive buffer); `read_bytes`
    /// is the size the underlying receiver reported, which may exceed
    /// `buffer.len()` if the source itself had to truncate.
    pub fn handle_package(&self, buffer: &[u8], read_bytes: usize) {
        if read_bytes > buffer.len() {
            let cut = (read_bytes - buffer.len()) as u32;
            log::warn!("received packet truncated by {cut} bytes before dispatch");
            self.counters.partial.fetch_add(1, Ordering::Relaxed);
            self.counters.overflowed_bytes.fetch_add(cut, Ordering::Relaxed);
        }

        let id = (self.extract_id)(buffer);
        let mut delivered = false;
        let mut regular_matched = false;

        {
            let mut listeners = self.listeners.lock().unwrap();
            if let Some(id) = id {
                for listener in listeners.iter_mut() {
                    if listener.id == Some(id) {
                        regular_matched = true;
                        if Self::insert_into_queue(listener, buffer, read_bytes) {
                            delivered = true;
                        }
                    }
                }
            }
        }

        if !regular_matched {
            let mut default_listener = self.default_listener.lock().unwrap();
            let default_delivered = default_listener
                .as_mut()
                .is_some_and(|listener| Self::insert_into_queue(listener, buffer, read_bytes));
            if default_delivered {
                delivered = true;
            } else {
                log::debug!("packet matched no registered listener");
                self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            }
        }

        if !delivered {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn insert_into_queue(listener: &mut Listener<P>, buffer: &[u8], read_bytes: usize) -> bool {
        let shared = match listener.pool.allocate() {
            Some(s) => s,
            None => {
                log::warn!("listener pool exhausted, dropping packet");
                listener.counters.record_dropped();
                return false;
            }
        };

        let effective_size = read_bytes.min(shared.len()).min(buffer.len());
        shared.as_mut_slice()[..effective_size].copy_from_slice(&buffer[..effective_size]);
        let child = shared
            .get_child(0, 0, effective_size)
            .expect("effective_size is bounded by shared.len()");

        let truncated = effective_size < read_bytes;
        if listener.drop_partial && truncated {
            listener.counters.record_dropped();
            return false;
        }

        let sent = listener.queue.send(child);
        if sent {
            if truncated {
                listener.counters.record_partial((read_bytes - effective_size) as u32);
            }
        } else {
            listener.counters.record_dropped();
        }
        sent
    }
}
