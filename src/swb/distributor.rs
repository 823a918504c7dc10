// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel registry and single-message distribution step, shared by the
// software bus proper and its worker thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use super::channel::BusChannel;
use super::types::{Message, OperationResult};

#[derive(Default)]
pub struct DistributorCounters {
    incoming: AtomicU32,
    forwarded: AtomicU32,
    defaulted: AtomicU32,
}

impl DistributorCounters {
    pub fn incoming(&self) -> u32 {
        self.incoming.load(Ordering::Relaxed)
    }

    pub fn forwarded(&self) -> u32 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn defaulted(&self) -> u32 {
        self.defaulted.load(Ordering::Relaxed)
    }
}

/// Holds the registered channel list and distributes one message at a time
/// to every matching channel, falling back to the default channel.
pub struct BusDistributor<IdType> {
    channels: Mutex<Vec<Arc<BusChannel<IdType>>>>,
    default_channel: Mutex<Option<Arc<BusChannel<IdType>>>>,
    counters: DistributorCounters,
}

impl<IdType: Clone> BusDistributor<IdType> {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(Vec::new()),
            default_channel: Mutex::new(None),
            counters: DistributorCounters::default(),
        }
    }

    pub fn counters(&self) -> &DistributorCounters {
        &self.counters
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn register_channel(&self, channel: Arc<BusChannel<IdType>>) -> OperationResult {
        self.channels.lock().unwrap().push(channel);
        OperationResult::Success
    }

    /// Racy by design, for test teardown only (mirrors the upstream caveat).
    pub fn unregister_channel(&self, channel: &Arc<BusChannel<IdType>>) -> OperationResult {
        let mut channels = self.channels.lock().unwrap();
        let before = channels.len();
        channels.retain(|c| !Arc::ptr_eq(c, channel));
        if channels.len() < before {
            OperationResult::Success
        } else {
            OperationResult::NotFound
        }
    }

    pub fn set_default_channel(&self, channel: Arc<BusChannel<IdType>>) -> OperationResult {
        let mut default_channel = self.default_channel.lock().unwrap();
        if default_channel.is_some() {
            return OperationResult::MaxChannelsReached;
        }
        *default_channel = Some(channel);
        OperationResult::Success
    }

    /// Visit every registered channel with `message`, then the default
    /// channel if nothing accepted it. Counts `incoming` once regardless of
    /// outcome, `forwarded` once if any regular channel accepted, otherwise
    /// `defaulted` once if the default channel accepted.
    pub fn distribute_once(&self, message: &Message<IdType>) {
        self.counters.incoming.fetch_add(1, Ordering::Relaxed);

        let channels = self.channels.lock().unwrap();
        let mut forwarded = false;
        for channel in channels.iter() {
            if channel.send_message(message) == OperationResult::Success {
                forwarded = true;
            }
        }
        drop(channels);

        if forwarded {
            self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
        } else if let Some(default_channel) = self.default_channel.lock().unwrap().as_ref() {
            if default_channel.send_message(message) == OperationResult::Success {
                self.counters.defaulted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<IdType: Clone> Default for BusDistributor<IdType> {
    fn default() -> Self {
        Self::new()
    }
}
