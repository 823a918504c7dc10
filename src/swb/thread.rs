// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Worker thread draining the software bus's input queue and distributing
// each message to the registered channels.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::heartbeat::{deadline_for, HeartbeatSink, HeartbeatSource};
use crate::queue::BoundedQueue;

use super::distributor::BusDistributor;
use super::types::Message;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_TOLERANCE: Duration = Duration::from_secs(1);

pub struct BusHandlerThread<IdType> {
    distributor: Arc<BusDistributor<IdType>>,
    queue: BoundedQueue<Message<IdType>>,
    heartbeat_source: HeartbeatSource,
    heartbeat_sink: Arc<dyn HeartbeatSink>,
    running: AtomicBool,
}

impl<IdType: Clone> BusHandlerThread<IdType> {
    pub fn new(
        distributor: Arc<BusDistributor<IdType>>,
        queue: BoundedQueue<Message<IdType>>,
        heartbeat_source: HeartbeatSource,
        heartbeat_sink: Arc<dyn HeartbeatSink>,
    ) -> Self {
        Self {
            distributor,
            queue,
            heartbeat_source,
            heartbeat_sink,
            running: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Drain and distribute one message. Returns `false` on timeout.
    pub fn step(&self, timeout: Duration) -> bool {
        self.heartbeat_sink
            .send(self.heartbeat_source, deadline_for(timeout, HEARTBEAT_TOLERANCE));

        match self.queue.receive(Some(timeout)) {
            Some(message) => {
                self.distributor.distribute_once(&message);
                true
            }
            None => false,
        }
    }

    /// Drain every message currently queued without blocking; used by tests
    /// that want synchronous, race-free distribution instead of a running
    /// thread.
    pub fn handle_all_messages(&self) {
        while self.step(Duration::ZERO) {}
    }

    pub fn run_receive_loop(self: Arc<Self>)
    where
        IdType: 'static + Send + Sync,
    {
        while self.running.load(Ordering::SeqCst) {
            self.step(RECEIVE_TIMEOUT);
        }
    }
}
