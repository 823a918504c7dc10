// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Worker thread pairing a SpaceWire driver's receive side with a
// `ProtocolDispatcher`: pulls one frame at a time into a fixed main buffer
// and hands it to `handle_package`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::heartbeat::{deadline_for, HeartbeatSink, HeartbeatSource};
use crate::spacewire::{RxBuffer, SpaceWireDriver};

use super::core::ProtocolDispatcher;

/// Matches the wait-time/tolerance pair the dispatcher's receive loop uses
/// to derive its heartbeat deadline.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(10);
const HEARTBEAT_TOLERANCE: Duration = Duration::from_secs(1);

pub struct DispatcherThread<D: SpaceWireDriver, P> {
    driver: Arc<Mutex<D>>,
    dispatcher: Arc<ProtocolDispatcher<P>>,
    main_buffer: Mutex<Vec<u8>>,
    heartbeat_source: HeartbeatSource,
    heartbeat_sink: Arc<dyn HeartbeatSink>,
    running: AtomicBool,
}

impl<D: SpaceWireDriver, P: Copy + PartialEq> DispatcherThread<D, P> {
    pub fn new(
        driver: Arc<Mutex<D>>,
        dispatcher: Arc<ProtocolDispatcher<P>>,
        heartbeat_source: HeartbeatSource,
        heartbeat_sink: Arc<dyn HeartbeatSink>,
    ) -> Self {
        let buffer_len = driver.lock().unwrap().maximum_packet_length();
        Self {
            driver,
            dispatcher,
            main_buffer: Mutex::new(vec![0u8; buffer_len]),
            heartbeat_source,
            heartbeat_sink,
            running: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Receive one frame and route it. Returns `false` if nothing arrived
    /// within `timeout` (link down, no traffic).
    pub fn receive_once(&self, timeout: Duration) -> bool {
        self.heartbeat_sink
            .send(self.heartbeat_source, deadline_for(timeout, HEARTBEAT_TOLERANCE));

        let rx = {
            let mut driver = self.driver.lock().unwrap();
            match driver.receive(Some(timeout)) {
                Ok(rx) => rx,
                Err(_) => return false,
            }
        };

        let mut main_buffer = self.main_buffer.lock().unwrap();
        let data = rx.data();
        let read_bytes = data.len();
        let copy_len = read_bytes.min(main_buffer.len());
        main_buffer[..copy_len].copy_from_slice(&data[..copy_len]);
        self.dispatcher.handle_package(&main_buffer[..copy_len], read_bytes);

        self.driver.lock().unwrap().release_buffer(rx);
        true
    }

    pub fn run_receive_loop(self: Arc<Self>)
    where
        D: 'static,
        P: 'static + Send + Sync,
    {
        while self.running.load(Ordering::SeqCst) {
            self.receive_once(RECEIVE_TIMEOUT);
        }
    }
}
