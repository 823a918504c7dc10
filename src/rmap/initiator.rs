// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// RMAP initiator: the public read/write contract, transaction allocation
// and correlation, and the receive-thread loop that consumes the protocol
// dispatcher's RMAP queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::heartbeat::{deadline_for, HeartbeatSink, HeartbeatSource};
use crate::pool::SharedChildPointer;
use crate::queue::BoundedQueue;
use crate::spacewire::{DriverResult, SpaceWireDriver, TxBuffer};

use super::node::RmapTargetNode;
use super::options::RMapOptions;
use super::packet::{ExtractionResult, InstructionField, Operation, PacketType, RmapPacket};
use super::result::{RmapResult, RmapResultType};
use super::status::ErrorStatusCode;
use super::transaction::{TransactionState, TransactionsList};
use super::{BUFFER_SIZE, MAX_CONCURRENT_TRANSACTIONS};

/// Counters tracking anomalies seen by the receive thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorCounters {
    pub discarded_received_packets: u32,
    pub non_rmap_packet_received: u32,
    pub erroneous_reply_packets: u32,
    pub error_in_storing_reply_packet: u32,
}

/// Explicit collaborator for packets that arrive on the RMAP queue but do
/// not parse as RMAP at all — replaces the source's process-global publish
/// topic with an injected interface.
pub trait NonRmapPacketSink: Send + Sync {
    fn publish(&self, data: &[u8]);
}

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);
const HEARTBEAT_TOLERANCE: Duration = Duration::from_secs(1);

/// A transaction-tracking RMAP client. Generic over the SpaceWire driver so
/// tests can substitute a loopback fake.
pub struct RmapInitiator<D: SpaceWireDriver> {
    driver: Arc<Mutex<D>>,
    initiator_logical_address: u8,
    operation_lock: Mutex<()>,
    table: Mutex<TransactionsList>,
    counters: Mutex<ErrorCounters>,
    discarded_packet: Mutex<Option<RmapPacket>>,
    heartbeat_source: HeartbeatSource,
    heartbeat_sink: Arc<dyn HeartbeatSink>,
    non_rmap_sink: Option<Arc<dyn NonRmapPacketSink>>,
    receive_queue: BoundedQueue<SharedChildPointer>,
    running: AtomicBool,
}

impl<D: SpaceWireDriver> RmapInitiator<D> {
    pub fn new(
        driver: Arc<Mutex<D>>,
        initiator_logical_address: u8,
        heartbeat_source: HeartbeatSource,
        heartbeat_sink: Arc<dyn HeartbeatSink>,
        receive_queue: BoundedQueue<SharedChildPointer>,
        non_rmap_sink: Option<Arc<dyn NonRmapPacketSink>>,
    ) -> Self {
        Self {
            driver,
            initiator_logical_address,
            operation_lock: Mutex::new(()),
            table: Mutex::new(TransactionsList::new(MAX_CONCURRENT_TRANSACTIONS)),
            counters: Mutex::new(ErrorCounters::default()),
            discarded_packet: Mutex::new(None),
            heartbeat_source,
            heartbeat_sink,
            non_rmap_sink,
            receive_queue,
            running: AtomicBool::new(true),
        }
    }

    pub fn error_counters(&self) -> ErrorCounters {
        *self.counters.lock().unwrap()
    }

    pub fn active_transactions(&self) -> usize {
        self.table.lock().unwrap().active_transactions()
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Issue a write command. `options.reply_mode` governs whether this call
    /// blocks for a confirmation. `timeout = None` waits indefinitely.
    pub fn write(
        &self,
        target: &RmapTargetNode,
        options: RMapOptions,
        memory_address: u32,
        extended_address: u8,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> RmapResult {
        if data.is_empty() || data.len() > BUFFER_SIZE {
            return RmapResult::new(RmapResultType::InvalidParameters, 0, ErrorStatusCode::Unknown);
        }
        self.execute(target, options, Operation::Write, memory_address, extended_address, data, 0, timeout).0
    }

    /// Issue a read command; always blocking, always with `reply_mode`
    /// forced true. `buffer` receives up to `buffer.len()` bytes.
    /// `timeout = None` waits indefinitely.
    pub fn read(
        &self,
        target: &RmapTargetNode,
        options: RMapOptions,
        memory_address: u32,
        extended_address: u8,
        buffer: &mut [u8],
        timeout: Option<Duration>,
    ) -> RmapResult {
        if buffer.is_empty() {
            return RmapResult::new(RmapResultType::InvalidParameters, 0, ErrorStatusCode::Unknown);
        }
        let options = RMapOptions { reply_mode: true, ..options };
        let requested_len = buffer.len() as u32;
        let (result, payload) = self.execute(
            target,
            options,
            Operation::Read,
            memory_address,
            extended_address,
            &[],
            requested_len,
            timeout,
        );
        let n = payload.len().min(buffer.len());
        buffer[..n].copy_from_slice(&payload[..n]);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn execute(
        &self,
        target: &RmapTargetNode,
        options: RMapOptions,
        operation: Operation,
        memory_address: u32,
        extended_address: u8,
        data: &[u8],
        requested_read_len: u32,
        timeout: Option<Duration>,
    ) -> (RmapResult, Vec<u8>) {
        let _op_guard = self.operation_lock.lock().unwrap();

        let index = match self.table.lock().unwrap().get_free_transaction() {
            Some(i) => i,
            None => {
                return (
                    RmapResult::new(RmapResultType::NoFreeTransactions, 0, ErrorStatusCode::Unknown),
                    Vec::new(),
                )
            }
        };

        let transaction_id = self.table.lock().unwrap().next_available_transaction_id();

        let mut packet = RmapPacket::new();
        packet.spw_targets = target.target_spw_address.clone();
        packet.target_logical_address = target.target_logical_address;
        packet.destination_key = target.destination_key;
        packet.set_reply_address(&target.reply_address);
        packet.initiator_logical_address = self.initiator_logical_address;
        packet.extended_address = extended_address;
        packet.transaction_identifier = transaction_id;
        packet.address = memory_address;
        packet.instruction = InstructionField::new(
            PacketType::Command,
            operation,
            options.verify_mode,
            options.reply_mode,
            options.increment_mode,
            packet.instruction.reply_address_length_units(),
        );
        match operation {
            Operation::Write => {
                packet.data = data.to_vec();
                packet.data_length = data.len() as u32;
            }
            Operation::Read => {
                packet.data_length = requested_read_len;
            }
        }

        {
            let mut table = self.table.lock().unwrap();
            let t = table.get_mut(index);
            t.transaction_id = transaction_id;
            t.target_logical_address = target.target_logical_address;
            t.initiator_logical_address = self.initiator_logical_address;
            t.timeout = timeout;
            t.blocking_mode = options.reply_mode;
            t.command_packet = packet.clone();
        }

        let mut driver = self.driver.lock().unwrap();
        let mut tx = match driver.request_buffer(timeout) {
            Ok(tx) => tx,
            Err(_) => {
                self.table.lock().unwrap().remove_transaction(index);
                return (
                    RmapResult::new(RmapResultType::SendFailed, 0, ErrorStatusCode::Unknown),
                    Vec::new(),
                );
            }
        };

        let is_write = matches!(operation, Operation::Write);
        let encoded_len = match packet.construct_packet(tx.data_mut(), is_write) {
            Ok(n) => n,
            Err(_) => {
                self.table.lock().unwrap().remove_transaction(index);
                return (
                    RmapResult::new(RmapResultType::SendFailed, 0, ErrorStatusCode::Unknown),
                    Vec::new(),
                );
            }
        };
        let _ = encoded_len;
        tx.set_end_marker(crate::spacewire::EndMarker::Eop);

        let send_result = driver.send(tx, timeout);
        drop(driver);

        if send_result != DriverResult::Success {
            self.table.lock().unwrap().remove_transaction(index);
            return (
                RmapResult::new(RmapResultType::SendFailed, 0, ErrorStatusCode::Unknown),
                Vec::new(),
            );
        }

        {
            let mut table = self.table.lock().unwrap();
            table.get_mut(index).state = TransactionState::CommandSent;
        }

        if !options.reply_mode {
            // Fire-and-forget: nothing more to correlate. The caller cannot
            // distinguish execution outcome.
            self.table.lock().unwrap().remove_transaction(index);
            return (
                RmapResult::new(RmapResultType::Success, 0, ErrorStatusCode::CommandExecutedSuccessfully),
                Vec::new(),
            );
        }

        drop(_op_guard);

        // Block on the slot's reply semaphore without holding the table
        // lock: the receive thread needs that lock to resolve other
        // transactions while this caller waits.
        let got_reply = self.table_semaphore_acquire(index, timeout);

        let (result, payload) = {
            let table = self.table.lock().unwrap();
            let state = table.get(index).state;
            if got_reply && state == TransactionState::ReplyReceived {
                let status = table.get(index).reply_packet.status;
                let error_code = ErrorStatusCode::from_byte(status);
                if matches!(operation, Operation::Read) {
                    let read_bytes = table.get(index).reply_packet.data_length;
                    let data = table.get(index).reply_packet.data.clone();
                    let result = if !error_code.is_success() {
                        RmapResult::new(RmapResultType::ExecutionFailed, 0, error_code)
                    } else if read_bytes < requested_read_len {
                        RmapResult::new(RmapResultType::ReplyTooShort, read_bytes, error_code)
                    } else {
                        RmapResult::new(RmapResultType::Success, read_bytes, error_code)
                    };
                    (result, data)
                } else if error_code.is_success() {
                    (RmapResult::new(RmapResultType::Success, 0, error_code), Vec::new())
                } else {
                    (RmapResult::new(RmapResultType::ExecutionFailed, 0, error_code), Vec::new())
                }
            } else {
                (
                    RmapResult::new(RmapResultType::Timeout, 0, ErrorStatusCode::Unknown),
                    Vec::new(),
                )
            }
        };

        self.table.lock().unwrap().remove_transaction(index);
        (result, payload)
    }

    /// Block on a transaction's reply semaphore without holding the table
    /// lock for the duration of the wait.
    fn table_semaphore_acquire(&self, index: usize, timeout: Option<Duration>) -> bool {
        // SAFETY note: the reply semaphore itself is internally synchronized
        // (condvar-backed); we only need the table lock to get a reference
        // to it, not to hold for the wait. Transactions are hand-off after
        // `CommandSent`: only the receive thread writes until the semaphore
        // is released, so reading the semaphore reference here is sound.
        let sem_ptr: *const crate::semaphore::BinarySemaphore = {
            let table = self.table.lock().unwrap();
            &table.get(index).reply_lock as *const _
        };
        // SAFETY: the transaction slot (and its semaphore) is not reset
        // until this function returns and the caller removes it under the
        // table lock, so the pointer remains valid for this call.
        unsafe { (*sem_ptr).acquire(timeout) }
    }

    /// Process exactly one packet from the dispatcher's RMAP queue, if one
    /// is available within `timeout`. Returns `true` if a packet was
    /// handled (successfully or not).
    pub fn receive_once(&self, timeout: Duration) -> bool {
        self.heartbeat_sink.send(
            self.heartbeat_source,
            deadline_for(RECEIVE_TIMEOUT, HEARTBEAT_TOLERANCE),
        );

        let buffer = match self.receive_queue.receive(Some(timeout)) {
            Some(b) => b,
            None => return false,
        };

        let (packet, extraction) =
            RmapPacket::extract_reply_packet(buffer.as_slice(), self.initiator_logical_address);

        match extraction {
            ExtractionResult::Success => {
                let resolved = self.table.lock().unwrap().resolve_transaction(
                    packet.transaction_identifier,
                    packet.target_logical_address,
                    packet.initiator_logical_address,
                );
                match resolved {
                    Some(index) => {
                        let mut table = self.table.lock().unwrap();
                        let t = table.get_mut(index);
                        t.reply_packet = packet;
                        t.reply_buffer = Some(buffer);
                        t.state = TransactionState::ReplyReceived;
                        t.release_transaction();
                    }
                    None => {
                        log::debug!(
                            "discarding reply for unknown transaction {}",
                            packet.transaction_identifier
                        );
                        self.discarded_packet.lock().unwrap().replace(packet);
                        self.counters.lock().unwrap().discarded_received_packets += 1;
                    }
                }
            }
            ExtractionResult::CrcError => {
                log::warn!("RMAP reply failed CRC verification, discarding");
                self.counters.lock().unwrap().erroneous_reply_packets += 1;
            }
            ExtractionResult::Invalid | ExtractionResult::IncorrectAddress => {
                log::trace!("non-RMAP or malformed packet on RMAP receive queue");
                self.counters.lock().unwrap().non_rmap_packet_received += 1;
                if let Some(sink) = &self.non_rmap_sink {
                    sink.publish(buffer.as_slice());
                }
            }
        }
        true
    }

    /// Run the receive loop until `stop()` is called. Intended to be spawned
    /// on its own thread via `Arc<Self>`.
    pub fn run_receive_loop(self: Arc<Self>)
    where
        D: 'static,
    {
        while self.running.load(Ordering::Acquire) {
            self.receive_once(RECEIVE_TIMEOUT);
        }
    }
}
