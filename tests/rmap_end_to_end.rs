// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end RMAP initiator tests against a loopback driver: no real
// SpaceWire link, no protocol dispatcher — replies are handed straight to
// the initiator's receive queue the way a dispatcher listener would.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use spacewire_comms::crc::Crc8Reversed;
use spacewire_comms::heartbeat::{HeartbeatSource, LoggingHeartbeatSink};
use spacewire_comms::pool::{SharedBufferPool, SharedChildPointer};
use spacewire_comms::queue::BoundedQueue;
use spacewire_comms::rmap::packet::{InstructionField, Operation, PacketType};
use spacewire_comms::rmap::{RMapOptions, RmapInitiator, RmapResultType, RmapTargetNode, PROTOCOL_IDENTIFIER};
use spacewire_comms::ser::{load_u16_be, store_u16_be, store_u24_be};
use spacewire_comms::spacewire::{DriverResult, EndMarker, RxBuffer, SpaceWireDriver, TxBuffer};
use spacewire_comms::timecode::TimeCode;

struct FakeTx {
    buf: Vec<u8>,
    end_marker: EndMarker,
}

impl TxBuffer for FakeTx {
    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn set_end_marker(&mut self, marker: EndMarker) {
        self.end_marker = marker;
    }
}

struct FakeRx {
    buf: Vec<u8>,
}

impl RxBuffer for FakeRx {
    fn data(&self) -> &[u8] {
        &self.buf
    }

    fn end_marker(&self) -> EndMarker {
        EndMarker::Eop
    }
}

/// Hands out a fixed-size transmit buffer and records every sent command.
/// Has no real receive path: these tests hand reply bytes straight to the
/// initiator's receive queue instead of round-tripping through a driver.
struct LoopbackDriver {
    max_packet_length: usize,
    sent: Vec<Vec<u8>>,
}

impl LoopbackDriver {
    fn new(max_packet_length: usize) -> Self {
        Self {
            max_packet_length,
            sent: Vec::new(),
        }
    }
}

impl SpaceWireDriver for LoopbackDriver {
    type Tx = FakeTx;
    type Rx = FakeRx;

    fn open(&mut self) -> bool {
        true
    }

    fn close(&mut self) {}

    fn up(&mut self, _timeout: Option<Duration>) -> bool {
        true
    }

    fn down(&mut self, _timeout: Option<Duration>) {}

    fn is_up(&self) -> bool {
        true
    }

    fn request_buffer(&mut self, _timeout: Option<Duration>) -> Result<Self::Tx, DriverResult> {
        Ok(FakeTx {
            buf: vec![0u8; self.max_packet_length],
            end_marker: EndMarker::Unknown,
        })
    }

    fn send(&mut self, buffer: Self::Tx, _timeout: Option<Duration>) -> DriverResult {
        self.sent.push(buffer.buf);
        DriverResult::Success
    }

    fn receive(&mut self, _timeout: Option<Duration>) -> Result<Self::Rx, DriverResult> {
        Err(DriverResult::Timeout)
    }

    fn release_buffer(&mut self, _buffer: Self::Rx) {}

    fn flush_receive_buffer(&mut self) {}

    fn maximum_packet_length(&self) -> usize {
        self.max_packet_length
    }

    fn add_time_code_listener(&mut self, _queue: BoundedQueue<TimeCode>) -> bool {
        false
    }
}

fn write_reply_bytes(initiator_la: u8, target_la: u8, tid: u16, status: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(initiator_la);
    buf.push(PROTOCOL_IDENTIFIER);
    let instr = InstructionField::new(PacketType::Reply, Operation::Write, false, true, false, 0);
    buf.push(instr.0);
    buf.push(status);
    buf.push(target_la);
    let mut tid_buf = [0u8; 2];
    store_u16_be(&mut tid_buf, tid);
    buf.extend_from_slice(&tid_buf);
    let crc = Crc8Reversed::calculate(&buf);
    buf.push(crc);
    buf
}

fn read_reply_bytes(initiator_la: u8, target_la: u8, tid: u16, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(initiator_la);
    buf.push(PROTOCOL_IDENTIFIER);
    let instr = InstructionField::new(PacketType::Reply, Operation::Read, false, true, false, 0);
    buf.push(instr.0);
    buf.push(0x00); // status
    buf.push(target_la);
    let mut tid_buf = [0u8; 2];
    store_u16_be(&mut tid_buf, tid);
    buf.extend_from_slice(&tid_buf);
    buf.push(0x00); // reserved
    let mut len_buf = [0u8; 3];
    store_u24_be(&mut len_buf, data.len() as u32);
    buf.extend_from_slice(&len_buf);
    let header_crc = Crc8Reversed::calculate(&buf);
    buf.push(header_crc);
    buf.extend_from_slice(data);
    let data_crc = Crc8Reversed::calculate(data);
    buf.push(data_crc);
    buf
}

/// Transaction identifier a sent command carried, read back from the
/// driver's recorded bytes (no path, no reply address: tid sits at offset 5).
fn sent_transaction_id(sent: &[u8]) -> u16 {
    load_u16_be(&sent[5..7])
}

struct Fixture {
    initiator: Arc<RmapInitiator<LoopbackDriver>>,
    driver: Arc<Mutex<LoopbackDriver>>,
    receive_queue: BoundedQueue<SharedChildPointer>,
    pool: SharedBufferPool,
    target: RmapTargetNode,
}

fn setup() -> Fixture {
    let driver = Arc::new(Mutex::new(LoopbackDriver::new(64)));
    let receive_queue = BoundedQueue::new(4);
    let initiator = Arc::new(RmapInitiator::new(
        driver.clone(),
        0xFE,
        HeartbeatSource("test-rmap"),
        Arc::new(LoggingHeartbeatSink),
        receive_queue.clone(),
        None,
    ));
    let pool = SharedBufferPool::new(4, 64);
    let target = RmapTargetNode::new("sensor", 0xAB, 0x20, vec![], vec![]);
    Fixture {
        initiator,
        driver,
        receive_queue,
        pool,
        target,
    }
}

impl Fixture {
    fn deliver(&self, bytes: Vec<u8>) {
        let element = self.pool.allocate().expect("pool has free elements");
        element.as_mut_slice()[..bytes.len()].copy_from_slice(&bytes);
        let child = element.get_child(0, 0, bytes.len()).unwrap();
        assert!(self.receive_queue.send(child));
    }
}

#[test]
fn write_with_reply_succeeds() {
    let fx = setup();
    let initiator = fx.initiator.clone();
    let target = fx.target.clone();

    let handle = std::thread::spawn(move || {
        initiator.write(&target, RMapOptions::default(), 0x0001_0000, 0, &[0xDE, 0xAD], Some(Duration::from_secs(2)))
    });

    std::thread::sleep(Duration::from_millis(50));
    let tid = sent_transaction_id(&fx.driver.lock().unwrap().sent[0]);
    fx.deliver(write_reply_bytes(0xFE, 0xAB, tid, 0x00));
    assert!(fx.initiator.receive_once(Duration::from_millis(200)));

    let result = handle.join().unwrap();
    assert_eq!(result.result(), RmapResultType::Success);
}

#[test]
fn read_returns_data() {
    let fx = setup();
    let initiator = fx.initiator.clone();
    let target = fx.target.clone();

    let handle = std::thread::spawn(move || {
        let mut buffer = [0u8; 8];
        let result = initiator.read(&target, RMapOptions::default(), 0x0002_0000, 0, &mut buffer, Some(Duration::from_secs(2)));
        (result, buffer)
    });

    std::thread::sleep(Duration::from_millis(50));
    let tid = sent_transaction_id(&fx.driver.lock().unwrap().sent[0]);
    let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
    fx.deliver(read_reply_bytes(0xFE, 0xAB, tid, &payload));
    assert!(fx.initiator.receive_once(Duration::from_millis(200)));

    let (result, buffer) = handle.join().unwrap();
    assert_eq!(result.result(), RmapResultType::Success);
    assert_eq!(result.read_bytes(), 8);
    assert_eq!(buffer, payload);
}

#[test]
fn timeout_when_target_never_replies() {
    let fx = setup();
    let result = fx.initiator.write(
        &fx.target,
        RMapOptions::default(),
        0x0003_0000,
        0,
        &[0xAA],
        Some(Duration::from_millis(50)),
    );
    assert_eq!(result.result(), RmapResultType::Timeout);
}

#[test]
fn crc_corrupt_reply_is_discarded_and_counted() {
    let fx = setup();
    let initiator = fx.initiator.clone();
    let target = fx.target.clone();

    let handle = std::thread::spawn(move || {
        initiator.write(&target, RMapOptions::default(), 0x0004_0000, 0, &[0x01], Some(Duration::from_millis(150)))
    });

    std::thread::sleep(Duration::from_millis(30));
    let tid = sent_transaction_id(&fx.driver.lock().unwrap().sent[0]);
    let mut bytes = write_reply_bytes(0xFE, 0xAB, tid, 0x00);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF; // corrupt the header CRC
    fx.deliver(bytes);
    assert!(fx.initiator.receive_once(Duration::from_millis(100)));

    let result = handle.join().unwrap();
    assert_eq!(result.result(), RmapResultType::Timeout);
    assert_eq!(fx.initiator.error_counters().erroneous_reply_packets, 1);
}

#[test]
fn replies_resolve_correctly_when_delivered_out_of_order() {
    let fx = setup();

    let initiator1 = fx.initiator.clone();
    let target1 = fx.target.clone();
    let handle1 = std::thread::spawn(move || {
        initiator1.write(&target1, RMapOptions::default(), 0x0005_0000, 0, &[0x11], Some(Duration::from_secs(2)))
    });
    std::thread::sleep(Duration::from_millis(50));

    let initiator2 = fx.initiator.clone();
    let target2 = fx.target.clone();
    let handle2 = std::thread::spawn(move || {
        initiator2.write(&target2, RMapOptions::default(), 0x0006_0000, 0, &[0x22], Some(Duration::from_secs(2)))
    });
    std::thread::sleep(Duration::from_millis(50));

    let (tid1, tid2) = {
        let driver = fx.driver.lock().unwrap();
        assert_eq!(driver.sent.len(), 2);
        (
            sent_transaction_id(&driver.sent[0]),
            sent_transaction_id(&driver.sent[1]),
        )
    };
    assert_ne!(tid1, tid2);

    // Deliver the second transaction's reply first.
    fx.deliver(write_reply_bytes(0xFE, 0xAB, tid2, 0x00));
    assert!(fx.initiator.receive_once(Duration::from_millis(200)));
    let result2 = handle2.join().unwrap();
    assert_eq!(result2.result(), RmapResultType::Success);

    // The first transaction is still waiting on its own reply.
    fx.deliver(write_reply_bytes(0xFE, 0xAB, tid1, 0x00));
    assert!(fx.initiator.receive_once(Duration::from_millis(200)));
    let result1 = handle1.join().unwrap();
    assert_eq!(result1.result(), RmapResultType::Success);
}
