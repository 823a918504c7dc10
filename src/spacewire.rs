// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The SpaceWire driver itself — transmit/receive buffer acquisition and
// release, link up/down, time-code injection — is an external collaborator
// out of scope for this crate. This module only declares the trait the
// RMAP initiator and protocol dispatcher consume, so a concrete driver can
// be plugged in by the caller (or a loopback fake, for tests).

use std::time::Duration;

use crate::timecode::TimeCode;

/// Outcome of a blocking driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverResult {
    Success,
    Failure,
    Timeout,
}

/// Packet-boundary classifier for a transmitted or received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndMarker {
    Partial,
    Eop,
    Eep,
    Unknown,
}

/// A buffer acquired from the driver for transmission.
pub trait TxBuffer {
    fn data_mut(&mut self) -> &mut [u8];
    fn set_end_marker(&mut self, marker: EndMarker);
}

/// A buffer returned by the driver after reception.
pub trait RxBuffer {
    fn data(&self) -> &[u8];
    fn end_marker(&self) -> EndMarker;
}

/// Capability set consumed by the RMAP initiator and protocol dispatcher.
pub trait SpaceWireDriver {
    type Tx: TxBuffer;
    type Rx: RxBuffer;

    fn open(&mut self) -> bool;
    fn close(&mut self);
    /// `None` waits indefinitely, matching `BoundedQueue::receive`.
    fn up(&mut self, timeout: Option<Duration>) -> bool;
    fn down(&mut self, timeout: Option<Duration>);
    fn is_up(&self) -> bool;

    fn request_buffer(&mut self, timeout: Option<Duration>) -> Result<Self::Tx, DriverResult>;
    fn send(&mut self, buffer: Self::Tx, timeout: Option<Duration>) -> DriverResult;

    fn receive(&mut self, timeout: Option<Duration>) -> Result<Self::Rx, DriverResult>;
    fn release_buffer(&mut self, buffer: Self::Rx);
    fn flush_receive_buffer(&mut self);

    fn maximum_packet_length(&self) -> usize;
    fn add_time_code_listener(&mut self, queue: crate::queue::BoundedQueue<TimeCode>) -> bool;
}
