// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Heartbeat contract for worker threads. The external software watchdog
// itself is out of scope (it lives in the OS/runtime layer); this module
// only defines the collaborator interface each worker thread calls into at
// the top of its loop, plus a source identifier so the watchdog can tell
// workers apart.

use std::time::Duration;

/// Identifies which worker thread is reporting. Workers are constructed with
/// one of these; the watchdog (not part of this crate) uses it to track
/// per-thread liveness deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeartbeatSource(pub &'static str);

/// External liveness-watchdog collaborator. A worker thread calls `send` at
/// the top of every loop iteration with a deadline derived from its own
/// blocking timeout plus a small tolerance; the watchdog interprets the
/// absence of a call within that deadline as liveness loss.
pub trait HeartbeatSink: Send + Sync {
    fn send(&self, source: HeartbeatSource, deadline: Duration);
}

/// A watchdog stand-in that only logs; suitable for tests and for systems
/// whose watchdog lives entirely outside process boundaries (e.g. hardware).
#[derive(Default)]
pub struct LoggingHeartbeatSink;

impl HeartbeatSink for LoggingHeartbeatSink {
    fn send(&self, source: HeartbeatSource, deadline: Duration) {
        log::trace!("heartbeat from {:?}, deadline {:?}", source, deadline);
    }
}

/// Compute the heartbeat deadline for a worker blocking up to
/// `receive_timeout`, per the contract in the concurrency model: the
/// blocking timeout plus a small fixed tolerance.
pub fn deadline_for(receive_timeout: Duration, tolerance: Duration) -> Duration {
    receive_timeout + tolerance
}
