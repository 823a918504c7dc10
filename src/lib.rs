// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Onboard communications middleware for a SpaceWire-connected node.
//
// Three cores, sharing one substrate:
//   - `rmap`       — ECSS-E-ST-50-52C Remote Memory Access Protocol initiator
//   - `dispatcher` — protocol-ID based packet demultiplexer
//   - `swb`        — typed publish/subscribe software bus
//
// `pool`, `queue` and `semaphore` provide the reference-counted shared
// buffers, bounded queues and blocking primitives the three cores are built
// from. `spacewire` declares the driver trait all of them consume; it has no
// implementation here — a concrete SpaceWire link is wired in by the caller.

pub mod spin_lock;
pub mod waiter;

pub mod heartbeat;
pub mod pool;
pub mod queue;
pub mod semaphore;
pub mod spacewire;
pub mod timecode;

pub mod crc;
pub mod ser;

pub mod dispatcher;
pub mod rmap;
pub mod swb;

pub use pool::{ConstSharedBufferPointer, SharedBufferPointer, SharedBufferPool};
pub use queue::BoundedQueue;
pub use semaphore::BinarySemaphore;
