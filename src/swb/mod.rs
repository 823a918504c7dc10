// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Software Bus: in-process typed publish/subscribe with per-channel
// filtering and a single default-channel fallback.

mod bus;
mod channel;
mod distributor;
mod filter;
mod thread;
mod types;

pub use bus::{AcceptAll, OutgoingValidator, SoftwareBus};
pub use channel::BusChannel;
pub use distributor::{BusDistributor, DistributorCounters};
pub use filter::{FilterNone, MessageFilter, RangeFilter, SubscriptionFilter};
pub use thread::BusHandlerThread;
pub use types::{CopyMode, Message, OperationResult};
