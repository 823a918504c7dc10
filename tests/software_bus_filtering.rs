// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end software bus test: a masked subscription on one channel, a
// default channel catching everything else, driven through the same
// send -> distribute -> receive path a real deployment uses.

use std::sync::Arc;
use std::time::Duration;

use spacewire_comms::heartbeat::{HeartbeatSource, LoggingHeartbeatSink};
use spacewire_comms::pool::SharedBufferPool;
use spacewire_comms::queue::BoundedQueue;
use spacewire_comms::swb::{
    BusChannel, BusDistributor, BusHandlerThread, FilterNone, OperationResult, SoftwareBus,
    SubscriptionFilter,
};

#[test]
fn masked_subscription_routes_matches_and_leaves_rest_to_default() {
    let pool = SharedBufferPool::new(8, 4);
    let incoming_queue = BoundedQueue::new(8);
    let bus = SoftwareBus::new(pool, incoming_queue.clone());

    let distributor: Arc<BusDistributor<u8>> = Arc::new(BusDistributor::new());
    let mut subscribed = SubscriptionFilter::new();
    subscribed.add_subscription(0x10u8, 0xF0u8);
    let channel_a = Arc::new(BusChannel::new(4, Box::new(subscribed)));
    let channel_b = Arc::new(BusChannel::new(4, Box::new(FilterNone)));
    distributor.register_channel(channel_a.clone());
    distributor.set_default_channel(channel_b.clone());

    let handler = BusHandlerThread::new(
        distributor.clone(),
        incoming_queue,
        HeartbeatSource("test-bus"),
        Arc::new(LoggingHeartbeatSink),
    );

    for id in [0x10u8, 0x15, 0x20, 0x1F] {
        assert_eq!(bus.send_slice(id, &[id]), OperationResult::Success);
    }

    handler.handle_all_messages();

    let mut received_a = Vec::new();
    while let Ok(m) = channel_a.receive_message(Some(Duration::ZERO)) {
        received_a.push(m.id);
    }
    let mut received_b = Vec::new();
    while let Ok(m) = channel_b.receive_message(Some(Duration::ZERO)) {
        received_b.push(m.id);
    }

    assert_eq!(received_a, vec![0x10, 0x15, 0x1F]);
    assert_eq!(received_b, vec![0x20]);
    assert_eq!(distributor.counters().incoming(), 4);
    assert_eq!(distributor.counters().forwarded(), 3);
    assert_eq!(distributor.counters().defaulted(), 1);
    assert_eq!(bus.number_of_accepted_messages(), 4);
}
