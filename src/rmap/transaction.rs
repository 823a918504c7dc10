// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Fixed-size transaction table: each slot owns a one-shot reply semaphore
// and the command/reply packets for one in-flight RMAP request. No dynamic
// allocation; the table is sized to `MAX_CONCURRENT_TRANSACTIONS` at
// construction.

use std::time::Duration;

use crate::pool::SharedChildPointer;
use crate::semaphore::BinarySemaphore;

use super::packet::RmapPacket;
use super::MAX_TRANSACTION_ID;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    NotInitiated,
    Initiated,
    CommandSent,
    ReplyReceived,
    Timeout,
}

/// One transaction slot. `reply_lock` starts acquired; the receive thread
/// releases it when a correlating reply arrives.
pub struct RmapTransaction {
    pub target_logical_address: u8,
    pub initiator_logical_address: u8,
    pub transaction_id: u16,
    pub timeout: Option<Duration>,
    pub state: TransactionState,
    pub blocking_mode: bool,
    pub command_packet: RmapPacket,
    pub reply_packet: RmapPacket,
    pub reply_lock: BinarySemaphore,
    /// Backing storage for the reply's payload, kept alive until the caller
    /// consumes it.
    pub reply_buffer: Option<SharedChildPointer>,
}

impl RmapTransaction {
    fn new() -> Self {
        Self {
            target_logical_address: 0,
            initiator_logical_address: 0,
            transaction_id: 0,
            timeout: Some(Duration::ZERO),
            state: TransactionState::NotInitiated,
            blocking_mode: false,
            command_packet: RmapPacket::new(),
            reply_packet: RmapPacket::new(),
            reply_lock: BinarySemaphore::new(true),
            reply_buffer: None,
        }
    }

    /// Block the caller until the reply arrives or `timeout` elapses.
    /// `None` waits indefinitely, matching `BoundedQueue::receive`.
    pub fn block_transaction(&self, timeout: Option<Duration>) -> bool {
        self.reply_lock.acquire(timeout)
    }

    pub fn release_transaction(&self) {
        self.reply_lock.release();
    }

    /// Reset this slot to its initial, unused state. The reply semaphore is
    /// replaced (not reused) so a stale release from a racing reply cannot
    /// leak into the slot's next use.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Fixed array of transaction slots with round-robin ID assignment.
pub struct TransactionsList {
    slots: Vec<RmapTransaction>,
    next_id: u32,
}

impl TransactionsList {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| RmapTransaction::new()).collect(),
            next_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots not in `NotInitiated` state.
    pub fn active_transactions(&self) -> usize {
        self.slots
            .iter()
            .filter(|t| t.state != TransactionState::NotInitiated)
            .count()
    }

    fn is_id_in_use(&self, id: u16) -> bool {
        self.slots
            .iter()
            .any(|t| t.state != TransactionState::NotInitiated && t.transaction_id == id)
    }

    /// Advance the monotonic counter modulo `MAX_TRANSACTION_ID`, skipping
    /// any ID currently in use. Terminates because at most `capacity()` IDs
    /// can ever be in use at once.
    pub fn next_available_transaction_id(&mut self) -> u16 {
        loop {
            let candidate = (self.next_id % (MAX_TRANSACTION_ID + 1)) as u16;
            self.next_id = self.next_id.wrapping_add(1);
            if !self.is_id_in_use(candidate) {
                return candidate;
            }
        }
    }

    /// First slot in `NotInitiated` state, marked `Initiated` before return.
    pub fn get_free_transaction(&mut self) -> Option<usize> {
        let index = self
            .slots
            .iter()
            .position(|t| t.state == TransactionState::NotInitiated)?;
        self.slots[index].state = TransactionState::Initiated;
        Some(index)
    }

    pub fn get(&self, index: usize) -> &RmapTransaction {
        &self.slots[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut RmapTransaction {
        &mut self.slots[index]
    }

    /// Match an incoming reply to an in-flight transaction by transaction
    /// ID, the target LA reported in the reply, and the initiator LA
    /// recorded at send time.
    pub fn resolve_transaction(
        &mut self,
        transaction_id: u16,
        target_logical_address: u8,
        initiator_logical_address: u8,
    ) -> Option<usize> {
        self.slots.iter().position(|t| {
            t.state == TransactionState::CommandSent
                && t.transaction_id == transaction_id
                && t.target_logical_address == target_logical_address
                && t.initiator_logical_address == initiator_logical_address
        })
    }

    pub fn remove_transaction(&mut self, index: usize) {
        self.slots[index].reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_transaction_then_reset_is_indistinguishable_from_fresh() {
        let mut table = TransactionsList::new(2);
        let idx = table.get_free_transaction().unwrap();
        table.get_mut(idx).transaction_id = 99;
        table.get_mut(idx).state = TransactionState::CommandSent;
        table.remove_transaction(idx);
        assert_eq!(table.get(idx).state, TransactionState::NotInitiated);
        assert_eq!(table.get(idx).transaction_id, 0);
    }

    #[test]
    fn exhausts_after_capacity_allocations() {
        let mut table = TransactionsList::new(2);
        assert!(table.get_free_transaction().is_some());
        assert!(table.get_free_transaction().is_some());
        assert!(table.get_free_transaction().is_none());
    }

    #[test]
    fn id_assignment_skips_ids_in_use() {
        let mut table = TransactionsList::new(3);
        let a = table.get_free_transaction().unwrap();
        table.get_mut(a).transaction_id = 0;
        table.get_mut(a).state = TransactionState::CommandSent;

        let next = table.next_available_transaction_id();
        assert_ne!(next, 0);
    }

    #[test]
    fn resolve_requires_three_way_match() {
        let mut table = TransactionsList::new(2);
        let idx = table.get_free_transaction().unwrap();
        {
            let t = table.get_mut(idx);
            t.transaction_id = 5;
            t.target_logical_address = 0xAB;
            t.initiator_logical_address = 0xFE;
            t.state = TransactionState::CommandSent;
        }
        assert!(table.resolve_transaction(5, 0xAB, 0xFE).is_some());
        assert!(table.resolve_transaction(5, 0xAC, 0xFE).is_none());
        assert!(table.resolve_transaction(5, 0xAB, 0xFD).is_none());
    }
}
