//! Bounded active set plus FIFO pending queue.

use crate::item::ItemId;
use std::collections::{HashSet, VecDeque};

/// Tracks which items hold a transfer slot and which wait for one.
///
/// The active set never grows beyond `cap`; [`Scheduler::activate`] refuses once it is full.
#[derive(Debug, Clone)]
pub struct Scheduler {
    cap: usize,
    active: HashSet<ItemId>,
    pending: VecDeque<ItemId>,
}

impl Scheduler {
    /// Scheduler allowing `cap` concurrent transfers (at least one).
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            active: HashSet::new(),
            pending: VecDeque::new(),
        }
    }

    /// Concurrency cap.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Whether another transfer may start.
    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.cap
    }

    /// Number of items holding a slot.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Number of queued ids, stale entries included.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` holds a slot.
    pub fn is_active(&self, id: ItemId) -> bool {
        self.active.contains(&id)
    }

    /// Whether `id` waits in the queue.
    pub fn is_pending(&self, id: ItemId) -> bool {
        self.pending.contains(&id)
    }

    /// Claim a slot for `id`. Fails when the set is full or `id` already holds one.
    pub fn activate(&mut self, id: ItemId) -> bool {
        self.has_capacity() && self.active.insert(id)
    }

    /// Free the slot held by `id`.
    pub fn release(&mut self, id: ItemId) -> bool {
        self.active.remove(&id)
    }

    /// Append `id` to the queue tail unless it is already waiting.
    pub fn enqueue(&mut self, id: ItemId) -> bool {
        if self.pending.contains(&id) {
            return false;
        }
        self.pending.push_back(id);
        true
    }

    /// Pop the queue head when a slot is free.
    pub fn next_ready(&mut self) -> Option<ItemId> {
        if self.has_capacity() {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /// Drop `id` from the queue.
    pub fn dequeue(&mut self, id: ItemId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|queued| *queued != id);
        self.pending.len() != before
    }

    /// Forget `id` entirely.
    pub fn forget(&mut self, id: ItemId) {
        self.release(id);
        self.dequeue(id);
    }

    /// Queued ids, head first.
    pub fn pending(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.pending.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_set_respects_cap() {
        let mut scheduler = Scheduler::new(2);
        let ids: Vec<ItemId> = (0..3).map(|_| ItemId::new()).collect();

        assert!(scheduler.activate(ids[0]));
        assert!(!scheduler.activate(ids[0]));
        assert!(scheduler.activate(ids[1]));
        assert!(!scheduler.activate(ids[2]));
        assert_eq!(scheduler.active_len(), 2);

        assert!(scheduler.release(ids[0]));
        assert!(scheduler.activate(ids[2]));
    }

    #[test]
    fn queue_is_fifo_and_gated_by_capacity() {
        let mut scheduler = Scheduler::new(1);
        let (a, b, c) = (ItemId::new(), ItemId::new(), ItemId::new());
        assert!(scheduler.enqueue(a));
        assert!(scheduler.enqueue(b));
        assert!(!scheduler.enqueue(a));
        scheduler.enqueue(c);
        assert!(scheduler.dequeue(b));

        assert_eq!(scheduler.next_ready(), Some(a));
        assert!(scheduler.activate(a));
        assert_eq!(scheduler.next_ready(), None);

        scheduler.forget(a);
        assert_eq!(scheduler.next_ready(), Some(c));
        assert_eq!(scheduler.pending_len(), 0);
    }

    #[test]
    fn zero_cap_is_raised_to_one() {
        assert_eq!(Scheduler::new(0).cap(), 1);
    }
}
