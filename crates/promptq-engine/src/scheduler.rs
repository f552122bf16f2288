// SPDX-FileCopyrightText: 2026 Promptq Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority-ordered admission structure for queued messages.
//!
//! A passive binary heap keyed by `(priority rank, submit sequence)`. The
//! minimum key dispatches next, so priorities dominate and the sequence
//! counter guarantees FIFO within a priority. The scheduler knows nothing
//! about message state; the store re-checks state on every dequeue, which
//! is how lazily-withdrawn (cancelled) entries are skipped.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use uuid::Uuid;

/// One heap entry. Ordering is by `(rank, sequence)` only; the id rides
/// along and is never compared (sequences are unique).
#[derive(Debug, Clone, Copy)]
struct Entry {
    rank: u8,
    sequence: u64,
    id: Uuid,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        (self.rank, self.sequence) == (other.rank, other.sequence)
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.rank, self.sequence).cmp(&(other.rank, other.sequence))
    }
}

/// Min-ordered set of queued message ids.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    heap: BinaryHeap<Reverse<Entry>>,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message. O(log n).
    pub fn push(&mut self, id: Uuid, rank: u8, sequence: u64) {
        self.heap.push(Reverse(Entry { rank, sequence, id }));
    }

    /// Removes and returns the id with the minimum `(rank, sequence)` key.
    pub fn pop(&mut self) -> Option<Uuid> {
        self.heap.pop().map(|Reverse(entry)| entry.id)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn pops_in_priority_then_fifo_order() {
        let mut sched = PriorityScheduler::new();
        let normal = Uuid::new_v4();
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        sched.push(normal, 2, 0);
        sched.push(low, 3, 1);
        sched.push(high, 1, 2);

        assert_eq!(sched.pop(), Some(high));
        assert_eq!(sched.pop(), Some(normal));
        assert_eq!(sched.pop(), Some(low));
        assert_eq!(sched.pop(), None);
    }

    #[test]
    fn fifo_within_equal_priority() {
        let mut sched = PriorityScheduler::new();
        let ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for (seq, id) in ids.iter().enumerate() {
            sched.push(*id, 2, seq as u64);
        }
        for id in &ids {
            assert_eq!(sched.pop(), Some(*id));
        }
    }

    #[test]
    fn empty_scheduler_pops_none() {
        let mut sched = PriorityScheduler::new();
        assert!(sched.is_empty());
        assert_eq!(sched.pop(), None);
    }

    proptest! {
        /// Popping always yields keys in non-decreasing (rank, sequence)
        /// order, for any interleaving of pushes.
        #[test]
        fn pop_order_is_sorted_by_key(ranks in proptest::collection::vec(1u8..=3, 0..64)) {
            let mut sched = PriorityScheduler::new();
            let mut lookup: std::collections::HashMap<Uuid, (u8, u64)> = std::collections::HashMap::new();
            let mut expected: Vec<(u8, u64)> = Vec::new();
            for (seq, rank) in ranks.iter().enumerate() {
                let id = Uuid::new_v4();
                lookup.insert(id, (*rank, seq as u64));
                sched.push(id, *rank, seq as u64);
                expected.push((*rank, seq as u64));
            }
            expected.sort();

            let mut keys = Vec::new();
            while let Some(id) = sched.pop() {
                keys.push(lookup[&id]);
            }
            prop_assert_eq!(keys, expected);
        }
    }
}
