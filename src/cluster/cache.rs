//! Per-worker cache of high-depth entries waiting to be gossiped.
//!
//! The cache keeps the deepest `capacity` entries offered since the last
//! flush. It is a min-heap over depth: when full, a new entry evicts the
//! shallowest held entry only if it is strictly deeper. Among equally shallow
//! entries the oldest is evicted first.
//!
//! Each worker thread owns exactly one cache, so there is no locking here.

use crate::tt::{Depth, KeyedEntry};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Outcome of offering an entry to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// Stored in a free slot.
    Inserted,
    /// Stored in place of the returned, shallower entry.
    Replaced(KeyedEntry),
    /// Not deeper than anything held; dropped.
    Rejected,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: KeyedEntry,
    seq: u64,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    // Reversed so the heap top is the shallowest, then oldest, slot.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .entry
            .depth()
            .cmp(&self.entry.depth())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone)]
pub struct EntryBuffer {
    slots: BinaryHeap<Slot>,
    capacity: usize,
    flush_threshold: usize,
    next_seq: u64,
}

impl EntryBuffer {
    /// Capacity is at least 1; the threshold is clamped into `1..=capacity`.
    pub fn new(capacity: usize, flush_threshold: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: BinaryHeap::with_capacity(capacity),
            capacity,
            flush_threshold: flush_threshold.clamp(1, capacity),
            next_seq: 0,
        }
    }

    pub fn replace(&mut self, entry: KeyedEntry) -> Offer {
        let slot = Slot {
            entry,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        if self.slots.len() < self.capacity {
            self.slots.push(slot);
            return Offer::Inserted;
        }

        match self.slots.peek_mut() {
            Some(mut shallowest) if entry.depth() > shallowest.entry.depth() => {
                let evicted = shallowest.entry;
                *shallowest = slot;
                Offer::Replaced(evicted)
            }
            _ => Offer::Rejected,
        }
    }

    /// Number of entries currently held.
    pub fn fill(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Whether enough entries have accumulated to start a gossip round.
    pub fn is_ready(&self) -> bool {
        self.slots.len() >= self.flush_threshold
    }

    pub fn min_depth(&self) -> Option<Depth> {
        self.slots.peek().map(|slot| slot.entry.depth())
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyedEntry> {
        self.slots.iter().map(|slot| &slot.entry)
    }

    /// Move every held entry into `out`, leaving the cache empty.
    pub fn take_into(&mut self, out: &mut Vec<KeyedEntry>) {
        out.extend(self.slots.drain().map(|slot| slot.entry));
    }
}
