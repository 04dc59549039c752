//! A simple concurrent transposition table.
//!
//! Stands in for the engine's real table in the driver and in tests. The
//! replacement rule prefers depth: an incoming entry replaces the stored one
//! when it is at least as deep, or when it is exact and the stored one is not.
//! Offering the same entry twice leaves the table unchanged the second time.

use crate::tt::{Bound, Key, TranspositionTable, TtEntry};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct SharedTable {
    slots: RwLock<HashMap<Key, TtEntry>>,
}

impl SharedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents, for assertions and reporting.
    pub fn snapshot(&self) -> HashMap<Key, TtEntry> {
        self.slots.read().clone()
    }

    fn should_replace(old: &TtEntry, new: &TtEntry) -> bool {
        new.depth >= old.depth || (new.bound == Bound::Exact && old.bound != Bound::Exact)
    }
}

impl TranspositionTable for SharedTable {
    fn save(&self, key: Key, entry: TtEntry) -> bool {
        let mut slots = self.slots.write();
        match slots.get_mut(&key) {
            Some(old) if *old == entry => false,
            Some(old) => {
                if Self::should_replace(old, &entry) {
                    *old = entry;
                    true
                } else {
                    false
                }
            }
            None => {
                slots.insert(key, entry);
                true
            }
        }
    }

    fn probe(&self, key: Key) -> Option<TtEntry> {
        self.slots.read().get(&key).copied()
    }

    fn len(&self) -> usize {
        self.slots.read().len()
    }
}
