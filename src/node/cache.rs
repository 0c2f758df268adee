use std::collections::HashMap;

use crate::utils::types::HashPos;

#[derive(Debug, Clone)]
struct CacheEntry {
    ips: Vec<String>,
    stamp: u64,
}

/// Bounded recency cache over resolved names. Hits and inserts advance a
/// logical clock and stamp the entry; overflow evicts the entry with the
/// oldest stamp.
#[derive(Debug)]
pub struct RecentQueries {
    entries: HashMap<HashPos, CacheEntry>,
    clock: u64,
    capacity: usize,
}

impl RecentQueries {
    pub fn new(capacity: usize) -> RecentQueries {
        RecentQueries {
            entries: HashMap::new(),
            clock: 0,
            capacity,
        }
    }

    /// Returns the cached addresses and refreshes the entry's stamp.
    pub fn get(&mut self, key: HashPos) -> Option<Vec<String>> {
        let entry = self.entries.get_mut(&key)?;
        self.clock += 1;
        entry.stamp = self.clock;
        Some(entry.ips.clone())
    }

    pub fn insert(&mut self, key: HashPos, ips: Vec<String>) {
        self.clock += 1;
        self.entries.insert(
            key,
            CacheEntry {
                ips,
                stamp: self.clock,
            },
        );
        if self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stamp)
                .map(|(key, _)| *key);
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn contains(&self, key: HashPos) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
