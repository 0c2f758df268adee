use std::collections::HashMap;

use crate::node::ring;
use crate::utils::types::{HashPos, RecordSet};

/// Owner-sharded record store. The shard keyed by this node's own id holds
/// the authoritative copy for its arc; every other shard is a replica
/// received from the shard's owner.
#[derive(Debug, Default)]
pub struct DnsStore {
    shards: HashMap<HashPos, RecordSet>,
}

impl DnsStore {
    pub fn new() -> DnsStore {
        DnsStore::default()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.values().all(|shard| shard.is_empty())
    }

    pub fn get(&self, owner: HashPos, key: HashPos) -> Option<&Vec<String>> {
        self.shards.get(&owner)?.get(&key)
    }

    pub fn insert(&mut self, owner: HashPos, key: HashPos, ips: Vec<String>) {
        self.shards.entry(owner).or_default().insert(key, ips);
    }

    /// Merges `records` into the owner's shard, last writer wins per key.
    pub fn merge(&mut self, owner: HashPos, records: RecordSet) {
        let shard = self.shards.entry(owner).or_default();
        for (key, ips) in records {
            shard.insert(key, ips);
        }
    }

    /// Removes and returns every primary record the node with id `own` no
    /// longer owns once `boundary` is its predecessor, i.e. keys outside
    /// `(boundary, own]`.
    pub fn split_departed(&mut self, own: HashPos, boundary: HashPos) -> RecordSet {
        let Some(shard) = self.shards.get_mut(&own) else {
            return RecordSet::new();
        };
        let departed: Vec<HashPos> = shard
            .keys()
            .copied()
            .filter(|&key| !ring::belongs_to(key, boundary, own))
            .collect();
        departed
            .into_iter()
            .filter_map(|key| shard.remove(&key).map(|ips| (key, ips)))
            .collect()
    }

    /// Folds a dead predecessor's replica shard into the primary shard; its
    /// keys are now owned by this node.
    pub fn adopt(&mut self, predecessor: HashPos, own: HashPos) {
        if let Some(orphaned) = self.shards.remove(&predecessor) {
            self.merge(own, orphaned);
        }
    }

    pub fn shard(&self, owner: HashPos) -> Option<&RecordSet> {
        self.shards.get(&owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HashPos, &RecordSet)> {
        self.shards.iter()
    }

    /// Clone of the full map, for replication fan-out and snapshots.
    pub fn view(&self) -> HashMap<HashPos, RecordSet> {
        self.shards.clone()
    }

    /// Replaces the whole map, used when restoring a snapshot.
    pub fn restore(&mut self, shards: HashMap<HashPos, RecordSet>) {
        self.shards = shards;
    }
}
