//! Sharded bucket maps with per-shard persistence phase.
//!
//! # Responsibility
//! - Hold every bucket of one direction (tag→taggables or taggable→tags).
//! - Track which shards hold changes that only the journal has persisted.
//!
//! # Invariants
//! - A bucket lives in shard `id % shard_count`.
//! - Empty buckets are not stored.
//! - A shard moves `Unmodified -> CachedDirty -> Flushed -> Unmodified`.

use super::membership::{Encoding, MembershipSet};
use std::collections::HashMap;

/// Persistence phase of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketPhase {
    /// Shard file on disk matches memory.
    Unmodified,
    /// Memory is ahead of the shard file; the journal covers the difference.
    CachedDirty,
    /// A new shard file is written but the manifest does not reference it yet.
    Flushed,
}

#[derive(Debug, Clone)]
pub struct Shard {
    buckets: HashMap<u64, MembershipSet>,
    phase: BucketPhase,
}

impl Shard {
    fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            phase: BucketPhase::Unmodified,
        }
    }

    pub fn phase(&self) -> BucketPhase {
        self.phase
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets in ascending owner-ID order.
    pub fn sorted_buckets(&self) -> Vec<(u64, &MembershipSet)> {
        let mut buckets: Vec<_> = self.buckets.iter().map(|(id, set)| (*id, set)).collect();
        buckets.sort_unstable_by_key(|(id, _)| *id);
        buckets
    }
}

/// Every bucket of one direction, split into fixed shards.
#[derive(Debug, Clone)]
pub struct BucketShards {
    shards: Vec<Shard>,
}

impl BucketShards {
    /// Creates `shard_count` empty shards; a count of zero is treated as one.
    pub fn new(shard_count: usize) -> Self {
        Self {
            shards: (0..shard_count.max(1)).map(|_| Shard::new()).collect(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard_of(&self, id: u64) -> usize {
        (id % self.shards.len() as u64) as usize
    }

    pub fn shard(&self, index: usize) -> Option<&Shard> {
        self.shards.get(index)
    }

    pub fn get(&self, id: u64) -> Option<&MembershipSet> {
        self.shards[self.shard_of(id)].buckets.get(&id)
    }

    /// Number of stored (non-empty) buckets.
    pub fn bucket_count(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    /// Stores `set` under `id`, or removes the bucket when `set` is `None`.
    ///
    /// Marks the owning shard `CachedDirty`.
    pub fn put(&mut self, id: u64, set: Option<MembershipSet>) {
        let index = self.shard_of(id);
        let shard = &mut self.shards[index];
        match set {
            Some(set) => {
                shard.buckets.insert(id, set);
            }
            None => {
                shard.buckets.remove(&id);
            }
        }
        shard.phase = BucketPhase::CachedDirty;
    }

    /// Installs buckets read from a shard file without changing its phase.
    pub fn load_shard(&mut self, index: usize, buckets: Vec<(u64, MembershipSet)>) {
        if let Some(shard) = self.shards.get_mut(index) {
            shard.buckets.extend(buckets);
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u64, &mut MembershipSet)> {
        self.shards
            .iter_mut()
            .flat_map(|shard| shard.buckets.iter_mut().map(|(id, set)| (*id, set)))
    }

    /// Marks every shard that holds a complement bucket dirty.
    ///
    /// Used when the opposite universe is renumbered.
    pub fn mark_complements_dirty(&mut self) {
        for shard in &mut self.shards {
            let has_complement = shard
                .buckets
                .values()
                .any(|set| matches!(set.encoding(), Encoding::Complement { .. }));
            if has_complement {
                shard.phase = BucketPhase::CachedDirty;
            }
        }
    }

    pub fn dirty_shards(&self) -> Vec<usize> {
        self.shards_in(BucketPhase::CachedDirty)
    }

    pub fn shards_in(&self, phase: BucketPhase) -> Vec<usize> {
        self.shards
            .iter()
            .enumerate()
            .filter(|(_, shard)| shard.phase == phase)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn set_phase(&mut self, index: usize, phase: BucketPhase) {
        if let Some(shard) = self.shards.get_mut(index) {
            shard.phase = phase;
        }
    }

    /// Moves every shard in phase `from` to phase `to`.
    pub fn transition(&mut self, from: BucketPhase, to: BucketPhase) {
        for shard in &mut self.shards {
            if shard.phase == from {
                shard.phase = to;
            }
        }
    }
}
