//! In-memory bidirectional index.
//!
//! # Responsibility
//! - Hold both ID universes and both bucket directions.
//! - Keep the two directions mirror images of each other.
//!
//! # Invariants
//! - `taggable ∈ tag_buckets[tag]` iff `tag ∈ taggable_buckets[taggable]`.
//! - Tag buckets are sets over the taggable universe; taggable buckets are
//!   sets over the tag universe.

pub mod change;
pub mod membership;
pub mod registry;
pub mod shards;

use crate::model::pairing::Family;
use membership::MembershipSet;
use registry::Registry;
use shards::BucketShards;

/// Both universes and both bucket directions.
#[derive(Debug, Clone)]
pub struct TagIndex {
    tags: Registry,
    taggables: Registry,
    tag_buckets: BucketShards,
    taggable_buckets: BucketShards,
}

impl TagIndex {
    pub fn new(shard_count: usize) -> Self {
        Self {
            tags: Registry::new(),
            taggables: Registry::new(),
            tag_buckets: BucketShards::new(shard_count),
            taggable_buckets: BucketShards::new(shard_count),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.tag_buckets.shard_count()
    }

    pub fn universe(&self, family: Family) -> &Registry {
        match family {
            Family::Tag => &self.tags,
            Family::Taggable => &self.taggables,
        }
    }

    pub fn universe_mut(&mut self, family: Family) -> &mut Registry {
        match family {
            Family::Tag => &mut self.tags,
            Family::Taggable => &mut self.taggables,
        }
    }

    /// Buckets owned by IDs of `family`.
    pub fn buckets(&self, family: Family) -> &BucketShards {
        match family {
            Family::Tag => &self.tag_buckets,
            Family::Taggable => &self.taggable_buckets,
        }
    }

    pub fn buckets_mut(&mut self, family: Family) -> &mut BucketShards {
        match family {
            Family::Tag => &mut self.tag_buckets,
            Family::Taggable => &mut self.taggable_buckets,
        }
    }

    /// Bucket of `id` in `family`, if it has any members.
    pub fn bucket(&self, family: Family, id: u64) -> Option<&MembershipSet> {
        self.buckets(family).get(id)
    }

    /// Members of `id`'s bucket, ascending.
    pub fn members(&self, family: Family, id: u64) -> Vec<u64> {
        self.bucket(family, id)
            .map(|set| set.members(self.universe(family.opposite())))
            .unwrap_or_default()
    }

    /// Renumbers both universes, remapping every complement anchor first.
    ///
    /// Shards whose anchors move are marked dirty.
    pub fn compact_universes(&mut self) {
        for family in [Family::Tag, Family::Taggable] {
            if !self.universe(family).has_tombstones() {
                continue;
            }
            let (universe, dependents) = match family {
                Family::Tag => (&mut self.tags, &mut self.taggable_buckets),
                Family::Taggable => (&mut self.taggables, &mut self.tag_buckets),
            };
            for (_, set) in dependents.iter_mut() {
                set.prepare_compaction(universe);
            }
            dependents.mark_complements_dirty();
            universe.compact();
        }
    }
}
