//! Copy-on-write staging of one mutation batch.
//!
//! Buckets touched by a batch are cloned on first touch and mutated here, so a
//! rejected or failed batch leaves the index untouched. `finish` turns the
//! staged buckets into a `ChangeSet`.

use crate::index::change::{BucketChange, ChangeSet, UniverseChange};
use crate::index::membership::MembershipSet;
use crate::index::registry::Registry;
use crate::index::TagIndex;
use crate::model::pairing::{Family, TagId, TaggableId};
use std::collections::BTreeMap;

pub(crate) struct Staging<'a> {
    index: &'a TagIndex,
    buckets: BTreeMap<(Family, u64), Option<MembershipSet>>,
    retired: BTreeMap<Family, Vec<u64>>,
}

impl<'a> Staging<'a> {
    pub(crate) fn new(index: &'a TagIndex) -> Self {
        Self {
            index,
            buckets: BTreeMap::new(),
            retired: BTreeMap::new(),
        }
    }

    pub(crate) fn insert_pairing(&mut self, tag: TagId, taggable: TaggableId) {
        let index = self.index;
        self.bucket_mut(Family::Tag, tag)
            .insert(taggable, index.universe(Family::Taggable));
        self.bucket_mut(Family::Taggable, taggable)
            .insert(tag, index.universe(Family::Tag));
    }

    pub(crate) fn delete_pairing(&mut self, tag: TagId, taggable: TaggableId) {
        let index = self.index;
        self.bucket_mut(Family::Tag, tag)
            .remove(taggable, index.universe(Family::Taggable));
        self.bucket_mut(Family::Taggable, taggable)
            .remove(tag, index.universe(Family::Tag));
    }

    pub(crate) fn toggle_pairing(&mut self, tag: TagId, taggable: TaggableId) {
        let index = self.index;
        let paired = self
            .bucket_mut(Family::Tag, tag)
            .toggle(taggable, index.universe(Family::Taggable));
        let reverse = self.bucket_mut(Family::Taggable, taggable);
        if paired {
            reverse.insert(tag, index.universe(Family::Tag));
        } else {
            reverse.remove(tag, index.universe(Family::Tag));
        }
    }

    /// Unlinks `id` from every opposite bucket, drops its own bucket and
    /// schedules its retirement; unknown or already retired IDs are ignored.
    pub(crate) fn retire(&mut self, family: Family, id: u64) {
        let index = self.index;
        if !index.universe(family).contains(id) {
            return;
        }
        let retired = self.retired.entry(family).or_default();
        if retired.contains(&id) {
            return;
        }
        retired.push(id);

        let members = match self.buckets.get(&(family, id)) {
            Some(Some(set)) => set.members(index.universe(family.opposite())),
            Some(None) => Vec::new(),
            None => index.members(family, id),
        };
        for member in members {
            self.bucket_mut(family.opposite(), member).forget(id);
        }
        self.buckets.insert((family, id), None);
    }

    /// Rebalances staged buckets and drops the ones that did not change.
    ///
    /// Buckets are settled against the universes as they stand after this
    /// batch's retirements, so a bucket whose last members retire is dropped.
    pub(crate) fn finish(self) -> ChangeSet {
        let index = self.index;
        let settled: BTreeMap<Family, Registry> = self
            .retired
            .iter()
            .map(|(family, ids)| {
                let mut universe = index.universe(*family).clone();
                for id in ids {
                    universe.retire(*id);
                }
                (*family, universe)
            })
            .collect();

        let mut buckets = Vec::new();
        for ((family, id), staged) in self.buckets {
            let opposite = family.opposite();
            let universe = settled
                .get(&opposite)
                .unwrap_or_else(|| index.universe(opposite));
            let set = staged
                .map(|mut set| {
                    set.rebalance(universe);
                    set
                })
                .filter(|set| !set.is_empty(universe));
            if set.as_ref() == index.bucket(family, id) {
                continue;
            }
            buckets.push(BucketChange { family, id, set });
        }

        let universes = self
            .retired
            .into_iter()
            .map(|(family, ids)| UniverseChange::Retire { family, ids })
            .collect();
        ChangeSet { buckets, universes }
    }

    fn bucket_mut(&mut self, family: Family, id: u64) -> &mut MembershipSet {
        let index = self.index;
        let slot = self
            .buckets
            .entry((family, id))
            .or_insert_with(|| Some(index.bucket(family, id).cloned().unwrap_or_default()));
        slot.get_or_insert_with(MembershipSet::new)
    }
}
