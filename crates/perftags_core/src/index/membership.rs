//! Dual-encoded membership sets.
//!
//! # Responsibility
//! - Store one bucket either as an inclusion list or as a complement
//!   (exclusion list) against a universe snapshot.
//! - Answer membership queries identically under both encodings.
//!
//! # Invariants
//! - A complement bucket's members are exactly the live universe IDs with
//!   `seq < anchor` that are not excluded.
//! - IDs registered at or after `anchor` are never implicit members.
//! - Inserting such an ID first re-anchors the bucket, recording every
//!   intervening ID as an exclusion.

use super::registry::Registry;
use std::collections::HashSet;

/// Above this share of the live universe an inclusion list flips to complement.
const DENSE_NUMERATOR: usize = 3;
/// Below this share of the live universe a complement flips back to inclusion.
const SPARSE_NUMERATOR: usize = 2;
const SHARE_DENOMINATOR: usize = 5;

/// Physical encoding of a membership set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// `physical` lists the members.
    Inclusion,
    /// `physical` lists the non-members among universe entries below `anchor`.
    Complement { anchor: u64 },
}

/// Membership set of one bucket over the opposite family's universe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSet {
    encoding: Encoding,
    physical: HashSet<u64>,
}

impl Default for MembershipSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipSet {
    /// Empty inclusion-encoded set.
    pub fn new() -> Self {
        Self {
            encoding: Encoding::Inclusion,
            physical: HashSet::new(),
        }
    }

    pub fn from_parts(encoding: Encoding, physical: impl IntoIterator<Item = u64>) -> Self {
        Self {
            encoding,
            physical: physical.into_iter().collect(),
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn physical(&self) -> &HashSet<u64> {
        &self.physical
    }

    /// Physical entries in ascending order, for deterministic serialization.
    pub fn sorted_physical(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.physical.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains(&self, id: u64, universe: &Registry) -> bool {
        let Some(seq) = universe.seq_of(id) else {
            return false;
        };
        match self.encoding {
            Encoding::Inclusion => self.physical.contains(&id),
            Encoding::Complement { anchor } => seq < anchor && !self.physical.contains(&id),
        }
    }

    pub fn len(&self, universe: &Registry) -> usize {
        match self.encoding {
            Encoding::Inclusion => self
                .physical
                .iter()
                .filter(|id| universe.contains(**id))
                .count(),
            Encoding::Complement { anchor } => {
                let excluded = self
                    .physical
                    .iter()
                    .filter(|id| universe.seq_of(**id).is_some_and(|seq| seq < anchor))
                    .count();
                universe.live_below(anchor) - excluded
            }
        }
    }

    pub fn is_empty(&self, universe: &Registry) -> bool {
        self.len(universe) == 0
    }

    /// Adds `id`; returns `true` when membership changed.
    ///
    /// Unregistered IDs are ignored.
    pub fn insert(&mut self, id: u64, universe: &Registry) -> bool {
        let Some(seq) = universe.seq_of(id) else {
            return false;
        };
        match self.encoding {
            Encoding::Inclusion => self.physical.insert(id),
            Encoding::Complement { anchor } if seq < anchor => self.physical.remove(&id),
            Encoding::Complement { anchor } => {
                self.reanchor(anchor, universe);
                self.physical.remove(&id)
            }
        }
    }

    /// Removes `id`; returns `true` when membership changed.
    pub fn remove(&mut self, id: u64, universe: &Registry) -> bool {
        if !self.contains(id, universe) {
            return false;
        }
        match self.encoding {
            Encoding::Inclusion => self.physical.remove(&id),
            Encoding::Complement { .. } => self.physical.insert(id),
        }
    }

    /// Flips membership of `id`; returns the new membership.
    pub fn toggle(&mut self, id: u64, universe: &Registry) -> bool {
        if self.contains(id, universe) {
            self.remove(id, universe);
            false
        } else {
            self.insert(id, universe)
        }
    }

    /// Drops every physical trace of `id` ahead of retiring it from the universe.
    pub fn forget(&mut self, id: u64) {
        self.physical.remove(&id);
    }

    /// Members in ascending ID order.
    pub fn members(&self, universe: &Registry) -> Vec<u64> {
        let mut ids: Vec<u64> = match self.encoding {
            Encoding::Inclusion => self
                .physical
                .iter()
                .copied()
                .filter(|id| universe.contains(*id))
                .collect(),
            Encoding::Complement { anchor } => universe
                .iter_below(anchor)
                .filter(|id| !self.physical.contains(id))
                .collect(),
        };
        ids.sort_unstable();
        ids
    }

    /// Re-chooses the encoding that keeps `physical` small.
    pub fn rebalance(&mut self, universe: &Registry) {
        let live = universe.len();
        let members = self.len(universe);
        match self.encoding {
            Encoding::Inclusion if members * SHARE_DENOMINATOR > live * DENSE_NUMERATOR => {
                let physical = universe
                    .iter()
                    .filter(|id| !self.physical.contains(id))
                    .collect();
                self.encoding = Encoding::Complement {
                    anchor: universe.next_seq(),
                };
                self.physical = physical;
            }
            Encoding::Complement { .. }
                if members == 0 || members * SHARE_DENOMINATOR < live * SPARSE_NUMERATOR =>
            {
                self.physical = self.members(universe).into_iter().collect();
                self.encoding = Encoding::Inclusion;
            }
            _ => {}
        }
    }

    /// Rewrites the set for the renumbering `universe.compact()` is about to apply.
    ///
    /// Must be called with the universe as it is before compaction.
    pub fn prepare_compaction(&mut self, universe: &Registry) {
        match self.encoding {
            Encoding::Inclusion => self.physical.retain(|id| universe.contains(*id)),
            Encoding::Complement { anchor } => {
                self.physical
                    .retain(|id| universe.seq_of(*id).is_some_and(|seq| seq < anchor));
                self.encoding = Encoding::Complement {
                    anchor: universe.compacted_seq(anchor),
                };
            }
        }
    }

    fn reanchor(&mut self, anchor: u64, universe: &Registry) {
        for (_, id) in universe.iter_from(anchor) {
            self.physical.insert(id);
        }
        self.encoding = Encoding::Complement {
            anchor: universe.next_seq(),
        };
    }
}
