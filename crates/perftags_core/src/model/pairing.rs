//! Pairing batches and ID families.
//!
//! # Responsibility
//! - Name the two ID universes (`Family`).
//! - Carry an ordered pairing batch (`PairingMap`) from the wire to the engine.
//!
//! # Invariants
//! - `PairingMap` preserves entry order; a tag may appear in several entries and
//!   each entry is applied in turn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Caller-assigned tag identifier.
pub type TagId = u64;

/// Caller-assigned taggable identifier.
pub type TaggableId = u64;

/// One of the two ID universes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    Tag,
    Taggable,
}

impl Family {
    /// The other side of the relation.
    pub fn opposite(self) -> Self {
        match self {
            Self::Tag => Self::Taggable,
            Self::Taggable => Self::Tag,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Taggable => "taggable",
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Taggables listed under one tag in a pairing batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPairing {
    pub tag: TagId,
    pub taggables: Vec<TaggableId>,
}

/// Ordered batch of `(tag, taggables)` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairingMap {
    entries: Vec<TagPairing>,
}

impl PairingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: TagId, taggables: impl Into<Vec<TaggableId>>) {
        self.entries.push(TagPairing {
            tag,
            taggables: taggables.into(),
        });
    }

    pub fn entries(&self) -> &[TagPairing] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates every `(tag, taggable)` edge in batch order.
    pub fn edges(&self) -> impl Iterator<Item = (TagId, TaggableId)> + '_ {
        self.entries
            .iter()
            .flat_map(|entry| entry.taggables.iter().map(move |taggable| (entry.tag, *taggable)))
    }

    /// Distinct tags referenced by the batch.
    pub fn tags(&self) -> BTreeSet<TagId> {
        self.entries.iter().map(|entry| entry.tag).collect()
    }

    /// Distinct taggables referenced by the batch.
    pub fn taggables(&self) -> BTreeSet<TaggableId> {
        self.entries
            .iter()
            .flat_map(|entry| entry.taggables.iter().copied())
            .collect()
    }
}

impl<T: Into<Vec<TaggableId>>> FromIterator<(TagId, T)> for PairingMap {
    fn from_iter<I: IntoIterator<Item = (TagId, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (tag, taggables) in iter {
            map.push(tag, taggables);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::{Family, PairingMap};

    #[test]
    fn edges_follow_batch_order_and_keep_duplicates() {
        let map: PairingMap = [(2, vec![5u64, 4]), (1, vec![3]), (2, vec![5])]
            .into_iter()
            .collect();
        let edges: Vec<_> = map.edges().collect();
        assert_eq!(edges, vec![(2, 5), (2, 4), (1, 3), (2, 5)]);
        assert_eq!(map.tags().into_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(map.taggables().into_iter().collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn families_are_opposites() {
        assert_eq!(Family::Tag.opposite(), Family::Taggable);
        assert_eq!(Family::Taggable.opposite().as_str(), "tag");
    }
}
