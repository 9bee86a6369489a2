//! ID universe registry.
//!
//! # Responsibility
//! - Track the registered IDs of one family in registration order.
//! - Hand out registration sequence numbers used to anchor complement buckets.
//!
//! # Invariants
//! - Sequence numbers only grow until `compact`, which renumbers live entries densely.
//! - A retired ID keeps a tombstone slot until the next compaction.
//! - Re-registering a retired ID gives it a fresh sequence number.

use std::collections::{BTreeSet, HashMap};

/// Registered IDs of one family plus their registration sequence numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<Option<u64>>,
    index: HashMap<u64, u64>,
    tombstones: BTreeSet<u64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a registry from a persisted, compacted ID list.
    ///
    /// Returns the first duplicated ID when the list is not a set.
    pub fn from_ids(ids: Vec<u64>) -> Result<Self, u64> {
        let mut index = HashMap::with_capacity(ids.len());
        for (seq, id) in ids.iter().enumerate() {
            if index.insert(*id, seq as u64).is_some() {
                return Err(*id);
            }
        }
        Ok(Self {
            entries: ids.into_iter().map(Some).collect(),
            index,
            tombstones: BTreeSet::new(),
        })
    }

    /// Number of live IDs.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index.contains_key(&id)
    }

    pub fn seq_of(&self, id: u64) -> Option<u64> {
        self.index.get(&id).copied()
    }

    /// Sequence number the next registration will receive.
    pub fn next_seq(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Number of live IDs whose sequence number is below `seq`.
    pub fn live_below(&self, seq: u64) -> usize {
        let bounded = seq.min(self.next_seq());
        bounded as usize - self.tombstones.range(..bounded).count()
    }

    /// Registers `id`; returns `false` when it was already live.
    pub fn register(&mut self, id: u64) -> bool {
        if self.index.contains_key(&id) {
            return false;
        }
        let seq = self.next_seq();
        self.entries.push(Some(id));
        self.index.insert(id, seq);
        true
    }

    /// Retires `id`; returns `false` when it was not live.
    pub fn retire(&mut self, id: u64) -> bool {
        let Some(seq) = self.index.remove(&id) else {
            return false;
        };
        self.entries[seq as usize] = None;
        self.tombstones.insert(seq);
        true
    }

    /// Live IDs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().flatten().copied()
    }

    /// Live IDs with their sequence numbers, starting at `seq`.
    pub fn iter_from(&self, seq: u64) -> impl Iterator<Item = (u64, u64)> + '_ {
        let start = (seq as usize).min(self.entries.len());
        self.entries[start..]
            .iter()
            .enumerate()
            .filter_map(move |(offset, id)| id.map(|id| ((start + offset) as u64, id)))
    }

    /// Live IDs with sequence numbers below `seq`.
    pub fn iter_below(&self, seq: u64) -> impl Iterator<Item = u64> + '_ {
        let end = (seq as usize).min(self.entries.len());
        self.entries[..end].iter().flatten().copied()
    }

    pub fn has_tombstones(&self) -> bool {
        !self.tombstones.is_empty()
    }

    /// Sequence number `seq` will map to after `compact`.
    pub fn compacted_seq(&self, seq: u64) -> u64 {
        let bounded = seq.min(self.next_seq());
        bounded - self.tombstones.range(..bounded).count() as u64
    }

    /// Drops tombstones and renumbers live entries densely.
    pub fn compact(&mut self) {
        if self.tombstones.is_empty() {
            return;
        }
        self.entries.retain(Option::is_some);
        self.index = self
            .entries
            .iter()
            .flatten()
            .enumerate()
            .map(|(seq, id)| (*id, seq as u64))
            .collect();
        self.tombstones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Registry;

    #[test]
    fn register_is_idempotent_and_assigns_increasing_seqs() {
        let mut registry = Registry::new();
        assert!(registry.register(10));
        assert!(registry.register(3));
        assert!(!registry.register(10));
        assert_eq!(registry.seq_of(10), Some(0));
        assert_eq!(registry.seq_of(3), Some(1));
        assert_eq!(registry.next_seq(), 2);
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec![10, 3]);
    }

    #[test]
    fn retire_leaves_tombstone_until_compaction() {
        let mut registry = Registry::new();
        for id in [1, 2, 3, 4] {
            registry.register(id);
        }
        assert!(registry.retire(2));
        assert!(!registry.retire(2));
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.next_seq(), 4);
        assert_eq!(registry.live_below(3), 2);
        assert_eq!(registry.compacted_seq(3), 2);

        registry.compact();
        assert_eq!(registry.next_seq(), 3);
        assert_eq!(registry.seq_of(3), Some(1));
        assert_eq!(registry.seq_of(4), Some(2));
        assert!(!registry.has_tombstones());
    }

    #[test]
    fn reregistered_id_moves_to_the_end() {
        let mut registry = Registry::new();
        registry.register(1);
        registry.register(2);
        registry.retire(1);
        registry.register(1);
        assert_eq!(registry.seq_of(1), Some(2));
        assert_eq!(
            registry.iter_from(1).collect::<Vec<_>>(),
            vec![(1, 2), (2, 1)]
        );
    }

    #[test]
    fn from_ids_rejects_duplicates() {
        assert_eq!(Registry::from_ids(vec![4, 5, 4]), Err(4));
        let registry = Registry::from_ids(vec![9, 8]).expect("distinct ids");
        assert_eq!(registry.seq_of(8), Some(1));
    }
}
