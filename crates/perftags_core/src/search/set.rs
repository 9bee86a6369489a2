//! Intermediate result sets of the evaluator.
//!
//! A `TaggableSet` is either a finite list or "the universe minus a finite
//! list", so complementing is free and dense tag buckets never have to be
//! expanded.
//!
//! # Invariants
//! - `items` only ever holds live universe IDs.

use crate::index::membership::{Encoding, MembershipSet};
use crate::index::registry::Registry;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggableSet {
    complemented: bool,
    items: HashSet<u64>,
}

impl TaggableSet {
    pub fn empty() -> Self {
        Self {
            complemented: false,
            items: HashSet::new(),
        }
    }

    pub fn universe() -> Self {
        Self {
            complemented: true,
            items: HashSet::new(),
        }
    }

    /// Finite set of the live IDs among `ids`.
    pub fn from_ids(ids: impl IntoIterator<Item = u64>, universe: &Registry) -> Self {
        Self {
            complemented: false,
            items: ids.into_iter().filter(|id| universe.contains(*id)).collect(),
        }
    }

    /// View of a stored bucket, without expanding complement encodings.
    pub fn from_membership(set: &MembershipSet, universe: &Registry) -> Self {
        match set.encoding() {
            Encoding::Inclusion => Self::from_ids(set.physical().iter().copied(), universe),
            Encoding::Complement { anchor } => {
                let mut items: HashSet<u64> = set
                    .physical()
                    .iter()
                    .copied()
                    .filter(|id| universe.seq_of(*id).is_some_and(|seq| seq < anchor))
                    .collect();
                items.extend(universe.iter_from(anchor).map(|(_, id)| id));
                Self {
                    complemented: true,
                    items,
                }
            }
        }
    }

    pub fn len(&self, universe: &Registry) -> usize {
        if self.complemented {
            universe.len() - self.items.len()
        } else {
            self.items.len()
        }
    }

    pub fn is_empty(&self, universe: &Registry) -> bool {
        self.len(universe) == 0
    }

    pub fn contains(&self, id: u64, universe: &Registry) -> bool {
        if self.complemented {
            universe.contains(id) && !self.items.contains(&id)
        } else {
            self.items.contains(&id)
        }
    }

    pub fn complement(mut self) -> Self {
        self.complemented = !self.complemented;
        self
    }

    pub fn union(self, other: Self) -> Self {
        match (self.complemented, other.complemented) {
            (false, false) => Self::finite(merge(self.items, other.items)),
            (false, true) => Self::cofinite(minus(other.items, &self.items)),
            (true, false) => Self::cofinite(minus(self.items, &other.items)),
            (true, true) => Self::cofinite(intersection(self.items, &other.items)),
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        match (self.complemented, other.complemented) {
            (false, false) => Self::finite(intersection(self.items, &other.items)),
            (false, true) => Self::finite(minus(self.items, &other.items)),
            (true, false) => Self::finite(minus(other.items, &self.items)),
            (true, true) => Self::cofinite(merge(self.items, other.items)),
        }
    }

    pub fn difference(self, other: Self) -> Self {
        self.intersect(other.complement())
    }

    pub fn symmetric_difference(self, other: Self) -> Self {
        let complemented = self.complemented != other.complemented;
        let items = self
            .items
            .symmetric_difference(&other.items)
            .copied()
            .collect();
        Self {
            complemented,
            items,
        }
    }

    /// `|self ∩ other|` without building the intersection.
    pub fn intersection_len(&self, other: &Self, universe: &Registry) -> usize {
        match (self.complemented, other.complemented) {
            (false, false) => {
                let (small, large) = if self.items.len() <= other.items.len() {
                    (&self.items, &other.items)
                } else {
                    (&other.items, &self.items)
                };
                small.iter().filter(|id| large.contains(id)).count()
            }
            (false, true) => self.items.difference(&other.items).count(),
            (true, false) => other.items.difference(&self.items).count(),
            (true, true) => {
                let excluded = self.items.union(&other.items).count();
                universe.len() - excluded
            }
        }
    }

    /// Materializes the set as ascending IDs.
    pub fn into_sorted_ids(self, universe: &Registry) -> Vec<u64> {
        let mut ids: Vec<u64> = if self.complemented {
            universe
                .iter()
                .filter(|id| !self.items.contains(id))
                .collect()
        } else {
            self.items.into_iter().collect()
        };
        ids.sort_unstable();
        ids
    }

    fn finite(items: HashSet<u64>) -> Self {
        Self {
            complemented: false,
            items,
        }
    }

    fn cofinite(items: HashSet<u64>) -> Self {
        Self {
            complemented: true,
            items,
        }
    }
}

fn merge(mut lhs: HashSet<u64>, rhs: HashSet<u64>) -> HashSet<u64> {
    if lhs.len() < rhs.len() {
        return merge(rhs, lhs);
    }
    lhs.extend(rhs);
    lhs
}

fn minus(mut lhs: HashSet<u64>, rhs: &HashSet<u64>) -> HashSet<u64> {
    lhs.retain(|id| !rhs.contains(id));
    lhs
}

fn intersection(mut lhs: HashSet<u64>, rhs: &HashSet<u64>) -> HashSet<u64> {
    lhs.retain(|id| rhs.contains(id));
    lhs
}

#[cfg(test)]
mod tests {
    use super::TaggableSet;
    use crate::index::membership::{Encoding, MembershipSet};
    use crate::index::registry::Registry;

    fn universe() -> Registry {
        let mut registry = Registry::new();
        for id in 1..=6 {
            registry.register(id);
        }
        registry
    }

    fn set(ids: &[u64], universe: &Registry) -> TaggableSet {
        TaggableSet::from_ids(ids.iter().copied(), universe)
    }

    #[test]
    fn mixed_operations_match_plain_set_algebra() {
        let u = universe();
        let a = set(&[1, 2, 3], &u);
        let not_b = set(&[3, 4], &u).complement();

        assert_eq!(a.clone().union(not_b.clone()).into_sorted_ids(&u), vec![1, 2, 3, 5, 6]);
        assert_eq!(a.clone().intersect(not_b.clone()).into_sorted_ids(&u), vec![1, 2]);
        assert_eq!(a.clone().difference(not_b.clone()).into_sorted_ids(&u), vec![3]);
        assert_eq!(
            a.clone().symmetric_difference(not_b.clone()).into_sorted_ids(&u),
            vec![3, 5, 6]
        );
        assert_eq!(a.intersection_len(&not_b, &u), 2);
        assert_eq!(not_b.len(&u), 4);
    }

    #[test]
    fn complement_bucket_view_excludes_late_registrations() {
        let mut u = universe();
        let bucket = MembershipSet::from_parts(Encoding::Complement { anchor: 6 }, [2]);
        u.register(7);
        let view = TaggableSet::from_membership(&bucket, &u);
        assert_eq!(view.clone().into_sorted_ids(&u), vec![1, 3, 4, 5, 6]);
        assert!(!view.contains(7, &u));
        assert_eq!(view.len(&u), 5);
    }

    #[test]
    fn unregistered_ids_never_enter_a_set() {
        let u = universe();
        assert_eq!(set(&[2, 40], &u).into_sorted_ids(&u), vec![2]);
        assert_eq!(TaggableSet::universe().len(&u), 6);
        assert!(TaggableSet::empty().is_empty(&u));
    }
}
