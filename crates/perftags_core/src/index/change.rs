//! Atomic change sets.
//!
//! A change set is the unit that is journaled before acknowledgment and then
//! applied to memory, both live and during replay.

use super::membership::MembershipSet;
use super::TagIndex;
use crate::model::pairing::Family;

/// Full replacement of one bucket; `None` drops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketChange {
    pub family: Family,
    pub id: u64,
    pub set: Option<MembershipSet>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UniverseChange {
    Register { family: Family, ids: Vec<u64> },
    Retire { family: Family, ids: Vec<u64> },
}

impl UniverseChange {
    pub fn family(&self) -> Family {
        match self {
            Self::Register { family, .. } | Self::Retire { family, .. } => *family,
        }
    }
}

/// Everything one acknowledged batch changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub buckets: Vec<BucketChange>,
    pub universes: Vec<UniverseChange>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty() && self.universes.is_empty()
    }

    pub fn touches_universe(&self, family: Family) -> bool {
        self.universes.iter().any(|change| change.family() == family)
    }
}

impl TagIndex {
    /// Applies registrations, then bucket snapshots, then retirements.
    pub fn apply(&mut self, change: ChangeSet) {
        let mut retirements = Vec::new();
        for universe_change in change.universes {
            match universe_change {
                UniverseChange::Register { family, ids } => {
                    let universe = self.universe_mut(family);
                    for id in ids {
                        universe.register(id);
                    }
                }
                retire @ UniverseChange::Retire { .. } => retirements.push(retire),
            }
        }
        for bucket in change.buckets {
            self.buckets_mut(bucket.family).put(bucket.id, bucket.set);
        }
        for retire in retirements {
            if let UniverseChange::Retire { family, ids } = retire {
                let universe = self.universe_mut(family);
                for id in ids {
                    universe.retire(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BucketChange, ChangeSet, UniverseChange};
    use crate::index::membership::{Encoding, MembershipSet};
    use crate::index::TagIndex;
    use crate::model::pairing::Family;

    #[test]
    fn apply_registers_before_installing_buckets() {
        let mut index = TagIndex::new(4);
        index.apply(ChangeSet {
            buckets: vec![BucketChange {
                family: Family::Tag,
                id: 1,
                set: Some(MembershipSet::from_parts(Encoding::Inclusion, [7])),
            }],
            universes: vec![
                UniverseChange::Register {
                    family: Family::Tag,
                    ids: vec![1],
                },
                UniverseChange::Register {
                    family: Family::Taggable,
                    ids: vec![7],
                },
            ],
        });
        assert_eq!(index.members(Family::Tag, 1), vec![7]);
    }

    #[test]
    fn retirement_hides_members_of_a_complement_bucket() {
        let mut index = TagIndex::new(4);
        index.apply(ChangeSet {
            buckets: vec![BucketChange {
                family: Family::Tag,
                id: 1,
                set: Some(MembershipSet::from_parts(Encoding::Complement { anchor: 2 }, [])),
            }],
            universes: vec![
                UniverseChange::Register {
                    family: Family::Tag,
                    ids: vec![1],
                },
                UniverseChange::Register {
                    family: Family::Taggable,
                    ids: vec![5, 6],
                },
            ],
        });
        assert_eq!(index.members(Family::Tag, 1), vec![5, 6]);

        index.apply(ChangeSet {
            buckets: Vec::new(),
            universes: vec![UniverseChange::Retire {
                family: Family::Taggable,
                ids: vec![5],
            }],
        });
        assert_eq!(index.members(Family::Tag, 1), vec![6]);
    }
}
