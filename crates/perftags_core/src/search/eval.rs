//! Recursive expression evaluator.
//!
//! # Responsibility
//! - Evaluate an `Expr` against any source of tag memberships.
//! - Apply conditional-union filters per candidate.
//!
//! # Invariants
//! - The result depends only on bucket membership, never on bucket encoding.
//! - A condition with a zero denominator rejects its candidate.

use super::expr::{Condition, Expr};
use super::set::TaggableSet;
use crate::index::registry::Registry;
use crate::index::TagIndex;
use crate::model::pairing::{Family, TagId};

/// Read access the evaluator needs from an index.
pub trait MembershipSource {
    /// Live taggable universe.
    fn taggables(&self) -> &Registry;

    /// Members of `tag`'s bucket; empty for unknown tags.
    fn tag_members(&self, tag: TagId) -> TaggableSet;
}

impl MembershipSource for TagIndex {
    fn taggables(&self) -> &Registry {
        self.universe(Family::Taggable)
    }

    fn tag_members(&self, tag: TagId) -> TaggableSet {
        if !self.universe(Family::Tag).contains(tag) {
            return TaggableSet::empty();
        }
        match self.bucket(Family::Tag, tag) {
            Some(set) => TaggableSet::from_membership(set, self.taggables()),
            None => TaggableSet::empty(),
        }
    }
}

pub fn evaluate<S: MembershipSource + ?Sized>(expr: &Expr, source: &S) -> TaggableSet {
    match expr {
        Expr::Tag(id) => source.tag_members(*id),
        Expr::Taggables(ids) => TaggableSet::from_ids(ids.iter().copied(), source.taggables()),
        Expr::Universe => TaggableSet::universe(),
        Expr::Empty => TaggableSet::empty(),
        Expr::Complement(inner) => evaluate(inner, source).complement(),
        Expr::Union(exprs) => exprs
            .iter()
            .fold(TaggableSet::empty(), |acc, expr| acc.union(evaluate(expr, source))),
        Expr::Intersect(exprs) => exprs
            .iter()
            .fold(TaggableSet::universe(), |acc, expr| {
                acc.intersect(evaluate(expr, source))
            }),
        Expr::Difference(lhs, rhs) => evaluate(lhs, source).difference(evaluate(rhs, source)),
        Expr::SymmetricDifference(lhs, rhs) => {
            evaluate(lhs, source).symmetric_difference(evaluate(rhs, source))
        }
        Expr::ConditionalExpressionListUnion {
            candidates,
            conditions,
        } => evaluate_conditional(candidates, conditions, source),
    }
}

fn evaluate_conditional<S: MembershipSource + ?Sized>(
    candidates: &[Expr],
    conditions: &[Condition],
    source: &S,
) -> TaggableSet {
    let universe = source.taggables();
    let mut surviving: Vec<TaggableSet> = candidates
        .iter()
        .map(|candidate| evaluate(candidate, source))
        .collect();

    for condition in conditions {
        if surviving.is_empty() {
            break;
        }
        match condition {
            Condition::Count {
                comparator,
                threshold,
                compare,
            } => {
                let compare = evaluate(compare, source);
                surviving.retain(|candidate| {
                    let hits = candidate.intersection_len(&compare, universe) as u64;
                    comparator.holds(hits, *threshold)
                });
            }
            Condition::Percentage {
                comparator,
                ratio,
                compare,
            } => {
                let compare = evaluate(compare, source);
                surviving.retain(|candidate| {
                    let total = candidate.len(universe);
                    let hits = candidate.intersection_len(&compare, universe);
                    ratio_holds(hits, total, |value| comparator.holds(value, *ratio))
                });
            }
            Condition::FilteredPercentage {
                comparator,
                ratio,
                filter,
                compare,
            } => {
                let filter = evaluate(filter, source);
                let compare = evaluate(compare, source);
                surviving.retain(|candidate| {
                    let filtered = candidate.clone().intersect(filter.clone());
                    let total = filtered.len(universe);
                    let hits = filtered.intersection_len(&compare, universe);
                    ratio_holds(hits, total, |value| comparator.holds(value, *ratio))
                });
            }
        }
    }

    surviving
        .into_iter()
        .fold(TaggableSet::empty(), TaggableSet::union)
}

fn ratio_holds(hits: usize, total: usize, check: impl Fn(f32) -> bool) -> bool {
    if total == 0 {
        return false;
    }
    check(hits as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use super::{evaluate, MembershipSource};
    use crate::index::registry::Registry;
    use crate::search::expr::{Comparator, Condition, Expr};
    use crate::search::set::TaggableSet;
    use std::collections::HashMap;

    struct FixedSource {
        universe: Registry,
        tags: HashMap<u64, Vec<u64>>,
    }

    impl FixedSource {
        fn new(tags: Vec<(u64, Vec<u64>)>) -> Self {
            let mut universe = Registry::new();
            for id in 1..=6 {
                universe.register(id);
            }
            Self {
                universe,
                tags: tags.into_iter().collect(),
            }
        }
    }

    impl MembershipSource for FixedSource {
        fn taggables(&self) -> &Registry {
            &self.universe
        }

        fn tag_members(&self, tag: u64) -> TaggableSet {
            let ids = self.tags.get(&tag).cloned().unwrap_or_default();
            TaggableSet::from_ids(ids, &self.universe)
        }
    }

    fn count_condition(comparator: Comparator, threshold: u64) -> Expr {
        Expr::ConditionalExpressionListUnion {
            candidates: vec![Expr::tag(1), Expr::tag(2)],
            conditions: vec![Condition::Count {
                comparator,
                threshold,
                compare: Expr::Universe,
            }],
        }
    }

    #[test]
    fn count_threshold_keeps_whole_candidates() {
        let source = FixedSource::new(vec![(1, vec![1, 2, 3, 4]), (2, vec![4, 5, 6])]);
        let run = |expr: Expr| evaluate(&expr, &source).into_sorted_ids(&source.universe);
        assert_eq!(run(count_condition(Comparator::Greater, 3)), vec![1, 2, 3, 4]);
        assert_eq!(
            run(count_condition(Comparator::GreaterOrEqual, 3)),
            vec![1, 2, 3, 4, 5, 6]
        );
        assert_eq!(run(count_condition(Comparator::Less, 4)), vec![4, 5, 6]);
    }

    #[test]
    fn empty_candidate_fails_percentage_conditions() {
        let source = FixedSource::new(vec![(1, vec![1, 2])]);
        let expr = Expr::ConditionalExpressionListUnion {
            candidates: vec![Expr::tag(1), Expr::tag(9)],
            conditions: vec![Condition::Percentage {
                comparator: Comparator::GreaterOrEqual,
                ratio: 0.0,
                compare: Expr::Universe,
            }],
        };
        assert_eq!(
            evaluate(&expr, &source).into_sorted_ids(&source.universe),
            vec![1, 2]
        );
    }

    #[test]
    fn empty_intersect_is_the_universe() {
        let source = FixedSource::new(Vec::new());
        assert_eq!(evaluate(&Expr::intersect([]), &source).len(&source.universe), 6);
        assert!(evaluate(&Expr::union([]), &source).is_empty(&source.universe));
    }
}
