mod common;

use common::{open, seed, tag_pairings, tags_of};
use perftags_core::{Expr, TaggableTags};

#[test]
fn taggables_tags_keep_request_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &tag_pairings(&[(1, &[1, 2]), (2, &[2]), (3, &[1])]));
    engine.insert_taggables(&[9]).unwrap();

    assert_eq!(
        tags_of(&engine, &[2, 9, 1, 404]),
        vec![
            (2, vec![1, 2]),
            (9, Vec::new()),
            (1, vec![1, 3]),
            (404, Vec::new()),
        ]
    );
}

#[test]
fn specified_tags_are_limited_to_the_filter() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(
        &mut engine,
        &tag_pairings(&[(1, &[1]), (2, &[1, 2]), (3, &[1]), (4, &[1])]),
    );

    assert_eq!(
        engine.read_taggables_specified_tags(&[1, 2, 3], &[3, 1, 3]),
        vec![
            TaggableTags {
                taggable: 1,
                tags: vec![1, 3],
            },
            TaggableTags {
                taggable: 2,
                tags: Vec::new(),
            },
            TaggableTags {
                taggable: 3,
                tags: Vec::new(),
            },
        ]
    );
}

#[test]
fn tag_counts_for_single_tag_groups() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(
        &mut engine,
        &tag_pairings(&[(1, &[1, 2, 3]), (2, &[3, 4, 5]), (3, &[2, 3]), (4, &[1])]),
    );

    let groups = vec![vec![1], vec![2], vec![3], vec![4]];
    assert_eq!(
        engine.read_tag_groups_taggable_counts(&groups, None),
        vec![3, 3, 2, 1]
    );
}

#[test]
fn tag_group_counts_are_distinct_and_respect_the_search() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(
        &mut engine,
        &tag_pairings(&[
            (1, &[1, 2, 3, 4]),
            (2, &[3, 4, 5]),
            (3, &[2, 3, 7, 8]),
            (4, &[1]),
        ]),
    );
    let search = Expr::union([Expr::tag(3), Expr::tag(4)]);

    let singles = vec![vec![1], vec![2], vec![3], vec![4]];
    assert_eq!(
        engine.read_tag_groups_taggable_counts(&singles, Some(&search)),
        vec![3, 1, 4, 1]
    );

    let groups = vec![vec![1, 2], vec![2, 3], vec![3, 4]];
    assert_eq!(
        engine.read_tag_groups_taggable_counts(&groups, None),
        vec![5, 6, 5]
    );
    assert_eq!(
        engine.read_tag_groups_taggable_counts(&groups, Some(&search)),
        vec![3, 4, 5]
    );
}

#[test]
fn unknown_tags_count_as_empty_groups() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &tag_pairings(&[(1, &[1, 2])]));

    let groups = vec![vec![77], Vec::new(), vec![1, 77]];
    assert_eq!(
        engine.read_tag_groups_taggable_counts(&groups, None),
        vec![0, 0, 2]
    );
}

#[test]
fn reads_see_dense_buckets_after_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let all: Vec<u64> = (1..=20).collect();
    {
        let mut engine = open(dir.path());
        engine.insert_taggables(&all).unwrap();
        seed(&mut engine, &tag_pairings(&[(1, &all[..19]), (2, &[20])]));
        engine.close().unwrap();
    }

    let engine = open(dir.path());
    assert_eq!(engine.search(&Expr::tag(1)), all[..19].to_vec());
    assert_eq!(tags_of(&engine, &[19, 20]), vec![(19, vec![1]), (20, vec![2])]);
    assert_eq!(
        engine.read_tag_groups_taggable_counts(&[vec![1, 2]], None),
        vec![20]
    );
}
