mod common;

use common::{open, seed, tag_pairings, tags_of};
use perftags_core::{EngineError, Expr, Family, PairingMap};

fn delete_tags_fixture() -> PairingMap {
    tag_pairings(&[
        (1, &[1, 2, 3]),
        (2, &[2, 3, 4, 5]),
        (3, &[4, 8]),
        (4, &[6, 7]),
        (5, &[6, 8]),
    ])
}

fn expected_after_delete() -> Vec<(u64, Vec<u64>)> {
    vec![
        (1, vec![1]),
        (2, vec![1]),
        (3, vec![1]),
        (4, vec![]),
        (5, vec![]),
        (6, vec![4, 5]),
        (7, vec![4]),
        (8, vec![5]),
    ]
}

#[test]
fn insert_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    let pairings = tag_pairings(&[(1, &[1, 2, 3, 4])]);
    seed(&mut engine, &pairings);
    engine.insert_tag_pairings(&pairings).unwrap();
    engine.insert_taggables(&[1, 2]).unwrap();
    assert_eq!(
        tags_of(&engine, &[1, 2, 3, 4]),
        vec![(1, vec![1]), (2, vec![1]), (3, vec![1]), (4, vec![1])]
    );
}

#[test]
fn pairing_with_unregistered_ids_is_rejected_in_full() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    engine.insert_tags(&[1]).unwrap();
    engine.insert_taggables(&[1, 2]).unwrap();

    let err = engine
        .insert_tag_pairings(&tag_pairings(&[(1, &[1]), (9, &[2])]))
        .unwrap_err();
    match err {
        EngineError::Unregistered { family, ids } => {
            assert_eq!(family, Family::Tag);
            assert_eq!(ids, vec![9]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(tags_of(&engine, &[1, 2]), vec![(1, vec![]), (2, vec![])]);

    let err = engine
        .toggle_tag_pairings(&tag_pairings(&[(1, &[1, 3])]))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Unregistered {
            family: Family::Taggable,
            ..
        }
    ));
    assert_eq!(tags_of(&engine, &[1]), vec![(1, vec![])]);
}

#[test]
fn delete_tags_strips_every_pairing() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &delete_tags_fixture());

    engine.delete_tags(&[2, 3]).unwrap();
    assert_eq!(
        tags_of(&engine, &[1, 2, 3, 4, 5, 6, 7, 8]),
        expected_after_delete()
    );
}

#[test]
fn delete_tags_survives_a_kill() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &delete_tags_fixture());
    engine.delete_tags(&[2, 3]).unwrap();
    engine.terminate();

    let engine = open(dir.path());
    assert_eq!(
        tags_of(&engine, &[1, 2, 3, 4, 5, 6, 7, 8]),
        expected_after_delete()
    );
}

#[test]
fn delete_tags_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &delete_tags_fixture());
    engine.delete_tags(&[2, 3]).unwrap();
    engine.close().unwrap();

    let engine = open(dir.path());
    assert_eq!(
        tags_of(&engine, &[1, 2, 3, 4, 5, 6, 7, 8]),
        expected_after_delete()
    );
}

#[test]
fn deleted_tag_can_no_longer_be_paired() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &tag_pairings(&[(1, &[1]), (2, &[1])]));
    engine.delete_tags(&[2]).unwrap();

    let err = engine
        .insert_tag_pairings(&tag_pairings(&[(2, &[1])]))
        .unwrap_err();
    assert!(matches!(err, EngineError::Unregistered { .. }));

    engine.insert_tags(&[2]).unwrap();
    assert_eq!(tags_of(&engine, &[1]), vec![(1, vec![1])]);
}

#[test]
fn delete_taggables_mirrors_delete_tags() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &tag_pairings(&[(1, &[1, 2, 3]), (2, &[2, 3])]));

    engine.delete_taggables(&[2]).unwrap();
    assert_eq!(
        tags_of(&engine, &[1, 2, 3]),
        vec![(1, vec![1]), (2, vec![]), (3, vec![1, 2])]
    );
    assert_eq!(engine.search(&Expr::tag(1)), vec![1, 3]);
    engine.terminate();

    let engine = open(dir.path());
    assert_eq!(engine.search(&Expr::tag(2)), vec![3]);
    assert_eq!(engine.search(&Expr::Universe), vec![1, 3]);
}

#[test]
fn toggles_accumulate_across_kills() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    engine.insert_tags(&[1, 2, 3, 4, 5, 7, 33, 52, 71]).unwrap();
    engine.insert_taggables(&[1, 2]).unwrap();

    let batches = [
        common::taggable_pairings(&[(1, &[1, 2, 3, 4])]),
        common::taggable_pairings(&[(1, &[1, 3, 5, 7])]),
        common::taggable_pairings(&[(1, &[1, 2, 3, 7])]),
        common::taggable_pairings(&[(2, &[1, 33, 52, 71])]),
    ];
    for batch in &batches {
        engine.toggle_tag_pairings(batch).unwrap();
        engine.terminate();
        engine = open(dir.path());
    }

    assert_eq!(
        tags_of(&engine, &[1, 2]),
        vec![(1, vec![1, 3, 4, 5]), (2, vec![1, 33, 52, 71])]
    );
}

#[test]
fn reinserting_tags_between_toggles_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    let pairings = common::taggable_pairings(&[(1, &[1, 2, 3, 4])]);
    engine.insert_taggables(&[1]).unwrap();
    engine.insert_tags(&[1, 2, 3, 4]).unwrap();
    engine.toggle_tag_pairings(&pairings).unwrap();
    engine.insert_tags(&[1, 2, 3, 4]).unwrap();
    engine.toggle_tag_pairings(&pairings).unwrap();
    assert_eq!(tags_of(&engine, &[1]), vec![(1, vec![])]);
}

#[test]
fn delete_pairings_removes_only_listed_edges() {
    let dir = tempfile::tempdir().unwrap();
    let mut engine = open(dir.path());
    seed(&mut engine, &tag_pairings(&[(1, &[1, 2, 3]), (2, &[1])]));
    engine
        .delete_tag_pairings(&tag_pairings(&[(1, &[2, 3]), (2, &[3])]))
        .unwrap();
    assert_eq!(
        tags_of(&engine, &[1, 2, 3]),
        vec![(1, vec![1, 2]), (2, vec![]), (3, vec![])]
    );
}
