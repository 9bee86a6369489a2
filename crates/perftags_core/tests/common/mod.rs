#![allow(dead_code)]

use perftags_core::{Engine, EngineOptions, PairingMap};
use std::path::Path;

pub fn open(dir: &Path) -> Engine {
    Engine::open(EngineOptions::new(dir.join("db"))).unwrap()
}

pub fn open_with(options: EngineOptions) -> Engine {
    Engine::open(options).unwrap()
}

/// Builds a pairing batch from `(tag, taggables)` rows.
pub fn tag_pairings(rows: &[(u64, &[u64])]) -> PairingMap {
    rows.iter()
        .map(|(tag, taggables)| (*tag, taggables.to_vec()))
        .collect()
}

/// Builds a pairing batch from `(taggable, tags)` rows.
pub fn taggable_pairings(rows: &[(u64, &[u64])]) -> PairingMap {
    let mut by_tag = std::collections::BTreeMap::<u64, Vec<u64>>::new();
    for (taggable, tags) in rows {
        for tag in *tags {
            by_tag.entry(*tag).or_default().push(*taggable);
        }
    }
    by_tag.into_iter().collect()
}

/// Registers every ID the batch references, then inserts it.
pub fn seed(engine: &mut Engine, pairings: &PairingMap) {
    let tags: Vec<u64> = pairings.tags().into_iter().collect();
    let taggables: Vec<u64> = pairings.taggables().into_iter().collect();
    engine.insert_tags(&tags).unwrap();
    engine.insert_taggables(&taggables).unwrap();
    engine.insert_tag_pairings(pairings).unwrap();
}

/// `(taggable, tags)` rows for `ids`, as returned by `read_taggables_tags`.
pub fn tags_of(engine: &Engine, ids: &[u64]) -> Vec<(u64, Vec<u64>)> {
    engine
        .read_taggables_tags(ids)
        .into_iter()
        .map(|entry| (entry.taggable, entry.tags))
        .collect()
}

/// Total size of every file below `dir`.
pub fn dir_size(dir: &Path) -> u64 {
    let mut total = 0;
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.is_dir() {
            total += dir_size(&path);
        } else {
            total += entry.metadata().unwrap().len();
        }
    }
    total
}
