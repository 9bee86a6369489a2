//! Database directory lifecycle: open, append, flush, purge.
//!
//! # Responsibility
//! - Rebuild the in-memory index from the manifest's files plus the journal.
//! - Write dirty shards and universes as a new generation and switch to it.
//! - Remove (or archive) every file the current manifest does not reference.
//!
//! # Invariants
//! - New generation files and the new journal exist and are synced before the
//!   manifest switch; a crash on either side of the switch recovers a
//!   complete generation.
//! - Purge never touches the manifest or the files it references.

use super::files::{decode_shard, decode_universe, encode_shard, encode_universe};
use super::journal::{FaultPoint, Journal};
use super::manifest::{FileEntry, Manifest};
use super::{is_atomic_temp, write_atomic, StoreError, StoreLayout, StoreResult};
use crate::index::change::ChangeSet;
use crate::index::membership::MembershipSet;
use crate::index::registry::Registry;
use crate::index::shards::BucketPhase;
use crate::index::TagIndex;
use crate::model::pairing::Family;
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const FAMILIES: [Family; 2] = [Family::Tag, Family::Taggable];

/// Counters describing what `DiskStore::open` found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenReport {
    pub generation: u64,
    pub replayed_records: usize,
    pub discarded_journal_bytes: u64,
    pub purged_files: usize,
}

/// Counters describing one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub generation: u64,
    pub files_written: usize,
}

#[derive(Debug)]
pub struct DiskStore {
    layout: StoreLayout,
    archive_dir: Option<PathBuf>,
    manifest: Manifest,
    journal: Journal,
    dirty_universes: BTreeSet<Family>,
}

impl DiskStore {
    /// Opens (or creates) the database at `root` and rebuilds its index.
    ///
    /// `shard_count` only applies to a new database; an existing one keeps
    /// the count recorded in its manifest.
    pub fn open(
        root: &Path,
        archive_dir: Option<&Path>,
        shard_count: usize,
    ) -> StoreResult<(Self, TagIndex, OpenReport)> {
        fs::create_dir_all(root).map_err(StoreError::io(root))?;
        let layout = StoreLayout::new(root);

        let manifest = match Manifest::load(&layout)? {
            Some(manifest) => {
                if manifest.shard_count != shard_count {
                    warn!(
                        "event=store_open module=store status=shard_count_kept requested={} stored={}",
                        shard_count, manifest.shard_count
                    );
                }
                manifest
            }
            None => {
                let manifest = Manifest::empty(shard_count.max(1));
                manifest.commit(&layout)?;
                manifest
            }
        };

        let mut index = TagIndex::new(manifest.shard_count);
        for family in FAMILIES {
            if let Some(entry) = manifest.universe(family) {
                *index.universe_mut(family) = load_universe(&layout, entry)?;
            }
            for (shard, entry) in manifest.shards(family).iter().enumerate() {
                if let Some(entry) = entry {
                    let buckets = load_shard(&layout, entry, shard, manifest.shard_count)?;
                    index.buckets_mut(family).load_shard(shard, buckets);
                }
            }
        }

        let generation = manifest.generation;
        let (journal, replay) = Journal::open(&layout.journal_path(generation), generation)?;
        let mut dirty_universes = BTreeSet::new();
        let replayed_records = replay.records.len();
        for record in replay.records {
            for family in FAMILIES {
                if record.touches_universe(family) {
                    dirty_universes.insert(family);
                }
            }
            index.apply(record);
        }

        let mut store = Self {
            layout,
            archive_dir: archive_dir.map(Path::to_path_buf),
            manifest,
            journal,
            dirty_universes,
        };
        let purged_files = store.purge()?;

        Ok((
            store,
            index,
            OpenReport {
                generation,
                replayed_records,
                discarded_journal_bytes: replay.discarded_bytes,
                purged_files,
            },
        ))
    }

    pub fn root(&self) -> &Path {
        self.layout.root()
    }

    pub fn generation(&self) -> u64 {
        self.manifest.generation
    }

    pub fn journal_len(&self) -> u64 {
        self.journal.len()
    }

    /// Durably journals `change`; the caller applies it to memory afterwards.
    pub fn append(&mut self, change: &ChangeSet, fault: Option<FaultPoint>) -> StoreResult<()> {
        self.journal.append(change, fault)?;
        for family in FAMILIES {
            if change.touches_universe(family) {
                self.dirty_universes.insert(family);
            }
        }
        Ok(())
    }

    /// True when memory holds changes that only the journal has persisted.
    pub fn has_pending_changes(&self, index: &TagIndex) -> bool {
        !self.dirty_universes.is_empty()
            || FAMILIES
                .iter()
                .any(|family| !index.buckets(*family).dirty_shards().is_empty())
    }

    /// Writes every dirty shard and universe as the next generation.
    pub fn flush(&mut self, index: &mut TagIndex) -> StoreResult<FlushReport> {
        if !self.has_pending_changes(index) {
            return Ok(FlushReport {
                generation: self.manifest.generation,
                files_written: 0,
            });
        }

        let started_at = Instant::now();
        index.compact_universes();
        match self.write_generation(index) {
            Ok(report) => {
                for family in FAMILIES {
                    index
                        .buckets_mut(family)
                        .transition(BucketPhase::Flushed, BucketPhase::Unmodified);
                }
                self.dirty_universes.clear();
                debug!(
                    "event=store_flush module=store status=ok generation={} files_written={} duration_ms={}",
                    report.generation,
                    report.files_written,
                    started_at.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(err) => {
                for family in FAMILIES {
                    index
                        .buckets_mut(family)
                        .transition(BucketPhase::Flushed, BucketPhase::CachedDirty);
                }
                Err(err)
            }
        }
    }

    fn write_generation(&mut self, index: &mut TagIndex) -> StoreResult<FlushReport> {
        let generation = self.manifest.generation + 1;
        let mut next = self.manifest.clone();
        next.generation = generation;
        let mut files_written = 0;

        for family in FAMILIES {
            if self.dirty_universes.contains(&family) {
                let universe = index.universe(family);
                let file = StoreLayout::universe_file(family, generation);
                write_atomic(&self.layout.resolve(&file), &encode_universe(universe.iter()))?;
                *next.universe_mut(family) = Some(FileEntry {
                    file,
                    items: universe.len() as u64,
                });
                files_written += 1;
            }

            for shard_index in index.buckets(family).dirty_shards() {
                let entry = match index.buckets(family).shard(shard_index) {
                    Some(shard) if !shard.is_empty() => {
                        let file = StoreLayout::shard_file(family, shard_index, generation);
                        write_atomic(
                            &self.layout.resolve(&file),
                            &encode_shard(shard.sorted_buckets()),
                        )?;
                        files_written += 1;
                        Some(FileEntry {
                            file,
                            items: shard.len() as u64,
                        })
                    }
                    _ => None,
                };
                next.shards_mut(family)[shard_index] = entry;
                index
                    .buckets_mut(family)
                    .set_phase(shard_index, BucketPhase::Flushed);
            }
        }

        let journal = Journal::create(&self.layout.journal_path(generation), generation)?;
        next.commit(&self.layout)?;
        self.manifest = next;
        self.journal = journal;
        Ok(FlushReport {
            generation,
            files_written,
        })
    }

    /// Deletes every unreferenced file; superseded journals go to the archive
    /// directory when one is configured.
    pub fn purge(&mut self) -> StoreResult<usize> {
        let root = self.layout.root().to_path_buf();
        let mut keep: HashSet<PathBuf> = self
            .manifest
            .referenced_files()
            .into_iter()
            .map(|file| self.layout.resolve(file))
            .collect();
        keep.insert(self.layout.manifest_path());
        keep.insert(self.journal.path().to_path_buf());

        let mut purged = 0;
        for entry in fs::read_dir(&root).map_err(StoreError::io(&root))? {
            let entry = entry.map_err(StoreError::io(&root))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if keep.contains(&path) || !path.is_file() {
                continue;
            }
            if StoreLayout::is_journal_name(&name) {
                self.retire_journal(&path, &name)?;
                purged += 1;
            } else if is_atomic_temp(&name) {
                remove_file(&path)?;
                purged += 1;
            }
        }

        let buckets_dir = self.layout.buckets_dir();
        if buckets_dir.is_dir() {
            for dir in fs::read_dir(&buckets_dir).map_err(StoreError::io(&buckets_dir))? {
                let dir = dir.map_err(StoreError::io(&buckets_dir))?.path();
                if !dir.is_dir() {
                    continue;
                }
                for file in fs::read_dir(&dir).map_err(StoreError::io(&dir))? {
                    let file = file.map_err(StoreError::io(&dir))?.path();
                    if file.is_file() && !keep.contains(&file) {
                        remove_file(&file)?;
                        purged += 1;
                    }
                }
            }
        }

        if purged > 0 {
            debug!(
                "event=store_purge module=store status=ok purged_files={} generation={}",
                purged, self.manifest.generation
            );
        }
        Ok(purged)
    }

    fn retire_journal(&self, path: &Path, name: &str) -> StoreResult<()> {
        let Some(archive_dir) = &self.archive_dir else {
            return remove_file(path);
        };
        fs::create_dir_all(archive_dir).map_err(StoreError::io(archive_dir))?;
        let target = archive_dir.join(name);
        if fs::rename(path, &target).is_err() {
            fs::copy(path, &target).map_err(StoreError::io(&target))?;
            remove_file(path)?;
        }
        info!(
            "event=journal_archive module=store status=ok file={} archive_dir={}",
            name,
            archive_dir.display()
        );
        Ok(())
    }
}

fn remove_file(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(StoreError::io(path)(err)),
    }
}

fn load_universe(layout: &StoreLayout, entry: &FileEntry) -> StoreResult<Registry> {
    let path = layout.resolve(&entry.file);
    let bytes = fs::read(&path).map_err(StoreError::io(&path))?;
    let ids = decode_universe(&bytes).map_err(StoreError::format(&path))?;
    if ids.len() as u64 != entry.items {
        return Err(StoreError::corrupt(
            &path,
            format!("holds {} ids, manifest expects {}", ids.len(), entry.items),
        ));
    }
    Registry::from_ids(ids)
        .map_err(|id| StoreError::corrupt(&path, format!("id {id} registered twice")))
}

fn load_shard(
    layout: &StoreLayout,
    entry: &FileEntry,
    shard: usize,
    shard_count: usize,
) -> StoreResult<Vec<(u64, MembershipSet)>> {
    let path = layout.resolve(&entry.file);
    let bytes = fs::read(&path).map_err(StoreError::io(&path))?;
    let buckets = decode_shard(&bytes).map_err(StoreError::format(&path))?;
    if buckets.len() as u64 != entry.items {
        return Err(StoreError::corrupt(
            &path,
            format!(
                "holds {} buckets, manifest expects {}",
                buckets.len(),
                entry.items
            ),
        ));
    }
    if let Some((id, _)) = buckets
        .iter()
        .find(|(id, _)| (*id % shard_count as u64) as usize != shard)
    {
        return Err(StoreError::corrupt(
            &path,
            format!("bucket {id} does not belong to shard {shard}"),
        ));
    }
    Ok(buckets)
}
