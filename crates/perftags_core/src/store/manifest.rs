//! `cache.tdb` manifest: the commit point of every flush.
//!
//! # Invariants
//! - The manifest names the complete set of live files for one generation.
//! - `shard_count` never changes after the database is created.

use super::{write_atomic, StoreError, StoreLayout, StoreResult};
use crate::model::pairing::Family;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const MANIFEST_FORMAT_VERSION: u32 = 1;

/// One live file and the number of items it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file: String,
    pub items: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: u64,
    pub shard_count: usize,
    pub tags: Option<FileEntry>,
    pub taggables: Option<FileEntry>,
    /// Shards of tag→taggables buckets; `None` for an empty shard.
    pub tag_shards: Vec<Option<FileEntry>>,
    /// Shards of taggable→tags buckets; `None` for an empty shard.
    pub taggable_shards: Vec<Option<FileEntry>>,
}

impl Manifest {
    /// Manifest of a database that has never been flushed.
    pub fn empty(shard_count: usize) -> Self {
        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            generation: 0,
            shard_count,
            tags: None,
            taggables: None,
            tag_shards: vec![None; shard_count],
            taggable_shards: vec![None; shard_count],
        }
    }

    pub fn universe(&self, family: Family) -> Option<&FileEntry> {
        match family {
            Family::Tag => self.tags.as_ref(),
            Family::Taggable => self.taggables.as_ref(),
        }
    }

    pub fn universe_mut(&mut self, family: Family) -> &mut Option<FileEntry> {
        match family {
            Family::Tag => &mut self.tags,
            Family::Taggable => &mut self.taggables,
        }
    }

    pub fn shards(&self, family: Family) -> &[Option<FileEntry>] {
        match family {
            Family::Tag => &self.tag_shards,
            Family::Taggable => &self.taggable_shards,
        }
    }

    pub fn shards_mut(&mut self, family: Family) -> &mut Vec<Option<FileEntry>> {
        match family {
            Family::Tag => &mut self.tag_shards,
            Family::Taggable => &mut self.taggable_shards,
        }
    }

    /// Manifest-relative paths of every file this manifest keeps alive.
    pub fn referenced_files(&self) -> Vec<&str> {
        self.tags
            .iter()
            .chain(self.taggables.iter())
            .chain(self.tag_shards.iter().flatten())
            .chain(self.taggable_shards.iter().flatten())
            .map(|entry| entry.file.as_str())
            .collect()
    }

    /// Loads the manifest, or returns `None` when the database is new.
    pub fn load(layout: &StoreLayout) -> StoreResult<Option<Self>> {
        let path = layout.manifest_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(&path)(err)),
        };
        let manifest: Self =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Manifest {
                path: path.clone(),
                source,
            })?;
        manifest.validate(&path)?;
        Ok(Some(manifest))
    }

    /// Atomically replaces the on-disk manifest with `self`.
    pub fn commit(&self, layout: &StoreLayout) -> StoreResult<()> {
        let path = layout.manifest_path();
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| StoreError::Manifest {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &bytes)
    }

    fn validate(&self, path: &Path) -> StoreResult<()> {
        if self.format_version != MANIFEST_FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat {
                path: path.to_path_buf(),
                found: self.format_version,
                supported: MANIFEST_FORMAT_VERSION,
            });
        }
        if self.shard_count == 0
            || self.tag_shards.len() != self.shard_count
            || self.taggable_shards.len() != self.shard_count
        {
            return Err(StoreError::corrupt(
                path,
                format!(
                    "shard table sizes {}/{} do not match shard_count {}",
                    self.tag_shards.len(),
                    self.taggable_shards.len(),
                    self.shard_count
                ),
            ));
        }
        Ok(())
    }
}
