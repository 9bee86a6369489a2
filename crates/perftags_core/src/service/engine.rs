//! Tag engine use-case service.
//!
//! # Responsibility
//! - Own the in-memory index and its durable store for one database directory.
//! - Validate, stage, journal and apply every mutation batch.
//! - Answer membership reads and search queries.
//!
//! # Invariants
//! - A batch is journaled and synced before it is applied or acknowledged.
//! - A rejected or failed batch changes neither memory nor the durable state.
//! - Dropping an engine without `close` is a valid shutdown; reopening
//!   recovers every acknowledged batch.

use super::staging::Staging;
use crate::config::{ConfigError, EngineOptions};
use crate::index::change::{ChangeSet, UniverseChange};
use crate::index::TagIndex;
use crate::model::pairing::{Family, PairingMap, TagId, TaggableId};
use crate::search::{evaluate, Expr, MembershipSource, TaggableSet};
use crate::store::{DiskStore, FaultPoint, FlushReport, StoreError};
use log::{debug, error, info, warn};
use std::collections::{BTreeSet, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Instant;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug)]
pub enum EngineError {
    /// A pairing batch references IDs that are not registered.
    Unregistered { family: Family, ids: Vec<u64> },
    /// `arm_fault` was called without fault injection enabled.
    FaultInjectionDisabled,
    /// A flush failed midway; the process must restart to recover.
    Poisoned,
    Config(ConfigError),
    Store(StoreError),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unregistered { family, ids } => {
                write!(f, "unregistered {family} ids: {ids:?}")
            }
            Self::FaultInjectionDisabled => f.write_str("fault injection is disabled"),
            Self::Poisoned => f.write_str("engine is poisoned by an earlier flush failure"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for EngineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ConfigError> for EngineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Tags of one taggable, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggableTags {
    pub taggable: TaggableId,
    pub tags: Vec<TagId>,
}

#[derive(Debug, Clone, Copy)]
enum PairingOp {
    Insert,
    Delete,
    Toggle,
}

/// Handle on one open database directory.
pub struct Engine {
    options: EngineOptions,
    index: TagIndex,
    store: DiskStore,
    armed_fault: Option<FaultPoint>,
    poisoned: bool,
}

impl Engine {
    /// Opens the database, replaying the journal and purging stale files.
    ///
    /// # Side effects
    /// - Creates the database directory and an empty manifest when missing.
    /// - Emits `engine_open` logging events with duration and status.
    pub fn open(options: EngineOptions) -> EngineResult<Self> {
        let started_at = Instant::now();
        info!("event=engine_open module=service status=start");
        options.validate()?;

        let opened = DiskStore::open(
            &options.database_dir,
            options.archive_dir.as_deref(),
            options.shard_count,
        );
        let (store, index, report) = match opened {
            Ok(opened) => opened,
            Err(err) => {
                error!(
                    "event=engine_open module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(err.into());
            }
        };

        info!(
            "event=engine_open module=service status=ok duration_ms={} generation={} replayed_records={} discarded_journal_bytes={} purged_files={} tags={} taggables={}",
            started_at.elapsed().as_millis(),
            report.generation,
            report.replayed_records,
            report.discarded_journal_bytes,
            report.purged_files,
            index.universe(Family::Tag).len(),
            index.universe(Family::Taggable).len()
        );
        Ok(Self {
            options,
            index,
            store,
            armed_fault: None,
            poisoned: false,
        })
    }

    /// Graceful shutdown: flushes and purges before releasing the handle.
    pub fn close(mut self) -> EngineResult<()> {
        self.flush_files()?;
        self.purge_unused_files()?;
        info!(
            "event=engine_close module=service status=ok generation={}",
            self.store.generation()
        );
        Ok(())
    }

    /// Ungraceful shutdown; equivalent to killing the process.
    pub fn terminate(self) {
        warn!(
            "event=engine_terminate module=service status=ok journal_bytes={}",
            self.store.journal_len()
        );
    }

    pub fn database_dir(&self) -> &Path {
        self.store.root()
    }

    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Registers taggables; already registered IDs are skipped.
    pub fn insert_taggables(&mut self, ids: &[TaggableId]) -> EngineResult<()> {
        self.register("insert_taggables", Family::Taggable, ids)
    }

    /// Registers tags; already registered IDs are skipped.
    pub fn insert_tags(&mut self, ids: &[TagId]) -> EngineResult<()> {
        self.register("insert_tags", Family::Tag, ids)
    }

    /// Removes tags together with every pairing that references them.
    pub fn delete_tags(&mut self, ids: &[TagId]) -> EngineResult<()> {
        self.retire("delete_tags", Family::Tag, ids)
    }

    /// Removes taggables together with every pairing that references them.
    pub fn delete_taggables(&mut self, ids: &[TaggableId]) -> EngineResult<()> {
        self.retire("delete_taggables", Family::Taggable, ids)
    }

    pub fn insert_tag_pairings(&mut self, pairings: &PairingMap) -> EngineResult<()> {
        self.mutate_pairings("insert_tag_pairings", pairings, PairingOp::Insert)
    }

    pub fn delete_tag_pairings(&mut self, pairings: &PairingMap) -> EngineResult<()> {
        self.mutate_pairings("delete_tag_pairings", pairings, PairingOp::Delete)
    }

    /// Flips every listed edge, in batch order.
    pub fn toggle_tag_pairings(&mut self, pairings: &PairingMap) -> EngineResult<()> {
        self.mutate_pairings("toggle_tag_pairings", pairings, PairingOp::Toggle)
    }

    /// Tags of each requested taggable, in request order.
    ///
    /// Unknown or untagged taggables yield an empty tag list.
    pub fn read_taggables_tags(&self, taggables: &[TaggableId]) -> Vec<TaggableTags> {
        taggables
            .iter()
            .map(|taggable| TaggableTags {
                taggable: *taggable,
                tags: self.index.members(Family::Taggable, *taggable),
            })
            .collect()
    }

    /// Like `read_taggables_tags`, restricted to the tags in `filter`.
    pub fn read_taggables_specified_tags(
        &self,
        taggables: &[TaggableId],
        filter: &[TagId],
    ) -> Vec<TaggableTags> {
        let filter: BTreeSet<TagId> = filter.iter().copied().collect();
        let tag_universe = self.index.universe(Family::Tag);
        taggables
            .iter()
            .map(|taggable| {
                let tags = match self.index.bucket(Family::Taggable, *taggable) {
                    Some(bucket) => filter
                        .iter()
                        .copied()
                        .filter(|tag| bucket.contains(*tag, tag_universe))
                        .collect(),
                    None => Vec::new(),
                };
                TaggableTags {
                    taggable: *taggable,
                    tags,
                }
            })
            .collect()
    }

    /// Distinct taggables per tag group, optionally limited to a search result.
    pub fn read_tag_groups_taggable_counts(
        &self,
        groups: &[Vec<TagId>],
        search: Option<&Expr>,
    ) -> Vec<u64> {
        let universe = self.index.taggables();
        let within = search.map(|expr| evaluate(expr, &self.index));
        groups
            .iter()
            .map(|group| {
                let members = group.iter().fold(TaggableSet::empty(), |acc, tag| {
                    acc.union(self.index.tag_members(*tag))
                });
                let count = match &within {
                    Some(within) => members.intersection_len(within, universe),
                    None => members.len(universe),
                };
                count as u64
            })
            .collect()
    }

    /// Taggables matching `expr`, ascending.
    pub fn search(&self, expr: &Expr) -> Vec<TaggableId> {
        evaluate(expr, &self.index).into_sorted_ids(self.index.taggables())
    }

    /// Writes every journaled change into canonical bucket files.
    pub fn flush_files(&mut self) -> EngineResult<FlushReport> {
        self.ensure_healthy()?;
        let started_at = Instant::now();
        match self.store.flush(&mut self.index) {
            Ok(report) => {
                info!(
                    "event=engine_flush module=service status=ok generation={} files_written={} duration_ms={}",
                    report.generation,
                    report.files_written,
                    started_at.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(err) => {
                self.poisoned = true;
                error!(
                    "event=engine_flush module=service status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err.into())
            }
        }
    }

    /// Deletes files no longer referenced by the current generation.
    pub fn purge_unused_files(&mut self) -> EngineResult<usize> {
        let purged = self.store.purge()?;
        debug!(
            "event=engine_purge module=service status=ok purged_files={}",
            purged
        );
        Ok(purged)
    }

    /// Arms a one-shot fault for the next journaled batch.
    ///
    /// # Errors
    /// - `FaultInjectionDisabled` unless the engine was opened with
    ///   `EngineOptions::fault_injection`.
    pub fn arm_fault(&mut self, point: FaultPoint) -> EngineResult<()> {
        if !self.options.fault_injection {
            return Err(EngineError::FaultInjectionDisabled);
        }
        warn!(
            "event=fault_armed module=service status=ok fault={}",
            point.name()
        );
        self.armed_fault = Some(point);
        Ok(())
    }

    fn register(&mut self, op: &'static str, family: Family, ids: &[u64]) -> EngineResult<()> {
        let universe = self.index.universe(family);
        let mut seen = HashSet::new();
        let fresh: Vec<u64> = ids
            .iter()
            .copied()
            .filter(|id| !universe.contains(*id) && seen.insert(*id))
            .collect();
        let change = if fresh.is_empty() {
            ChangeSet::default()
        } else {
            ChangeSet {
                buckets: Vec::new(),
                universes: vec![UniverseChange::Register { family, ids: fresh }],
            }
        };
        self.commit(op, change)
    }

    fn retire(&mut self, op: &'static str, family: Family, ids: &[u64]) -> EngineResult<()> {
        let mut staging = Staging::new(&self.index);
        for id in ids {
            staging.retire(family, *id);
        }
        let change = staging.finish();
        self.commit(op, change)
    }

    fn mutate_pairings(
        &mut self,
        op: &'static str,
        pairings: &PairingMap,
        pairing_op: PairingOp,
    ) -> EngineResult<()> {
        self.ensure_registered(Family::Tag, pairings.tags())?;
        self.ensure_registered(Family::Taggable, pairings.taggables())?;

        let mut staging = Staging::new(&self.index);
        for (tag, taggable) in pairings.edges() {
            match pairing_op {
                PairingOp::Insert => staging.insert_pairing(tag, taggable),
                PairingOp::Delete => staging.delete_pairing(tag, taggable),
                PairingOp::Toggle => staging.toggle_pairing(tag, taggable),
            }
        }
        let change = staging.finish();
        self.commit(op, change)
    }

    fn ensure_registered(&self, family: Family, ids: BTreeSet<u64>) -> EngineResult<()> {
        let universe = self.index.universe(family);
        let missing: Vec<u64> = ids.into_iter().filter(|id| !universe.contains(*id)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Unregistered {
                family,
                ids: missing,
            })
        }
    }

    fn ensure_healthy(&self) -> EngineResult<()> {
        if self.poisoned {
            Err(EngineError::Poisoned)
        } else {
            Ok(())
        }
    }

    /// Journals `change`, applies it, then flushes when the journal is large.
    fn commit(&mut self, op: &'static str, change: ChangeSet) -> EngineResult<()> {
        self.ensure_healthy()?;
        if change.is_empty() {
            debug!("event=engine_mutation module=service status=noop op={op}");
            return Ok(());
        }
        let fault = self.armed_fault.take();

        let started_at = Instant::now();
        let bucket_changes = change.buckets.len();
        if let Err(err) = self.store.append(&change, fault) {
            warn!(
                "event=engine_mutation module=service status=error op={} error={}",
                op, err
            );
            return Err(err.into());
        }
        self.index.apply(change);
        debug!(
            "event=engine_mutation module=service status=ok op={} bucket_changes={} journal_bytes={} duration_ms={}",
            op,
            bucket_changes,
            self.store.journal_len(),
            started_at.elapsed().as_millis()
        );

        if self.store.journal_len() > self.options.journal_flush_threshold_bytes {
            // The batch is already durable, so a failed auto-flush only poisons the engine.
            if self.flush_files().is_ok() {
                if let Err(err) = self.purge_unused_files() {
                    warn!(
                        "event=engine_purge module=service status=error error={}",
                        err
                    );
                }
            }
        }
        Ok(())
    }
}
