//! On-disk storage for the tag index.
//!
//! # Responsibility
//! - Name every file under the database directory.
//! - Persist universes and bucket shards as generation-named files.
//! - Journal every acknowledged change set before it is applied.
//!
//! # Invariants
//! - `cache.tdb` is the single commit point; it is only ever replaced by an
//!   atomic rename.
//! - Files are never rewritten in place, except the journal tail beyond its
//!   last valid record.

use crate::model::pairing::Family;
use files::FileFormatError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

mod disk;
pub mod files;
pub mod journal;
pub mod manifest;

pub use disk::{DiskStore, FlushReport, OpenReport};
pub use journal::FaultPoint;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Corrupt {
        path: PathBuf,
        detail: String,
    },
    /// A universe or shard file that fails to decode.
    Format {
        path: PathBuf,
        source: FileFormatError,
    },
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },
    UnsupportedFormat {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
    /// Test-only simulated crash between two sub-writes of one record.
    InjectedFault(FaultPoint),
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn format(path: &Path) -> impl FnOnce(FileFormatError) -> Self + '_ {
        move |source| Self::Format {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(path: &Path, detail: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error on `{}`: {source}", path.display()),
            Self::Corrupt { path, detail } => {
                write!(f, "corrupt file `{}`: {detail}", path.display())
            }
            Self::Format { path, source } => {
                write!(f, "corrupt file `{}`: {source}", path.display())
            }
            Self::Manifest { path, source } => {
                write!(f, "invalid manifest `{}`: {source}", path.display())
            }
            Self::UnsupportedFormat {
                path,
                found,
                supported,
            } => write!(
                f,
                "file `{}` has format version {found}, newest supported is {supported}",
                path.display()
            ),
            Self::InjectedFault(point) => write!(f, "injected fault at {}", point.name()),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Format { source, .. } => Some(source),
            Self::Manifest { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub const MANIFEST_FILE: &str = "cache.tdb";
const ATOMIC_TEMP_SUFFIX: &str = ".atomictemp";
const JOURNAL_PREFIX: &str = "journal-";
const JOURNAL_SUFFIX: &str = ".twa";
pub const BUCKETS_DIR: &str = "buckets";

/// Paths below one database directory.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn journal_name(generation: u64) -> String {
        format!("{JOURNAL_PREFIX}{generation:012}{JOURNAL_SUFFIX}")
    }

    pub fn journal_path(&self, generation: u64) -> PathBuf {
        self.root.join(Self::journal_name(generation))
    }

    pub fn is_journal_name(name: &str) -> bool {
        name.starts_with(JOURNAL_PREFIX) && name.ends_with(JOURNAL_SUFFIX)
    }

    pub fn buckets_dir(&self) -> PathBuf {
        self.root.join(BUCKETS_DIR)
    }

    /// Manifest-relative path of a universe file.
    pub fn universe_file(family: Family, generation: u64) -> String {
        let dir = match family {
            Family::Tag => "tag-bucket",
            Family::Taggable => "taggable-bucket",
        };
        format!("{BUCKETS_DIR}/{dir}/bucket-{generation:012}.tbd")
    }

    /// Manifest-relative path of a shard file holding buckets owned by `family`.
    pub fn shard_file(family: Family, shard: usize, generation: u64) -> String {
        let dir = match family {
            Family::Tag => "tag-to-taggable",
            Family::Taggable => "taggable-to-tag",
        };
        format!("{BUCKETS_DIR}/{dir}-{shard}/bucket-{generation:012}.tbd")
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.root.clone(), |path, part| path.join(part))
    }
}

/// Writes `bytes` to `path` through a synced temp file and an atomic rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let parent = parent_of(path)?;
    fs::create_dir_all(parent).map_err(StoreError::io(parent))?;

    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(ATOMIC_TEMP_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    let mut temp = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(StoreError::io(&temp_path))?;
    temp.write_all(bytes).map_err(StoreError::io(&temp_path))?;
    temp.sync_all().map_err(StoreError::io(&temp_path))?;
    drop(temp);

    fs::rename(&temp_path, path).map_err(StoreError::io(path))?;
    sync_dir(parent)
}

/// Flushes directory entries so renames and creations survive power loss.
pub fn sync_dir(dir: &Path) -> StoreResult<()> {
    #[cfg(unix)]
    {
        let handle = File::open(dir).map_err(StoreError::io(dir))?;
        handle.sync_all().map_err(StoreError::io(dir))?;
    }
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

pub fn is_atomic_temp(name: &str) -> bool {
    name.ends_with(ATOMIC_TEMP_SUFFIX)
}

fn parent_of(path: &Path) -> StoreResult<&Path> {
    path.parent()
        .ok_or_else(|| StoreError::corrupt(path, "path has no parent directory"))
}
