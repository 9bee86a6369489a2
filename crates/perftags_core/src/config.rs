//! Engine and protocol configuration.
//!
//! # Responsibility
//! - Hold engine tuning options and their defaults.
//! - Map the positional argv forms onto scratch-file paths.
//!
//! # Invariants
//! - The 6-path form is `writeIn writeOut readIn readOut databaseDir archiveDir`.
//! - The 4-path form is `in out databaseDir archiveDir`; reads and writes share files.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DEFAULT_SHARD_COUNT: usize = 16;
pub const DEFAULT_JOURNAL_FLUSH_THRESHOLD_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    WrongPathCount(usize),
    EmptyPath { position: usize },
    InvalidShardCount(usize),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongPathCount(count) => write!(
                f,
                "expected 6 paths (writeIn writeOut readIn readOut databaseDir archiveDir) or 4 (in out databaseDir archiveDir), got {count}"
            ),
            Self::EmptyPath { position } => write!(f, "path argument {position} is empty"),
            Self::InvalidShardCount(count) => {
                write!(f, "shard count must be between 1 and 4096, got {count}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Options for opening an `Engine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub database_dir: PathBuf,
    /// Superseded journals are moved here instead of being deleted.
    pub archive_dir: Option<PathBuf>,
    /// Only used when the database is created.
    pub shard_count: usize,
    /// Journal size past which an acknowledged mutation triggers flush+purge.
    pub journal_flush_threshold_bytes: u64,
    /// Allows arming test-only durability faults.
    pub fault_injection: bool,
}

impl EngineOptions {
    pub fn new(database_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_dir: database_dir.into(),
            archive_dir: None,
            shard_count: DEFAULT_SHARD_COUNT,
            journal_flush_threshold_bytes: DEFAULT_JOURNAL_FLUSH_THRESHOLD_BYTES,
            fault_injection: false,
        }
    }

    pub fn with_archive_dir(mut self, archive_dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(archive_dir.into());
        self
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn with_journal_flush_threshold(mut self, bytes: u64) -> Self {
        self.journal_flush_threshold_bytes = bytes;
        self
    }

    pub fn with_fault_injection(mut self, enabled: bool) -> Self {
        self.fault_injection = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4096).contains(&self.shard_count) {
            return Err(ConfigError::InvalidShardCount(self.shard_count));
        }
        Ok(())
    }
}

/// Binary scratch files exchanged with the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchFiles {
    pub write_input: PathBuf,
    pub write_output: PathBuf,
    pub read_input: PathBuf,
    pub read_output: PathBuf,
}

/// Everything the command loop needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub files: ScratchFiles,
    pub engine: EngineOptions,
}

impl ServerConfig {
    /// Builds a config from the positional path arguments.
    ///
    /// # Errors
    /// - `WrongPathCount` unless exactly 4 or 6 paths are given.
    /// - `EmptyPath` when any path is empty.
    pub fn from_paths(paths: Vec<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(position) = paths.iter().position(|path| path.as_os_str().is_empty()) {
            return Err(ConfigError::EmptyPath {
                position: position + 1,
            });
        }
        let mut paths = paths.into_iter();
        match paths.len() {
            6 => {
                let mut next = || paths.next().unwrap_or_default();
                let files = ScratchFiles {
                    write_input: next(),
                    write_output: next(),
                    read_input: next(),
                    read_output: next(),
                };
                let database_dir = next();
                let archive_dir = next();
                Ok(Self {
                    files,
                    engine: EngineOptions::new(database_dir).with_archive_dir(archive_dir),
                })
            }
            4 => {
                let mut next = || paths.next().unwrap_or_default();
                let input = next();
                let output = next();
                let database_dir = next();
                let archive_dir = next();
                Ok(Self {
                    files: ScratchFiles {
                        write_input: input.clone(),
                        write_output: output.clone(),
                        read_input: input,
                        read_output: output,
                    },
                    engine: EngineOptions::new(database_dir).with_archive_dir(archive_dir),
                })
            }
            count => Err(ConfigError::WrongPathCount(count)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, EngineOptions, ServerConfig};
    use std::path::PathBuf;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn six_path_form_separates_read_and_write_files() {
        let config = ServerConfig::from_paths(paths(&["wi", "wo", "ri", "ro", "db", "ar"]))
            .expect("six paths are valid");
        assert_eq!(config.files.write_input, PathBuf::from("wi"));
        assert_eq!(config.files.read_output, PathBuf::from("ro"));
        assert_eq!(config.engine.database_dir, PathBuf::from("db"));
        assert_eq!(config.engine.archive_dir, Some(PathBuf::from("ar")));
    }

    #[test]
    fn four_path_form_shares_scratch_files() {
        let config =
            ServerConfig::from_paths(paths(&["in", "out", "db", "ar"])).expect("four paths");
        assert_eq!(config.files.write_input, config.files.read_input);
        assert_eq!(config.files.write_output, config.files.read_output);
    }

    #[test]
    fn other_shapes_are_rejected() {
        assert_eq!(
            ServerConfig::from_paths(paths(&["a", "b", "c"])),
            Err(ConfigError::WrongPathCount(3))
        );
        assert_eq!(
            ServerConfig::from_paths(paths(&["a", "", "c", "d"])),
            Err(ConfigError::EmptyPath { position: 2 })
        );
    }

    #[test]
    fn shard_count_must_be_positive() {
        let options = EngineOptions::new("db").with_shard_count(0);
        assert_eq!(options.validate(), Err(ConfigError::InvalidShardCount(0)));
        assert!(EngineOptions::new("db").validate().is_ok());
    }
}
