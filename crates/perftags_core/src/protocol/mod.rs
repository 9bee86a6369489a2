//! Line-oriented command front over paired binary scratch files.
//!
//! # Responsibility
//! - Parse one command per stdin line and answer with one status line.
//! - Move request and response payloads through the scratch files.
//!
//! # Invariants
//! - Every parsed line gets exactly one status line, written and flushed
//!   only after the response file is complete.
//! - A failed command leaves the engine state as it was before the command.

pub mod command;
pub mod server;
pub mod wire;

pub use command::{Channel, Command, UnknownCommand};
pub use server::{Server, STATUS_BAD_COMMAND, STATUS_OK};
pub use wire::{WireError, WireResult};

use crate::service::EngineError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};

pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[derive(Debug)]
pub enum ProtocolError {
    UnknownCommand(String),
    UnknownFault(String),
    /// Scratch file could not be read or written.
    ScratchFile { path: PathBuf, source: io::Error },
    /// stdin or stdout failed; the loop cannot continue.
    Channel(io::Error),
    MalformedRequest { command: &'static str, source: WireError },
    /// A command arrived after `exit` closed the engine.
    Closed,
    Engine(EngineError),
}

impl ProtocolError {
    pub(crate) fn scratch(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::ScratchFile {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Errors answered with `BAD COMMAND!` rather than an error message.
    pub fn is_bad_command(&self) -> bool {
        matches!(self, Self::UnknownCommand(_) | Self::UnknownFault(_))
    }
}

impl Display for ProtocolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCommand(line) => write!(f, "unknown command `{line}`"),
            Self::UnknownFault(name) => write!(f, "unknown fault `{name}`"),
            Self::ScratchFile { path, source } => {
                write!(f, "scratch file `{}`: {source}", path.display())
            }
            Self::Channel(err) => write!(f, "command channel: {err}"),
            Self::MalformedRequest { command, source } => {
                write!(f, "malformed {command} request: {source}")
            }
            Self::Closed => f.write_str("engine is closed"),
            Self::Engine(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ScratchFile { source, .. } => Some(source),
            Self::Channel(err) => Some(err),
            Self::MalformedRequest { source, .. } => Some(source),
            Self::Engine(err) => Some(err),
            Self::UnknownCommand(_) | Self::UnknownFault(_) | Self::Closed => None,
        }
    }
}

impl From<EngineError> for ProtocolError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
