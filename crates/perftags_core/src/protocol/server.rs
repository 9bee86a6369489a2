//! Single-threaded command loop.
//!
//! # Invariants
//! - Commands run strictly one after another.
//! - `exit` flushes and purges before answering; EOF drops the engine like a kill.

use super::command::{Channel, Command};
use super::wire::{
    decode_pairings, decode_search, decode_singles, encode_taggable_tags, encode_u64s,
    SpecifiedTagsRequest, TagGroupsRequest, WireResult,
};
use super::{ProtocolError, ProtocolResult};
use crate::config::{ScratchFiles, ServerConfig};
use crate::service::Engine;
use crate::store::FaultPoint;
use log::{debug, info, warn};
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Instant;

pub const STATUS_OK: &str = "OK!\r\n";
pub const STATUS_BAD_COMMAND: &str = "BAD COMMAND!\r\n";

pub struct Server {
    engine: Option<Engine>,
    files: ScratchFiles,
}

impl Server {
    pub fn new(engine: Engine, files: ScratchFiles) -> Self {
        Self {
            engine: Some(engine),
            files,
        }
    }

    /// Opens the engine described by `config`.
    pub fn open(config: ServerConfig) -> ProtocolResult<Self> {
        let engine = Engine::open(config.engine)?;
        Ok(Self::new(engine, config.files))
    }

    /// `None` once `exit` closed the engine.
    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    /// Serves lines from `input` until `exit` or EOF.
    ///
    /// # Errors
    /// - `Channel` when stdin or stdout fails. Command failures are answered
    ///   on `output` and never end the loop.
    pub fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> ProtocolResult<()> {
        let mut line = Vec::new();
        while !self.is_closed() {
            line.clear();
            let read = input
                .read_until(b'\n', &mut line)
                .map_err(ProtocolError::Channel)?;
            if read == 0 {
                info!("event=protocol_eof module=protocol status=ok");
                self.terminate();
                return Ok(());
            }
            let status = self.handle_line(&String::from_utf8_lossy(&line));
            output
                .write_all(status.as_bytes())
                .and_then(|()| output.flush())
                .map_err(ProtocolError::Channel)?;
        }
        Ok(())
    }

    /// Executes one command line and returns its status line.
    pub fn handle_line(&mut self, line: &str) -> String {
        let started_at = Instant::now();
        let (name, result) = match line.parse::<Command>() {
            Ok(command) => (command.name(), self.execute(command)),
            Err(unknown) => ("unknown", Err(ProtocolError::UnknownCommand(unknown.0))),
        };
        match &result {
            Ok(()) => debug!(
                "event=command module=protocol status=ok command={} duration_ms={}",
                name,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=command module=protocol status=error command={} duration_ms={} error={}",
                name,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        status_line(&result)
    }

    /// Drops the engine without flushing.
    pub fn terminate(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.terminate();
        }
    }

    fn execute(&mut self, command: Command) -> ProtocolResult<()> {
        if command == Command::Exit {
            let engine = self.engine.take().ok_or(ProtocolError::Closed)?;
            return Ok(engine.close()?);
        }
        let request_path = match command.channel() {
            Channel::Read => Some(self.files.read_input.as_path()),
            Channel::Write => Some(self.files.write_input.as_path()),
            Channel::Control => None,
        };
        let bytes = match request_path {
            Some(path) => read_scratch(path)?,
            None => Vec::new(),
        };
        let name = command.name();
        let engine = self.engine.as_mut().ok_or(ProtocolError::Closed)?;

        match command {
            Command::InsertTaggables => {
                let ids = decode_request(name, &bytes, decode_singles)?;
                engine.insert_taggables(&ids)?;
            }
            Command::InsertTags => {
                let ids = decode_request(name, &bytes, decode_singles)?;
                engine.insert_tags(&ids)?;
            }
            Command::InsertTagPairings => {
                let pairings = decode_request(name, &bytes, decode_pairings)?;
                engine.insert_tag_pairings(&pairings)?;
            }
            Command::DeleteTagPairings => {
                let pairings = decode_request(name, &bytes, decode_pairings)?;
                engine.delete_tag_pairings(&pairings)?;
            }
            Command::ToggleTagPairings => {
                let pairings = decode_request(name, &bytes, decode_pairings)?;
                engine.toggle_tag_pairings(&pairings)?;
            }
            Command::DeleteTags => {
                let ids = decode_request(name, &bytes, decode_singles)?;
                engine.delete_tags(&ids)?;
            }
            Command::DeleteTaggables => {
                let ids = decode_request(name, &bytes, decode_singles)?;
                engine.delete_taggables(&ids)?;
            }
            Command::ReadTaggablesTags => {
                let ids = decode_request(name, &bytes, decode_singles)?;
                let entries = engine.read_taggables_tags(&ids);
                write_scratch(&self.files.read_output, &encode_taggable_tags(&entries))?;
            }
            Command::ReadTaggablesSpecifiedTags => {
                let request = decode_request(name, &bytes, SpecifiedTagsRequest::decode)?;
                let entries =
                    engine.read_taggables_specified_tags(&request.taggables, &request.tags);
                write_scratch(&self.files.read_output, &encode_taggable_tags(&entries))?;
            }
            Command::ReadTagGroupsTaggableCounts => {
                let request = decode_request(name, &bytes, TagGroupsRequest::decode)?;
                let counts = engine
                    .read_tag_groups_taggable_counts(&request.groups, request.search.as_ref());
                write_scratch(&self.files.read_output, &encode_u64s(&counts))?;
            }
            Command::Search => {
                let expr = decode_request(name, &bytes, decode_search)?;
                let ids = engine.search(&expr);
                write_scratch(&self.files.read_output, &encode_u64s(&ids))?;
            }
            Command::FlushFiles => {
                engine.flush_files()?;
            }
            Command::PurgeUnusedFiles => {
                engine.purge_unused_files()?;
            }
            Command::Override(inline) => {
                let name = match inline {
                    Some(name) => name,
                    None => String::from_utf8_lossy(&bytes).trim().to_string(),
                };
                let point =
                    FaultPoint::from_name(&name).ok_or(ProtocolError::UnknownFault(name))?;
                engine.arm_fault(point)?;
            }
            Command::Exit => {}
        }
        Ok(())
    }
}

fn decode_request<T>(
    command: &'static str,
    bytes: &[u8],
    decode: fn(&[u8]) -> WireResult<T>,
) -> ProtocolResult<T> {
    decode(bytes).map_err(|source| ProtocolError::MalformedRequest { command, source })
}

fn read_scratch(path: &Path) -> ProtocolResult<Vec<u8>> {
    std::fs::read(path).map_err(ProtocolError::scratch(path))
}

fn write_scratch(path: &Path, bytes: &[u8]) -> ProtocolResult<()> {
    std::fs::write(path, bytes).map_err(ProtocolError::scratch(path))
}

fn status_line(result: &ProtocolResult<()>) -> String {
    match result {
        Ok(()) => STATUS_OK.to_string(),
        Err(err) if err.is_bad_command() => STATUS_BAD_COMMAND.to_string(),
        Err(err) => {
            let message = err.to_string().replace(['\r', '\n'], " ");
            format!("ERROR! {message}\r\n")
        }
    }
}
