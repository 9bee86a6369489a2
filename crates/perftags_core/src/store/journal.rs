//! Write-ahead journal of acknowledged change sets.
//!
//! # Responsibility
//! - Append one checksummed record per change set and sync it before the
//!   caller is told the command succeeded.
//! - Replay every complete record on open and cut off a torn tail.
//!
//! # Invariants
//! - A record is `(payloadLen u32, payload, xxh3-64(payload))`.
//! - The payload holds the bucket section first, then the universe section.
//! - Appends always start at the end of the last valid record.
//! - A journal whose header names another generation is treated as empty.

use super::files::{put_membership, read_membership};
use super::{sync_dir, StoreError, StoreResult};
use crate::codec::{put_counted_ids, put_u32, put_u64, put_u8, ByteReader, CodecError, CodecResult};
use crate::index::change::{BucketChange, ChangeSet, UniverseChange};
use crate::model::pairing::Family;
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

const JOURNAL_MAGIC: &[u8; 4] = b"PTWJ";
pub const JOURNAL_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: u64 = 16;
const LEN_FIELD: usize = 4;
const CHECKSUM_LEN: usize = 8;

const OP_PUT: u8 = b'P';
const OP_DROP: u8 = b'D';
const OP_REGISTER: u8 = b'R';
const OP_RETIRE: u8 = b'X';
const FAMILY_TAG: u8 = b'G';
const FAMILY_TAGGABLE: u8 = b'T';

/// Named points where a test can simulate a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    /// After the bucket section of a record, before its universe section.
    BetweenPairingsAndSinglesWrite,
}

impl FaultPoint {
    pub fn name(self) -> &'static str {
        match self {
            Self::BetweenPairingsAndSinglesWrite => {
                "fail_tags_insert_between_pairings_and_singles_writes"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "fail_tags_insert_between_pairings_and_singles_writes" => {
                Some(Self::BetweenPairingsAndSinglesWrite)
            }
            _ => None,
        }
    }
}

/// Outcome of scanning an existing journal.
#[derive(Debug, Default)]
pub struct Replay {
    pub records: Vec<ChangeSet>,
    /// Bytes dropped from the tail because they did not form a valid record.
    pub discarded_bytes: u64,
}

/// Open journal for one generation.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    generation: u64,
    committed_len: u64,
}

impl Journal {
    /// Creates a fresh, synced journal containing only its header.
    pub fn create(path: &Path, generation: u64) -> StoreResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(StoreError::io(path))?;
        file.write_all(&header(generation))
            .map_err(StoreError::io(path))?;
        file.sync_all().map_err(StoreError::io(path))?;
        if let Some(parent) = path.parent() {
            sync_dir(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            generation,
            committed_len: HEADER_LEN,
        })
    }

    /// Opens the journal for `generation`, replaying its valid prefix.
    ///
    /// A missing journal, or one left over from another generation, is
    /// recreated empty.
    pub fn open(path: &Path, generation: u64) -> StoreResult<(Self, Replay)> {
        if !path.exists() {
            return Ok((Self::create(path, generation)?, Replay::default()));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(StoreError::io(path))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(StoreError::io(path))?;

        if !header_matches(&bytes, generation) {
            warn!(
                "event=journal_open module=store status=reset reason=header_mismatch path={}",
                path.display()
            );
            drop(file);
            return Ok((Self::create(path, generation)?, Replay::default()));
        }

        let (records, valid_len) = scan_records(&bytes[HEADER_LEN as usize..]);
        let committed_len = HEADER_LEN + valid_len as u64;
        let discarded_bytes = bytes.len() as u64 - committed_len;
        if discarded_bytes > 0 {
            warn!(
                "event=journal_open module=store status=truncated path={} discarded_bytes={}",
                path.display(),
                discarded_bytes
            );
            file.set_len(committed_len).map_err(StoreError::io(path))?;
            file.sync_all().map_err(StoreError::io(path))?;
        }
        Ok((
            Self {
                path: path.to_path_buf(),
                file,
                generation,
                committed_len,
            },
            Replay {
                records,
                discarded_bytes,
            },
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Length of the valid prefix, header included.
    pub fn len(&self) -> u64 {
        self.committed_len
    }

    pub fn is_empty(&self) -> bool {
        self.committed_len == HEADER_LEN
    }

    /// Durably appends `change`.
    ///
    /// With `fault` set, only the first sub-write happens and the call fails
    /// with `StoreError::InjectedFault`, leaving a torn record behind.
    pub fn append(&mut self, change: &ChangeSet, fault: Option<FaultPoint>) -> StoreResult<()> {
        let (bucket_section, universe_section) = encode_sections(change);
        let payload_len = bucket_section.len() + universe_section.len();
        let payload_len = u32::try_from(payload_len)
            .map_err(|_| StoreError::corrupt(&self.path, "journal record exceeds 4 GiB"))?;

        let path = self.path.as_path();
        self.file
            .set_len(self.committed_len)
            .map_err(StoreError::io(path))?;
        self.file
            .seek(SeekFrom::Start(self.committed_len))
            .map_err(StoreError::io(path))?;

        let mut first = Vec::with_capacity(LEN_FIELD + bucket_section.len());
        put_u32(&mut first, payload_len);
        first.extend_from_slice(&bucket_section);
        self.file.write_all(&first).map_err(StoreError::io(path))?;

        if let Some(point) = fault {
            self.file.sync_data().map_err(StoreError::io(path))?;
            return Err(StoreError::InjectedFault(point));
        }

        let mut checksum_input = bucket_section;
        checksum_input.extend_from_slice(&universe_section);
        let mut second = universe_section;
        put_u64(&mut second, xxh3_64(&checksum_input));
        self.file.write_all(&second).map_err(StoreError::io(path))?;
        self.file.sync_data().map_err(StoreError::io(path))?;

        self.committed_len += (LEN_FIELD + payload_len as usize + CHECKSUM_LEN) as u64;
        Ok(())
    }
}

fn header(generation: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN as usize);
    out.extend_from_slice(JOURNAL_MAGIC);
    put_u32(&mut out, JOURNAL_FORMAT_VERSION);
    put_u64(&mut out, generation);
    out
}

fn header_matches(bytes: &[u8], generation: u64) -> bool {
    bytes.len() >= HEADER_LEN as usize && bytes[..HEADER_LEN as usize] == header(generation)[..]
}

/// Returns every complete record and the byte length they span.
fn scan_records(bytes: &[u8]) -> (Vec<ChangeSet>, usize) {
    let mut records = Vec::new();
    let mut offset = 0;
    loop {
        let rest = &bytes[offset..];
        if rest.len() < LEN_FIELD {
            break;
        }
        let mut len_raw = [0u8; LEN_FIELD];
        len_raw.copy_from_slice(&rest[..LEN_FIELD]);
        let payload_len = u32::from_be_bytes(len_raw) as usize;
        let record_len = LEN_FIELD + payload_len + CHECKSUM_LEN;
        if rest.len() < record_len {
            break;
        }
        let payload = &rest[LEN_FIELD..LEN_FIELD + payload_len];
        let mut sum_raw = [0u8; CHECKSUM_LEN];
        sum_raw.copy_from_slice(&rest[LEN_FIELD + payload_len..record_len]);
        if u64::from_be_bytes(sum_raw) != xxh3_64(payload) {
            break;
        }
        match decode_payload(payload) {
            Ok(change) => records.push(change),
            Err(_) => break,
        }
        offset += record_len;
    }
    (records, offset)
}

fn encode_sections(change: &ChangeSet) -> (Vec<u8>, Vec<u8>) {
    let mut buckets = Vec::new();
    put_u64(&mut buckets, change.buckets.len() as u64);
    for bucket in &change.buckets {
        match &bucket.set {
            Some(set) => {
                put_u8(&mut buckets, OP_PUT);
                put_u8(&mut buckets, family_byte(bucket.family));
                put_u64(&mut buckets, bucket.id);
                put_membership(&mut buckets, set);
            }
            None => {
                put_u8(&mut buckets, OP_DROP);
                put_u8(&mut buckets, family_byte(bucket.family));
                put_u64(&mut buckets, bucket.id);
            }
        }
    }

    let mut universes = Vec::new();
    put_u64(&mut universes, change.universes.len() as u64);
    for universe in &change.universes {
        let (op, family, ids) = match universe {
            UniverseChange::Register { family, ids } => (OP_REGISTER, family, ids),
            UniverseChange::Retire { family, ids } => (OP_RETIRE, family, ids),
        };
        put_u8(&mut universes, op);
        put_u8(&mut universes, family_byte(*family));
        put_counted_ids(&mut universes, ids);
    }
    (buckets, universes)
}

fn decode_payload(payload: &[u8]) -> CodecResult<ChangeSet> {
    let mut reader = ByteReader::new(payload);
    let bucket_count = reader.read_count(1 + 1 + 8)?;
    let mut buckets = Vec::with_capacity(bucket_count);
    for _ in 0..bucket_count {
        let offset = reader.offset();
        let op = reader.read_u8()?;
        let family = read_family(&mut reader)?;
        let id = reader.read_u64()?;
        let set = match op {
            OP_PUT => Some(read_membership(&mut reader)?),
            OP_DROP => None,
            tag => return Err(CodecError::UnknownTag { offset, tag }),
        };
        buckets.push(BucketChange { family, id, set });
    }

    let universe_count = reader.read_count(1 + 1 + 8)?;
    let mut universes = Vec::with_capacity(universe_count);
    for _ in 0..universe_count {
        let offset = reader.offset();
        let op = reader.read_u8()?;
        let family = read_family(&mut reader)?;
        let ids = reader.read_counted_ids()?;
        universes.push(match op {
            OP_REGISTER => UniverseChange::Register { family, ids },
            OP_RETIRE => UniverseChange::Retire { family, ids },
            tag => return Err(CodecError::UnknownTag { offset, tag }),
        });
    }
    reader.finish()?;
    Ok(ChangeSet { buckets, universes })
}

fn family_byte(family: Family) -> u8 {
    match family {
        Family::Tag => FAMILY_TAG,
        Family::Taggable => FAMILY_TAGGABLE,
    }
}

fn read_family(reader: &mut ByteReader<'_>) -> CodecResult<Family> {
    let offset = reader.offset();
    match reader.read_u8()? {
        FAMILY_TAG => Ok(Family::Tag),
        FAMILY_TAGGABLE => Ok(Family::Taggable),
        tag => Err(CodecError::UnknownTag { offset, tag }),
    }
}
