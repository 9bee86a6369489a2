//! Universe and shard file codecs.
//!
//! # Invariants
//! - Every file ends with an xxh3-64 checksum of the bytes before it.
//! - An empty universe file is exactly the 8-byte checksum.
//! - Shard records carry the bucket's encoding and anchor explicitly.

use crate::codec::{put_counted_ids, put_ids, put_u32, put_u64, put_u8, ByteReader, CodecError};
use crate::index::membership::{Encoding, MembershipSet};
use xxhash_rust::xxh3::xxh3_64;

const SHARD_MAGIC: &[u8; 4] = b"PTSB";
pub const SHARD_FORMAT_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 8;

pub(crate) const INCLUSION_TAG: u8 = b'N';
pub(crate) const COMPLEMENT_TAG: u8 = b'C';

/// Decoding failure for a persisted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFormatError {
    Codec(CodecError),
    ChecksumMismatch { expected: u64, actual: u64 },
    BadMagic,
    UnsupportedVersion(u32),
}

impl std::fmt::Display for FileFormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(err) => write!(f, "{err}"),
            Self::ChecksumMismatch { expected, actual } => write!(
                f,
                "checksum mismatch: stored {expected:016x}, computed {actual:016x}"
            ),
            Self::BadMagic => f.write_str("bad magic"),
            Self::UnsupportedVersion(version) => write!(f, "unsupported version {version}"),
        }
    }
}

impl std::error::Error for FileFormatError {}

impl From<CodecError> for FileFormatError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

pub fn encode_universe(ids: impl IntoIterator<Item = u64>) -> Vec<u8> {
    let mut out = Vec::new();
    for id in ids {
        put_u64(&mut out, id);
    }
    seal(out)
}

pub fn decode_universe(bytes: &[u8]) -> Result<Vec<u64>, FileFormatError> {
    let body = verify_checksum(bytes)?;
    Ok(crate::codec::decode_id_list(body)?)
}

pub fn encode_shard<'a>(buckets: impl IntoIterator<Item = (u64, &'a MembershipSet)>) -> Vec<u8> {
    let buckets: Vec<_> = buckets.into_iter().collect();
    let mut out = Vec::new();
    out.extend_from_slice(SHARD_MAGIC);
    put_u32(&mut out, SHARD_FORMAT_VERSION);
    put_u64(&mut out, buckets.len() as u64);
    for (id, set) in buckets {
        put_u64(&mut out, id);
        put_membership(&mut out, set);
    }
    seal(out)
}

pub fn decode_shard(bytes: &[u8]) -> Result<Vec<(u64, MembershipSet)>, FileFormatError> {
    let body = verify_checksum(bytes)?;
    let mut reader = ByteReader::new(body);
    if reader.take(SHARD_MAGIC.len())? != SHARD_MAGIC {
        return Err(FileFormatError::BadMagic);
    }
    let version = reader.read_u32()?;
    if version != SHARD_FORMAT_VERSION {
        return Err(FileFormatError::UnsupportedVersion(version));
    }
    let count = reader.read_count(8 + 1 + 8 + 8)?;
    let mut buckets = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.read_u64()?;
        buckets.push((id, read_membership(&mut reader)?));
    }
    reader.finish()?;
    Ok(buckets)
}

/// Appends `(encoding, anchor, physicalLen, ids…)`.
pub(crate) fn put_membership(out: &mut Vec<u8>, set: &MembershipSet) {
    match set.encoding() {
        Encoding::Inclusion => {
            put_u8(out, INCLUSION_TAG);
            put_u64(out, 0);
        }
        Encoding::Complement { anchor } => {
            put_u8(out, COMPLEMENT_TAG);
            put_u64(out, anchor);
        }
    }
    put_counted_ids(out, &set.sorted_physical());
}

pub(crate) fn read_membership(reader: &mut ByteReader<'_>) -> Result<MembershipSet, CodecError> {
    let offset = reader.offset();
    let tag = reader.read_u8()?;
    let anchor = reader.read_u64()?;
    let encoding = match tag {
        INCLUSION_TAG => Encoding::Inclusion,
        COMPLEMENT_TAG => Encoding::Complement { anchor },
        other => return Err(CodecError::UnknownTag { offset, tag: other }),
    };
    let physical = reader.read_counted_ids()?;
    Ok(MembershipSet::from_parts(encoding, physical))
}

fn seal(mut body: Vec<u8>) -> Vec<u8> {
    let checksum = xxh3_64(&body);
    put_ids(&mut body, &[checksum]);
    body
}

fn verify_checksum(bytes: &[u8]) -> Result<&[u8], FileFormatError> {
    if bytes.len() < CHECKSUM_LEN {
        return Err(CodecError::Truncated {
            offset: 0,
            needed: CHECKSUM_LEN,
            remaining: bytes.len(),
        }
        .into());
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let mut raw = [0u8; CHECKSUM_LEN];
    raw.copy_from_slice(trailer);
    let expected = u64::from_be_bytes(raw);
    let actual = xxh3_64(body);
    if expected != actual {
        return Err(FileFormatError::ChecksumMismatch { expected, actual });
    }
    Ok(body)
}
