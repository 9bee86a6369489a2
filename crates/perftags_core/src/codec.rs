//! Fixed-width binary primitives shared by scratch files and on-disk files.
//!
//! # Responsibility
//! - Read big-endian `u64` fields and little-endian `f32` ratios from byte slices.
//! - Append the same primitives to output buffers.
//!
//! # Invariants
//! - Every integer field is 8 bytes, big-endian.
//! - A reader never yields a partial field; short input is a `Truncated` error.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub type CodecResult<T> = Result<T, CodecError>;

/// Decoding failure for fixed-width binary payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before a field was complete.
    Truncated {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    /// An ID list length is not a multiple of the field width.
    Misaligned { len: usize },
    /// Bytes were left over after a complete structure.
    TrailingBytes { offset: usize, remaining: usize },
    /// Unrecognized discriminant byte.
    UnknownTag { offset: usize, tag: u8 },
    /// A count field is larger than the remaining input could hold.
    CountOverflow { offset: usize, count: u64 },
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated {
                offset,
                needed,
                remaining,
            } => write!(
                f,
                "truncated input at offset {offset}: needed {needed} bytes, {remaining} remaining"
            ),
            Self::Misaligned { len } => {
                write!(f, "id list length {len} is not a multiple of 8")
            }
            Self::TrailingBytes { offset, remaining } => {
                write!(f, "{remaining} trailing bytes at offset {offset}")
            }
            Self::UnknownTag { offset, tag } => {
                write!(f, "unknown tag byte 0x{tag:02x} at offset {offset}")
            }
            Self::CountOverflow { offset, count } => {
                write!(f, "count {count} at offset {offset} exceeds remaining input")
            }
        }
    }
}

impl Error for CodecError {}

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    pub fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(raw))
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn read_f32_le(&mut self) -> CodecResult<f32> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(f32::from_le_bytes(raw))
    }

    /// Reads a `u64` count and checks that `count * width` bytes could follow.
    pub fn read_count(&mut self, width: usize) -> CodecResult<usize> {
        let offset = self.offset;
        let count = self.read_u64()?;
        let fits = usize::try_from(count)
            .ok()
            .and_then(|count| count.checked_mul(width))
            .is_some_and(|bytes| bytes <= self.remaining());
        if !fits {
            return Err(CodecError::CountOverflow { offset, count });
        }
        Ok(count as usize)
    }

    /// Reads `count` consecutive `u64` ids.
    pub fn read_ids(&mut self, count: usize) -> CodecResult<Vec<u64>> {
        let mut ids = Vec::with_capacity(count.min(self.remaining() / 8));
        for _ in 0..count {
            ids.push(self.read_u64()?);
        }
        Ok(ids)
    }

    /// Reads a `u64` count followed by that many ids.
    pub fn read_counted_ids(&mut self) -> CodecResult<Vec<u64>> {
        let count = self.read_count(8)?;
        self.read_ids(count)
    }

    pub fn finish(&self) -> CodecResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                offset: self.offset,
                remaining: self.remaining(),
            })
        }
    }
}

pub fn put_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_be_bytes());
}

pub fn put_f32_le(out: &mut Vec<u8>, value: f32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn put_ids(out: &mut Vec<u8>, ids: &[u64]) {
    out.reserve(ids.len() * 8);
    for id in ids {
        put_u64(out, *id);
    }
}

pub fn put_counted_ids(out: &mut Vec<u8>, ids: &[u64]) {
    put_u64(out, ids.len() as u64);
    put_ids(out, ids);
}

/// Decodes an uncounted list of `u64` ids that spans the whole input.
pub fn decode_id_list(bytes: &[u8]) -> CodecResult<Vec<u64>> {
    if bytes.len() % 8 != 0 {
        return Err(CodecError::Misaligned { len: bytes.len() });
    }
    let mut reader = ByteReader::new(bytes);
    reader.read_ids(bytes.len() / 8)
}

pub fn encode_id_list(ids: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ids.len() * 8);
    put_ids(&mut out, ids);
    out
}
