//! Binary payloads of the scratch files.
//!
//! Requests are decoded strictly: every byte of the input must belong to the
//! request. Encoders for the request side exist so callers and tests can build
//! scratch files with the same framing.

use crate::codec::{
    decode_id_list, encode_id_list, put_counted_ids, put_ids, put_u64, ByteReader, CodecError,
};
use crate::model::pairing::{PairingMap, TagId, TaggableId};
use crate::search::{Expr, ExprError};
use crate::service::TaggableTags;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum WireError {
    Codec(CodecError),
    Expr(ExprError),
}

impl Display for WireError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(err) => write!(f, "{err}"),
            Self::Expr(err) => write!(f, "invalid search expression: {err}"),
        }
    }
}

impl Error for WireError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            Self::Expr(err) => Some(err),
        }
    }
}

impl From<CodecError> for WireError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

impl From<ExprError> for WireError {
    fn from(value: ExprError) -> Self {
        Self::Expr(value)
    }
}

pub type WireResult<T> = Result<T, WireError>;

/// Uncounted ID list spanning the whole payload.
pub fn decode_singles(bytes: &[u8]) -> WireResult<Vec<u64>> {
    Ok(decode_id_list(bytes)?)
}

pub fn encode_singles(ids: &[u64]) -> Vec<u8> {
    encode_id_list(ids)
}

/// Repeated `(tag, count, taggable × count)` tuples.
pub fn decode_pairings(bytes: &[u8]) -> WireResult<PairingMap> {
    let mut reader = ByteReader::new(bytes);
    let mut pairings = PairingMap::new();
    while !reader.is_empty() {
        let tag = reader.read_u64()?;
        let taggables = reader.read_counted_ids()?;
        pairings.push(tag, taggables);
    }
    Ok(pairings)
}

pub fn encode_pairings(pairings: &PairingMap) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in pairings.entries() {
        put_u64(&mut out, entry.tag);
        put_counted_ids(&mut out, &entry.taggables);
    }
    out
}

/// `read_taggables_specified_tags` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifiedTagsRequest {
    pub tags: Vec<TagId>,
    pub taggables: Vec<TaggableId>,
}

impl SpecifiedTagsRequest {
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let tags = reader.read_counted_ids()?;
        let taggables = reader.read_counted_ids()?;
        reader.finish()?;
        Ok(Self { tags, taggables })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + 8 * (self.tags.len() + self.taggables.len()));
        put_counted_ids(&mut out, &self.tags);
        put_counted_ids(&mut out, &self.taggables);
        out
    }
}

/// `read_tag_groups_taggable_counts` request: tag groups plus an optional
/// search expression filling the rest of the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TagGroupsRequest {
    pub groups: Vec<Vec<TagId>>,
    pub search: Option<Expr>,
}

impl TagGroupsRequest {
    pub fn decode(bytes: &[u8]) -> WireResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let group_count = reader.read_count(8)?;
        let mut groups = Vec::with_capacity(group_count);
        for _ in 0..group_count {
            groups.push(reader.read_counted_ids()?);
        }
        let rest = reader.take(reader.remaining())?;
        let search = Expr::decode_optional(rest)?;
        Ok(Self { groups, search })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_u64(&mut out, self.groups.len() as u64);
        for group in &self.groups {
            put_counted_ids(&mut out, group);
        }
        if let Some(search) = &self.search {
            out.extend_from_slice(&search.encode());
        }
        out
    }
}

/// `search` request; an empty payload searches the whole universe.
pub fn decode_search(bytes: &[u8]) -> WireResult<Expr> {
    Ok(Expr::decode_optional(bytes)?.unwrap_or(Expr::Universe))
}

/// Repeated `(taggable, tagCount, tag × tagCount)` tuples.
pub fn encode_taggable_tags(entries: &[TaggableTags]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        put_u64(&mut out, entry.taggable);
        put_counted_ids(&mut out, &entry.tags);
    }
    out
}

pub fn decode_taggable_tags(bytes: &[u8]) -> WireResult<Vec<TaggableTags>> {
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::new();
    while !reader.is_empty() {
        let taggable = reader.read_u64()?;
        let tags = reader.read_counted_ids()?;
        entries.push(TaggableTags { taggable, tags });
    }
    Ok(entries)
}

/// One `u64` per tag group, or the ascending IDs of a search result.
pub fn encode_u64s(values: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 8);
    put_ids(&mut out, values);
    out
}
