//! Search expression AST and its infix byte encoding.
//!
//! # Responsibility
//! - Define the closed set of expression shapes the evaluator understands.
//! - Decode caller-supplied expression bytes, rejecting unknown shapes.
//!
//! # Byte form
//! A sequence is `operand (op operand)*`, ended by `)` or the end of input,
//! and is folded strictly left to right; an empty sequence is the Universe.
//! - operands: `T id`, `L n id×n`, `U`, `E`, `( sequence`, each optionally
//!   prefixed by `~`;
//! - operators: `|` union, `&` intersect, `-` difference, `^` symmetric
//!   difference;
//! - `A n tag×n condition* )` conditional union over tag candidates, and
//!   `X n operand×n condition* )` over arbitrary candidate expressions;
//! - conditions: `C cmp count sequence`, `P cmp ratio sequence`,
//!   `F cmp ratio filterSequence sequence`.
//!
//! # Invariants
//! - Decoding consumes the whole input or fails; a stray top-level `)` is
//!   rejected.
//! - Nesting deeper than `MAX_DEPTH` is rejected before evaluation.
//! - Ratios are finite.

use crate::codec::{put_f32_le, put_ids, put_u64, put_u8, ByteReader, CodecError};
use crate::model::pairing::{TagId, TaggableId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MAX_DEPTH: usize = 256;

const TAG: u8 = b'T';
const TAGGABLES: u8 = b'L';
const UNIVERSE: u8 = b'U';
const EMPTY: u8 = b'E';
const COMPLEMENT: u8 = b'~';
const OPEN_GROUP: u8 = b'(';
const CLOSE_GROUP: u8 = b')';
const UNION: u8 = b'|';
const INTERSECT: u8 = b'&';
const DIFFERENCE: u8 = b'-';
const SYMMETRIC_DIFFERENCE: u8 = b'^';
const TAG_CONDITIONAL: u8 = b'A';
const EXPR_CONDITIONAL: u8 = b'X';
const COUNT: u8 = b'C';
const PERCENTAGE: u8 = b'P';
const FILTERED_PERCENTAGE: u8 = b'F';

#[derive(Debug, Clone, PartialEq)]
pub enum ExprError {
    Codec(CodecError),
    TooDeep { offset: usize },
    UnknownComparator { offset: usize, code: [u8; 2] },
    InvalidRatio { offset: usize },
}

impl Display for ExprError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Codec(err) => write!(f, "{err}"),
            Self::TooDeep { offset } => {
                write!(f, "expression nesting exceeds {MAX_DEPTH} at offset {offset}")
            }
            Self::UnknownComparator { offset, code } => write!(
                f,
                "unknown comparator {:?} at offset {offset}",
                String::from_utf8_lossy(code)
            ),
            Self::InvalidRatio { offset } => write!(f, "non-finite ratio at offset {offset}"),
        }
    }
}

impl Error for ExprError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for ExprError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparator {
    pub fn code(self) -> [u8; 2] {
        match self {
            Self::Less => *b"< ",
            Self::LessOrEqual => *b"<=",
            Self::Greater => *b"> ",
            Self::GreaterOrEqual => *b">=",
        }
    }

    pub fn from_code(code: [u8; 2]) -> Option<Self> {
        match &code {
            b"< " => Some(Self::Less),
            b"<=" => Some(Self::LessOrEqual),
            b"> " => Some(Self::Greater),
            b">=" => Some(Self::GreaterOrEqual),
            _ => None,
        }
    }

    pub fn holds<T: PartialOrd>(self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterOrEqual => lhs >= rhs,
        }
    }
}

/// Filter applied to each candidate of a conditional union.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Keep the candidate iff `|candidate ∩ compare| <cmp> threshold`.
    Count {
        comparator: Comparator,
        threshold: u64,
        compare: Expr,
    },
    /// Keep the candidate iff `|candidate ∩ compare| / |candidate| <cmp> ratio`.
    Percentage {
        comparator: Comparator,
        ratio: f32,
        compare: Expr,
    },
    /// Like `Percentage`, with the candidate first narrowed to `filter`.
    FilteredPercentage {
        comparator: Comparator,
        ratio: f32,
        filter: Expr,
        compare: Expr,
    },
}

/// Set-algebra expression over taggables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Tag(TagId),
    Taggables(Vec<TaggableId>),
    Universe,
    Empty,
    Complement(Box<Expr>),
    Union(Vec<Expr>),
    Intersect(Vec<Expr>),
    Difference(Box<Expr>, Box<Expr>),
    SymmetricDifference(Box<Expr>, Box<Expr>),
    ConditionalExpressionListUnion {
        candidates: Vec<Expr>,
        conditions: Vec<Condition>,
    },
}

impl Expr {
    pub fn tag(id: TagId) -> Self {
        Self::Tag(id)
    }

    pub fn complement(expr: Expr) -> Self {
        Self::Complement(Box::new(expr))
    }

    pub fn union(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Self::Union(exprs.into_iter().collect())
    }

    pub fn intersect(exprs: impl IntoIterator<Item = Expr>) -> Self {
        Self::Intersect(exprs.into_iter().collect())
    }

    pub fn difference(lhs: Expr, rhs: Expr) -> Self {
        Self::Difference(Box::new(lhs), Box::new(rhs))
    }

    pub fn symmetric_difference(lhs: Expr, rhs: Expr) -> Self {
        Self::SymmetricDifference(Box::new(lhs), Box::new(rhs))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    /// Decodes one expression spanning all of `bytes`; empty input is the
    /// Universe.
    pub fn decode(bytes: &[u8]) -> Result<Self, ExprError> {
        let mut reader = ByteReader::new(bytes);
        let (expr, closed) = read_sequence(&mut reader, 0)?;
        if closed {
            return Err(CodecError::UnknownTag {
                offset: reader.offset() - 1,
                tag: CLOSE_GROUP,
            }
            .into());
        }
        reader.finish()?;
        Ok(expr)
    }

    /// Decodes an expression, treating empty input as absent.
    pub fn decode_optional(bytes: &[u8]) -> Result<Option<Self>, ExprError> {
        if bytes.is_empty() {
            Ok(None)
        } else {
            Self::decode(bytes).map(Some)
        }
    }

    /// Writes `self` as a single operand.
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Tag(id) => {
                put_u8(out, TAG);
                put_u64(out, *id);
            }
            Self::Taggables(ids) => {
                put_u8(out, TAGGABLES);
                put_u64(out, ids.len() as u64);
                put_ids(out, ids);
            }
            Self::Universe => put_u8(out, UNIVERSE),
            Self::Empty => put_u8(out, EMPTY),
            Self::Complement(inner) => {
                put_u8(out, COMPLEMENT);
                inner.write(out);
            }
            Self::Union(exprs) if exprs.is_empty() => put_u8(out, EMPTY),
            Self::Intersect(exprs) if exprs.is_empty() => put_u8(out, UNIVERSE),
            Self::Union(exprs) => write_group(out, UNION, exprs.iter()),
            Self::Intersect(exprs) => write_group(out, INTERSECT, exprs.iter()),
            Self::Difference(lhs, rhs) => write_group(out, DIFFERENCE, [&**lhs, &**rhs]),
            Self::SymmetricDifference(lhs, rhs) => {
                write_group(out, SYMMETRIC_DIFFERENCE, [&**lhs, &**rhs])
            }
            Self::ConditionalExpressionListUnion {
                candidates,
                conditions,
            } => {
                let tags: Option<Vec<TagId>> = candidates
                    .iter()
                    .map(|candidate| match candidate {
                        Self::Tag(id) => Some(*id),
                        _ => None,
                    })
                    .collect();
                match tags {
                    Some(tags) => {
                        put_u8(out, TAG_CONDITIONAL);
                        put_u64(out, tags.len() as u64);
                        put_ids(out, &tags);
                    }
                    None => {
                        put_u8(out, EXPR_CONDITIONAL);
                        put_u64(out, candidates.len() as u64);
                        for candidate in candidates {
                            candidate.write(out);
                        }
                    }
                }
                for condition in conditions {
                    condition.write(out);
                }
                put_u8(out, CLOSE_GROUP);
            }
        }
    }

    /// Writes `self` as a `)`-terminated sequence.
    fn write_sequence(&self, out: &mut Vec<u8>) {
        self.write(out);
        put_u8(out, CLOSE_GROUP);
    }
}

impl Condition {
    fn write(&self, out: &mut Vec<u8>) {
        match self {
            Self::Count {
                comparator,
                threshold,
                compare,
            } => {
                put_u8(out, COUNT);
                out.extend_from_slice(&comparator.code());
                put_u64(out, *threshold);
                compare.write_sequence(out);
            }
            Self::Percentage {
                comparator,
                ratio,
                compare,
            } => {
                put_u8(out, PERCENTAGE);
                out.extend_from_slice(&comparator.code());
                put_f32_le(out, *ratio);
                compare.write_sequence(out);
            }
            Self::FilteredPercentage {
                comparator,
                ratio,
                filter,
                compare,
            } => {
                put_u8(out, FILTERED_PERCENTAGE);
                out.extend_from_slice(&comparator.code());
                put_f32_le(out, *ratio);
                filter.write_sequence(out);
                compare.write_sequence(out);
            }
        }
    }
}

fn write_group<'a>(out: &mut Vec<u8>, op: u8, exprs: impl IntoIterator<Item = &'a Expr>) {
    put_u8(out, OPEN_GROUP);
    for (position, expr) in exprs.into_iter().enumerate() {
        if position > 0 {
            put_u8(out, op);
        }
        expr.write(out);
    }
    put_u8(out, CLOSE_GROUP);
}

/// Reads operands and operators up to a `)` or the end of input.
///
/// Returns the folded expression and whether a `)` ended the sequence.
fn read_sequence(reader: &mut ByteReader<'_>, depth: usize) -> Result<(Expr, bool), ExprError> {
    if depth >= MAX_DEPTH {
        return Err(ExprError::TooDeep {
            offset: reader.offset(),
        });
    }
    match reader.peek_u8() {
        None => return Ok((Expr::Universe, false)),
        Some(CLOSE_GROUP) => {
            reader.read_u8()?;
            return Ok((Expr::Universe, true));
        }
        Some(_) => {}
    }

    let mut acc = read_operand(reader, depth)?;
    // Set while `acc` is a union or intersection built by this sequence.
    let mut chained: Option<u8> = None;
    while !reader.is_empty() {
        let offset = reader.offset();
        let op = reader.read_u8()?;
        if op == CLOSE_GROUP {
            return Ok((acc, true));
        }
        if !matches!(op, UNION | INTERSECT | DIFFERENCE | SYMMETRIC_DIFFERENCE) {
            return Err(CodecError::UnknownTag { offset, tag: op }.into());
        }
        let rhs = read_operand(reader, depth)?;
        acc = match (op, acc) {
            (UNION, Expr::Union(mut exprs)) if chained == Some(UNION) => {
                exprs.push(rhs);
                Expr::Union(exprs)
            }
            (INTERSECT, Expr::Intersect(mut exprs)) if chained == Some(INTERSECT) => {
                exprs.push(rhs);
                Expr::Intersect(exprs)
            }
            (UNION, lhs) => Expr::Union(vec![lhs, rhs]),
            (INTERSECT, lhs) => Expr::Intersect(vec![lhs, rhs]),
            (DIFFERENCE, lhs) => Expr::difference(lhs, rhs),
            (_, lhs) => Expr::symmetric_difference(lhs, rhs),
        };
        chained = Some(op);
    }
    Ok((acc, false))
}

fn read_operand(reader: &mut ByteReader<'_>, depth: usize) -> Result<Expr, ExprError> {
    let offset = reader.offset();
    if depth >= MAX_DEPTH {
        return Err(ExprError::TooDeep { offset });
    }
    let expr = match reader.read_u8()? {
        TAG => Expr::Tag(reader.read_u64()?),
        TAGGABLES => Expr::Taggables(reader.read_counted_ids()?),
        UNIVERSE => Expr::Universe,
        EMPTY => Expr::Empty,
        COMPLEMENT => Expr::complement(read_operand(reader, depth + 1)?),
        OPEN_GROUP => read_sequence(reader, depth + 1)?.0,
        TAG_CONDITIONAL => {
            let candidates = reader
                .read_counted_ids()?
                .into_iter()
                .map(Expr::Tag)
                .collect();
            read_conditions(reader, depth, candidates)?
        }
        EXPR_CONDITIONAL => {
            let count = reader.read_count(1)?;
            let mut candidates = Vec::with_capacity(count);
            for _ in 0..count {
                candidates.push(read_operand(reader, depth + 1)?);
            }
            read_conditions(reader, depth, candidates)?
        }
        tag => return Err(CodecError::UnknownTag { offset, tag }.into()),
    };
    Ok(expr)
}

/// Reads conditions up to the `)` closing a conditional union.
fn read_conditions(
    reader: &mut ByteReader<'_>,
    depth: usize,
    candidates: Vec<Expr>,
) -> Result<Expr, ExprError> {
    let mut conditions = Vec::new();
    while let Some(tag) = reader.peek_u8() {
        if tag == CLOSE_GROUP {
            reader.read_u8()?;
            break;
        }
        conditions.push(read_condition(reader, depth + 1)?);
    }
    Ok(Expr::ConditionalExpressionListUnion {
        candidates,
        conditions,
    })
}

fn read_condition(reader: &mut ByteReader<'_>, depth: usize) -> Result<Condition, ExprError> {
    let offset = reader.offset();
    let tag = reader.read_u8()?;
    if !matches!(tag, COUNT | PERCENTAGE | FILTERED_PERCENTAGE) {
        return Err(CodecError::UnknownTag { offset, tag }.into());
    }
    let comparator = read_comparator(reader)?;
    let condition = match tag {
        COUNT => {
            let threshold = reader.read_u64()?;
            Condition::Count {
                comparator,
                threshold,
                compare: read_sequence(reader, depth)?.0,
            }
        }
        PERCENTAGE => {
            let ratio = read_ratio(reader)?;
            Condition::Percentage {
                comparator,
                ratio,
                compare: read_sequence(reader, depth)?.0,
            }
        }
        _ => {
            let ratio = read_ratio(reader)?;
            let filter = read_sequence(reader, depth)?.0;
            Condition::FilteredPercentage {
                comparator,
                ratio,
                filter,
                compare: read_sequence(reader, depth)?.0,
            }
        }
    };
    Ok(condition)
}

fn read_comparator(reader: &mut ByteReader<'_>) -> Result<Comparator, ExprError> {
    let offset = reader.offset();
    let raw = reader.take(2)?;
    let code = [raw[0], raw[1]];
    Comparator::from_code(code).ok_or(ExprError::UnknownComparator { offset, code })
}

fn read_ratio(reader: &mut ByteReader<'_>) -> Result<f32, ExprError> {
    let offset = reader.offset();
    let ratio = reader.read_f32_le()?;
    if ratio.is_finite() {
        Ok(ratio)
    } else {
        Err(ExprError::InvalidRatio { offset })
    }
}
