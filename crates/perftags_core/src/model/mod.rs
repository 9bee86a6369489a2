//! Domain model for the tag/taggable relation.
//!
//! # Responsibility
//! - Define the two caller-assigned ID universes and the pairing batch shape.
//!
//! # Invariants
//! - IDs are opaque `u64` values; core never generates them.
//! - A pairing carries no payload beyond its existence.

pub mod pairing;
