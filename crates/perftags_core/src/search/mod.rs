//! Set-algebra search over taggables.
//!
//! # Responsibility
//! - Decode search expressions from their byte form.
//! - Evaluate them against the tag index without expanding dense buckets.

pub mod eval;
pub mod expr;
pub mod set;

pub use eval::{evaluate, MembershipSource};
pub use expr::{Comparator, Condition, Expr, ExprError};
pub use set::TaggableSet;
