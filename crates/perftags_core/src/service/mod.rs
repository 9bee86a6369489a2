//! Engine use-case services.
//!
//! # Responsibility
//! - Turn validated requests into journaled, applied change batches.
//! - Keep the command protocol decoupled from index and storage details.

pub mod engine;
pub(crate) mod staging;

pub use engine::{Engine, EngineError, EngineResult, TaggableTags};
