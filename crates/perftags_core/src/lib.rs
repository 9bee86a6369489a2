//! Core of the perftags engine: a persistent, crash-consistent many-to-many
//! index between tags and taggables, with a set-algebra query language and a
//! line-oriented command front.

pub mod codec;
pub mod config;
pub mod index;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod search;
pub mod service;
pub mod store;

pub use config::{ConfigError, EngineOptions, ScratchFiles, ServerConfig};
pub use logging::{default_log_level, flush_logging, init_logging, logging_status, LoggingError};
pub use model::pairing::{Family, PairingMap, TagId, TagPairing, TaggableId};
pub use protocol::{Command, ProtocolError, ProtocolResult, Server};
pub use search::{Comparator, Condition, Expr, ExprError};
pub use service::{Engine, EngineError, EngineResult, TaggableTags};
pub use store::{FaultPoint, FlushReport, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
