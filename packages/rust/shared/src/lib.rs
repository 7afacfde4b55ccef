//! Shared types, error model, and configuration for orgenrich.
//!
//! This crate is the foundation depended on by all other orgenrich crates.
//! It provides:
//! - [`EnrichError`]: the unified error type
//! - Domain types ([`CanonicalRecord`], [`EnrichedDocument`], [`AfiBand`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RunSettings`], config loading)
//! - The per-run log artifact ([`RunLog`])

pub mod config;
pub mod error;
pub mod runlog;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GenerationConfig, IndexConfig, PathsConfig, RunSettings, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_source_paths,
};
pub use error::{EnrichError, Result};
pub use runlog::{LogBuffer, RunLog};
pub use types::{
    AfiBand, Anomaly, CANONICAL_KEYS, CanonicalRecord, ENRICHMENT_KEYS, EnrichedDocument,
    Record, RunId, WARNING_KEY, doc_id_for,
};
