//! Core enrichment logic for orgenrich.
//!
//! This crate turns raw member records into index-ready documents: schema
//! unification, prompt rendering, response validation, and the end-to-end
//! [`Pipeline`] that drives generation and bulk indexing.

pub mod dataset;
pub mod pipeline;
pub mod template;
pub mod unify;
pub mod validate;

pub use dataset::{load_prompt, load_records, parse_records};
pub use pipeline::{Pipeline, PipelineOptions, RunProgress, RunSummary, SilentProgress};
pub use template::{PromptTemplate, render, stringify};
pub use unify::unify_record;
pub use validate::{Validated, ensure_required_keys, normalize_afi, validate_response};
