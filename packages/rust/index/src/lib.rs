//! Bulk loading of enriched documents into the search index.
//!
//! This crate provides:
//! - [`BulkBatcher`]: accumulates `index` action/document line pairs and flushes them
//!   as one NDJSON `_bulk` request, reporting a [`FlushOutcome`] instead of failing
//! - [`BulkTransport`]: the submission seam, with [`HttpBulkTransport`] for real endpoints

mod batch;
mod transport;

pub use batch::{BulkBatcher, DETAIL_LIMIT, FlushOutcome};
pub use transport::{BulkResponse, BulkTransport, HttpBulkOptions, HttpBulkTransport};
