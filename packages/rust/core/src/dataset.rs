//! Loading the input dataset and the prompt file.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, instrument};

use orgenrich_shared::{CanonicalRecord, EnrichError, Result};

use crate::template::PromptTemplate;
use crate::unify::unify_record;

/// Parse a JSON array of objects and unify each one.
///
/// Anything other than an array of objects is rejected as a whole; a run never
/// starts on a partially readable dataset.
pub fn parse_records(json: &str) -> Result<Vec<CanonicalRecord>> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| EnrichError::parse(format!("dataset is not valid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(EnrichError::validation("dataset must be a JSON array of records"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(fields) => Ok(unify_record(fields)),
            _ => Err(EnrichError::validation(format!(
                "record {i} is not a JSON object"
            ))),
        })
        .collect()
}

/// Read and unify the dataset at `path`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_records(path: &Path) -> Result<Vec<CanonicalRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;
    let records = parse_records(&text)?;
    debug!(count = records.len(), "dataset loaded");
    Ok(records)
}

/// Read and split the prompt file at `path`.
pub fn load_prompt(path: &Path) -> Result<PromptTemplate> {
    let text = std::fs::read_to_string(path).map_err(|e| EnrichError::io(path, e))?;
    Ok(PromptTemplate::parse(&text))
}
