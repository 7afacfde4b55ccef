//! Pending bulk batch and flush classification.

use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use orgenrich_shared::{EnrichError, EnrichedDocument, Result};

use crate::transport::{BulkResponse, BulkTransport};

/// Characters of a failed response body kept for the log.
pub const DETAIL_LIMIT: usize = 600;

/// Result of one [`BulkBatcher::flush`]. Flushing never returns an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending; no request was made.
    Empty,
    /// 2xx and no per-item errors.
    Indexed { docs: usize },
    /// The server answered with a non-2xx status or reported per-item errors.
    Rejected {
        status: u16,
        docs: usize,
        detail: String,
    },
    /// The request never got a response.
    TransportFailed { docs: usize, detail: String },
}

impl FlushOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Empty | Self::Indexed { .. })
    }

    /// Documents that were in the batch when it was flushed.
    pub fn docs(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Indexed { docs }
            | Self::Rejected { docs, .. }
            | Self::TransportFailed { docs, .. } => *docs,
        }
    }
}

/// Append-only batch of `index` action/document line pairs.
pub struct BulkBatcher<T> {
    transport: T,
    lines: Vec<String>,
    flush_lines: usize,
}

impl<T: BulkTransport> BulkBatcher<T> {
    /// `flush_docs` documents (two lines each) make a full batch.
    pub fn new(transport: T, flush_docs: usize) -> Self {
        Self {
            transport,
            lines: Vec::new(),
            flush_lines: flush_docs.max(1) * 2,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Queue `document` under `id`. Earlier entries with the same id are kept.
    pub fn add(&mut self, id: &str, document: &EnrichedDocument) -> Result<()> {
        let action = json!({ "index": { "_id": id } }).to_string();
        let line = serde_json::to_string(document)
            .map_err(|e| EnrichError::Index(format!("failed to serialize document {id}: {e}")))?;

        self.lines.push(action);
        self.lines.push(line);
        Ok(())
    }

    pub fn pending_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn pending_docs(&self) -> usize {
        self.lines.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether the batch has reached its size threshold.
    pub fn should_flush(&self) -> bool {
        self.lines.len() >= self.flush_lines
    }

    /// Send everything pending and empty the batch, whatever the result.
    #[instrument(skip_all, fields(docs = self.pending_docs()))]
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.lines.is_empty() {
            return FlushOutcome::Empty;
        }

        let lines = std::mem::take(&mut self.lines);
        let docs = lines.len() / 2;
        let mut body = lines.join("\n");
        body.push('\n');

        match self.transport.submit(body).await {
            Ok(response) => {
                let outcome = classify(response, docs);
                match &outcome {
                    FlushOutcome::Indexed { .. } => debug!(docs, "bulk request accepted"),
                    _ => warn!(docs, ?outcome, "bulk request rejected"),
                }
                outcome
            }
            Err(e) => {
                warn!(docs, error = %e, "bulk request failed");
                FlushOutcome::TransportFailed {
                    docs,
                    detail: truncate(&e.to_string(), DETAIL_LIMIT),
                }
            }
        }
    }
}

fn classify(response: BulkResponse, docs: usize) -> FlushOutcome {
    let ok_status = (200..300).contains(&response.status);
    if ok_status && !reports_item_errors(&response.body) {
        return FlushOutcome::Indexed { docs };
    }

    FlushOutcome::Rejected {
        status: response.status,
        docs,
        detail: truncate(&response.body, DETAIL_LIMIT),
    }
}

/// `_bulk` answers 200 even when some items fail and flags it with `"errors": true`.
fn reports_item_errors(body: &str) -> bool {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value.get("errors").and_then(Value::as_bool).unwrap_or(false),
        Err(_) => body.contains(r#""errors":true"#),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
