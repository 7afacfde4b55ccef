//! End-to-end enrichment run: render → generate → validate → batch → flush.

use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use orgenrich_generation::{ChatRequest, Generator, RetryPolicy, generate_with_retry};
use orgenrich_index::{BulkBatcher, BulkTransport, FlushOutcome};
use orgenrich_shared::{CanonicalRecord, EnrichedDocument, Result, RunId, RunLog};

use crate::template::PromptTemplate;
use crate::validate::validate_response;

/// Knobs for one [`Pipeline::run`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Retry schedule for each generation call.
    pub retry: RetryPolicy,
    /// Process only the first `limit` records.
    pub limit: Option<usize>,
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: RunId,
    /// Records attempted.
    pub records: usize,
    /// Documents added to a batch.
    pub indexed: usize,
    /// Records skipped after an error.
    pub failed: usize,
    /// Documents carrying a `validation_warning`.
    pub anomalies: usize,
    /// Bulk requests sent.
    pub flushes: usize,
    /// Bulk requests that were rejected or never answered.
    pub failed_flushes: usize,
    pub elapsed: Duration,
}

/// Progress callback for reporting run status.
pub trait RunProgress: Send + Sync {
    /// Called before a record is rendered. `position` is zero-based.
    fn record_started(&self, name: &str, position: usize, total: usize);
    /// Called once the record was batched (`ok`) or skipped.
    fn record_finished(&self, name: &str, ok: bool);
    /// Called after every bulk request.
    fn flushed(&self, outcome: &FlushOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn record_started(&self, _name: &str, _position: usize, _total: usize) {}
    fn record_finished(&self, _name: &str, _ok: bool) {}
    fn flushed(&self, _outcome: &FlushOutcome) {}
}

/// Everything one run needs: the generation client, the pending bulk batch, and the
/// run log. Records are processed strictly one at a time.
pub struct Pipeline<G, T> {
    generator: G,
    batcher: BulkBatcher<T>,
    log: RunLog,
    options: PipelineOptions,
}

impl<G: Generator, T: BulkTransport> Pipeline<G, T> {
    pub fn new(generator: G, batcher: BulkBatcher<T>, log: RunLog, options: PipelineOptions) -> Self {
        Self {
            generator,
            batcher,
            log,
            options,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn batcher(&self) -> &BulkBatcher<T> {
        &self.batcher
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Enrich and index `records` in order.
    ///
    /// A failing record is logged under its display name and skipped. The batch is
    /// flushed whenever it fills up and once more after the last record.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn run(
        &mut self,
        records: &[CanonicalRecord],
        prompt: &PromptTemplate,
        progress: &dyn RunProgress,
    ) -> RunSummary {
        let start = Instant::now();
        let run_id = RunId::new();
        let total = self
            .options
            .limit
            .map_or(records.len(), |limit| limit.min(records.len()));

        let mut summary = RunSummary {
            run_id: run_id.clone(),
            records: 0,
            indexed: 0,
            failed: 0,
            anomalies: 0,
            flushes: 0,
            failed_flushes: 0,
            elapsed: Duration::ZERO,
        };

        self.log.info(format!("===== Run started ({run_id}) ====="));
        self.log.info(format!("Loaded {} records, processing {total}", records.len()));
        self.log.info(if prompt.has_instruction() {
            "Prompt parsed: SYSTEM and USER sections"
        } else {
            "Prompt parsed: no SYSTEM section, whole text used as request template"
        });

        for (position, record) in records.iter().take(total).enumerate() {
            let name = record.display_name(position);
            progress.record_started(&name, position, total);
            summary.records += 1;

            match self.enrich(record, prompt, &name).await {
                Ok(document) => {
                    if document.anomaly().is_some() {
                        summary.anomalies += 1;
                    }
                    match self.batcher.add(&record.doc_id(), &document) {
                        Ok(()) => {
                            summary.indexed += 1;
                            progress.record_finished(&name, true);
                        }
                        Err(e) => {
                            summary.failed += 1;
                            self.log.warn(format!("{name} failed: {e}"));
                            progress.record_finished(&name, false);
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    self.log.warn(format!("{name} failed: {e}"));
                    progress.record_finished(&name, false);
                }
            }

            if self.batcher.should_flush() {
                self.flush(&mut summary, progress).await;
            }
        }

        self.flush(&mut summary, progress).await;

        summary.elapsed = start.elapsed();
        info!(
            %run_id,
            indexed = summary.indexed,
            failed = summary.failed,
            anomalies = summary.anomalies,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "run complete"
        );
        self.log.info(format!(
            "===== Run finished: {} indexed, {} failed, {} anomalies in {:.1}s =====",
            summary.indexed,
            summary.failed,
            summary.anomalies,
            summary.elapsed.as_secs_f64()
        ));

        summary
    }

    /// Render, generate, and validate one record.
    async fn enrich(
        &self,
        record: &CanonicalRecord,
        prompt: &PromptTemplate,
        name: &str,
    ) -> Result<EnrichedDocument> {
        let request = ChatRequest::new(&prompt.instruction, prompt.render(record));

        let raw = generate_with_retry(
            &self.generator,
            &self.options.retry,
            &request,
            name,
            &self.log,
        )
        .await?;

        let validated = validate_response(record, &raw);
        if let Some(err) = &validated.decode_error {
            self.log.warn(format!("JSON error for {}: {err}", record.doc_id()));
        }
        Ok(validated.document)
    }

    async fn flush(&mut self, summary: &mut RunSummary, progress: &dyn RunProgress) {
        let outcome = self.batcher.flush().await;

        match &outcome {
            FlushOutcome::Empty => return,
            FlushOutcome::Indexed { docs } => {
                self.log.info(format!("Bulk ok: {docs} docs"));
            }
            FlushOutcome::Rejected {
                status,
                docs,
                detail,
            } => {
                summary.failed_flushes += 1;
                self.log
                    .warn(format!("Bulk index error: {status} ({docs} docs) {detail}"));
            }
            FlushOutcome::TransportFailed { docs, detail } => {
                summary.failed_flushes += 1;
                warn!(docs, "bulk batch discarded");
                self.log
                    .warn(format!("Bulk transport error ({docs} docs): {detail}"));
            }
        }

        summary.flushes += 1;
        progress.flushed(&outcome);
    }
}
