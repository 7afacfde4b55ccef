//! Bounded retry with exponential backoff around a [`Generator`].

use std::time::Duration;

use tracing::debug;

use orgenrich_shared::{EnrichError, Result, RunLog};

use crate::client::{ChatRequest, Generator};

/// Attempt limit and backoff schedule for one record's generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first call included.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base: Duration,
    /// Largest single delay.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Same attempt limit with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base: Duration::ZERO,
            cap: Duration::ZERO,
        }
    }

    /// Delay after the zero-based `failed_attempt`: `min(cap, base * 2^failed_attempt)`.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(failed_attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

/// Call `generator` until it succeeds, fails with a non-retryable error, or the
/// policy's attempt limit is reached.
///
/// Every attempt and every retried failure is written to `log` under `label`.
/// The final failure is returned as [`EnrichError::Generation`].
pub async fn generate_with_retry<G: Generator>(
    generator: &G,
    policy: &RetryPolicy,
    request: &ChatRequest,
    label: &str,
    log: &RunLog,
) -> Result<String> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(label, attempt, "generation attempt");
        log.info(format!("→ generation request for {label}"));

        match generator.complete(request).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt - 1);
                log.warn(format!(
                    "{label}: attempt {attempt}/{max_attempts} unsuccessful ({e}), retrying in {:.1}s",
                    delay.as_secs_f64()
                ));
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(EnrichError::Generation(format!(
                    "gave up after {attempt} attempt(s): {e}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgenrich_shared::LogBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Generator that fails `fail_count` times, then answers.
    struct FailThenSucceed {
        fail_count: usize,
        calls: AtomicUsize,
        error: fn() -> EnrichError,
    }

    impl FailThenSucceed {
        fn new(fail_count: usize) -> Self {
            Self {
                fail_count,
                calls: AtomicUsize::new(0),
                error: || EnrichError::Network("connection reset".into()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Generator for FailThenSucceed {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_count {
                Err((self.error)())
            } else {
                Ok(r#"{"afi_score":0.8}"#.into())
            }
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("sys", "user")
    }

    #[test]
    fn delay_schedule_doubles_and_caps() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6).map(|n| policy.delay_after(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 20, 20]);
        assert_eq!(policy.delay_after(40), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn succeeds_first_time_without_retry() {
        let generator = FailThenSucceed::new(0);
        let text = generate_with_retry(&generator, &RetryPolicy::immediate(3), &request(), "Acme", &RunLog::discard())
            .await
            .unwrap();
        assert_eq!(text, r#"{"afi_score":0.8}"#);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn two_failures_then_success() {
        let generator = FailThenSucceed::new(2);
        let result =
            generate_with_retry(&generator, &RetryPolicy::immediate(3), &request(), "Acme", &RunLog::discard()).await;
        assert!(result.is_ok());
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn every_attempt_is_written_to_the_run_log() {
        let generator = FailThenSucceed::new(2);
        let buffer = LogBuffer::new();
        let log = RunLog::to_writer(buffer.clone());

        generate_with_retry(&generator, &RetryPolicy::immediate(3), &request(), "Acme", &log)
            .await
            .unwrap();

        let messages = buffer.messages();
        let requests = messages
            .iter()
            .filter(|m| *m == "→ generation request for Acme")
            .count();
        assert_eq!(requests, 3);
        assert!(messages[1].starts_with("Acme: attempt 1/3 unsuccessful (network error: connection reset)"));
        assert!(messages.iter().all(|m| !m.contains(" failed: ")));
    }

    #[tokio::test]
    async fn three_failures_exhaust_attempts() {
        let generator = FailThenSucceed::new(3);
        let err = generate_with_retry(&generator, &RetryPolicy::immediate(3), &request(), "Acme", &RunLog::discard())
            .await
            .unwrap_err();
        assert_eq!(generator.calls(), 3);
        assert!(matches!(err, EnrichError::Generation(_)));
        assert!(err.to_string().contains("3 attempt(s)"));
    }

    #[tokio::test]
    async fn non_retryable_error_stops_immediately() {
        let mut generator = FailThenSucceed::new(5);
        generator.error = || EnrichError::config("bad api key env");
        let result =
            generate_with_retry(&generator, &RetryPolicy::immediate(3), &request(), "Acme", &RunLog::discard()).await;
        assert!(result.is_err());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let generator = FailThenSucceed::new(2);
        let policy = RetryPolicy {
            max_attempts: 3,
            base: Duration::from_millis(5),
            cap: Duration::from_millis(50),
        };
        let started = std::time::Instant::now();
        generate_with_retry(&generator, &policy, &request(), "Acme", &RunLog::discard())
            .await
            .unwrap();
        // 5ms after the first failure, 10ms after the second.
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
