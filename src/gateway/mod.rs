//! Resilient call gateway.
//!
//! Every external lookup in the pipeline goes through [`Gateway::call`],
//! which retries transient failures with capped exponential backoff and
//! reports each attempt to a process-wide usage sink. Permanent failures
//! propagate unchanged on first occurrence.

pub mod usage;

use crate::config::RetryConfig;
use crate::error::ApiError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use usage::{AttemptOutcome, UsageSink};

/// Retry/backoff wrapper shared by every component that talks to the
/// external API.
pub struct Gateway {
    retry: RetryConfig,
    usage: Arc<dyn UsageSink>,
}

impl Gateway {
    pub fn new(retry: RetryConfig, usage: Arc<dyn UsageSink>) -> Self {
        Self { retry, usage }
    }

    /// Gateway with default retry settings and no usage reporting.
    pub fn unmonitored() -> Self {
        Self::new(RetryConfig::default(), Arc::new(usage::NullSink))
    }

    /// Execute `operation`, retrying transient failures.
    ///
    /// `operation` is re-invoked for each attempt; after `max_retries`
    /// retries the last error is surfaced unchanged. Usage reporting never
    /// affects control flow and is itself never retried.
    pub async fn call<T, F, Fut>(&self, op_name: &str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    self.report(op_name, AttemptOutcome::Success, attempt);
                    return Ok(value);
                }
                Err(err) => {
                    self.report(op_name, AttemptOutcome::Failure, attempt);

                    if !err.is_transient() {
                        debug!(op = op_name, error = %err, "permanent failure, not retrying");
                        return Err(err);
                    }
                    if attempt >= self.retry.max_retries {
                        warn!(
                            op = op_name,
                            attempts = attempt + 1,
                            error = %err,
                            "retry budget exhausted"
                        );
                        return Err(err);
                    }

                    let delay = backoff_delay(&self.retry, attempt);
                    debug!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn report(&self, op_name: &str, outcome: AttemptOutcome, attempt: u32) {
        if let Err(e) = self.usage.record_attempt(op_name, outcome, attempt) {
            // Telemetry is strictly observational; a broken sink must not
            // surface to the caller.
            debug!(op = op_name, error = %e, "usage sink failed");
        }
    }
}

/// `min(base * 2^attempt + jitter, max_delay)`, jitter uniform in [0, 1s).
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exp = retry
        .base_delay()
        .checked_mul(1u32 << attempt.min(16))
        .unwrap_or(retry.max_delay());
    let with_jitter = exp + jitter();
    with_jitter.min(retry.max_delay())
}

/// Jitter in [0, 1000ms) from the clock's sub-second nanos.
fn jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    Duration::from_millis(u64::from(nanos % 1_000_000) % 1000)
}

#[cfg(test)]
mod tests {
    use super::usage::MemorySink;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_gateway(max_retries: u32) -> (Gateway, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let retry = RetryConfig {
            max_retries,
            base_delay_ms: 1,
            max_delay_ms: 5,
        };
        (Gateway::new(retry, sink.clone()), sink)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (gateway, sink) = fast_gateway(3);
        let result = gateway.call("op", || async { Ok::<_, ApiError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(sink.attempts("op"), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let (gateway, sink) = fast_gateway(3);
        let calls = AtomicU32::new(0);

        let result = gateway
            .call("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ApiError::from_status(500, "flaky"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.attempts("op"), 3);
    }

    #[tokio::test]
    async fn test_exhausts_budget_and_surfaces_last_error() {
        let (gateway, _sink) = fast_gateway(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = gateway
            .call("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::from_status(429, "slow down")) }
            })
            .await;

        // 3 retries = 4 attempts total.
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(result, Err(ApiError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let (gateway, sink) = fast_gateway(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), ApiError> = gateway
            .call("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ApiError::from_status(404, "missing")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.attempts("op"), 1);
        assert!(matches!(result, Err(ApiError::NotFound { .. })));
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_retries: 10,
            base_delay_ms: 500,
            max_delay_ms: 2_000,
        };
        for attempt in 0..12 {
            assert!(backoff_delay(&retry, attempt) <= Duration::from_millis(2_000));
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let retry = RetryConfig {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 60_000,
        };
        // Lower bound ignores jitter, upper bound allows the full 1s of it.
        let d0 = backoff_delay(&retry, 0);
        let d2 = backoff_delay(&retry, 2);
        assert!(d0 >= Duration::from_millis(100));
        assert!(d0 < Duration::from_millis(1_100));
        assert!(d2 >= Duration::from_millis(400));
        assert!(d2 < Duration::from_millis(1_400));
    }
}
