use super::circuit_breaker::{BreakerConfig, CircuitBreaker};
use super::policy::{RetryPolicy, RetryStrategyKind};
use crate::Result;
use std::future::Future;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Result of one probe cycle together with the retry bookkeeping
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    /// Zero-based index of the attempt that produced `result`, or
    /// `max_attempts` when every attempt timed out
    pub attempts_used: u32,
}

impl<T> RetryOutcome<T> {
    const fn new(result: Result<T>, attempts_used: u32) -> Self {
        Self {
            result,
            attempts_used,
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs operations under a [`RetryPolicy`]. Owns the circuit breaker used
/// by the intelligent strategy, so one executor corresponds to one stream
/// of probes.
#[derive(Debug, Default)]
pub struct RetryExecutor {
    breaker: CircuitBreaker,
}

impl RetryExecutor {
    /// Create a new executor with a closed breaker
    #[must_use]
    pub const fn new(breaker_config: BreakerConfig) -> Self {
        Self {
            breaker: CircuitBreaker::new(breaker_config),
        }
    }

    /// Get the circuit breaker
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Force the circuit breaker closed
    pub fn reset_circuit_breaker(&mut self) {
        self.breaker.reset();
    }

    /// Execute `operation` with the strategy selected by `policy`.
    ///
    /// Only timeout failures are retried. Any other failure returns
    /// immediately with the index of the attempt it occurred on.
    pub async fn execute_with_retry<T, F, Fut>(
        &mut self,
        operation: F,
        policy: &RetryPolicy,
    ) -> RetryOutcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let strategy = policy.build_strategy();
        let guarded = strategy.uses_circuit_breaker();
        let max_attempts = policy.max_attempts.max(1);

        if guarded {
            if let Err(error) = self.breaker.check() {
                warn!("Probe rejected without network call: {}", error);
                return RetryOutcome::new(Err(error), 0);
            }
        }

        let mut attempt = 0;
        loop {
            debug!(
                "Executing probe (attempt {}/{}, strategy {})",
                attempt + 1,
                max_attempts,
                strategy.kind()
            );

            let error = match operation().await {
                Ok(value) => {
                    if guarded {
                        self.breaker.record_success();
                    }
                    if attempt > 0 {
                        debug!("Probe succeeded after {} retries", attempt);
                    }
                    return RetryOutcome::new(Ok(value), attempt);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                debug!("Probe failed with non-retryable error: {}", error);
                return RetryOutcome::new(Err(error), attempt);
            }

            if guarded {
                self.breaker.record_failure();
            }

            let Some(delay) = strategy.next_delay(attempt, &self.breaker) else {
                return RetryOutcome::new(Err(error), attempt);
            };

            if attempt + 1 >= max_attempts {
                warn!("Probe failed after {} attempts: {}", max_attempts, error);
                return RetryOutcome::new(Err(error), max_attempts);
            }

            debug!(
                "Probe timed out (attempt {}), retrying after {:?}",
                attempt + 1,
                delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Convenience for a one-off call without keeping breaker state around
pub async fn execute_once<T, F, Fut>(operation: F, strategy: RetryStrategyKind) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let policy = RetryPolicy {
        strategy,
        ..RetryPolicy::default()
    };
    RetryExecutor::default()
        .execute_with_retry(operation, &policy)
        .await
        .result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn timeout() -> Error {
        Error::Timeout {
            timeout: Duration::from_secs(1),
        }
    }

    /// Operation that times out `failures` times, then succeeds
    fn flaky(
        failures: u32,
        counter: Arc<AtomicU32>,
    ) -> impl Fn() -> futures::future::Ready<Result<u32>> {
        move || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(if count < failures {
                Err(timeout())
            } else {
                Ok(count)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_none_never_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 1_000,
            ..RetryPolicy::none()
        };

        let start = Instant::now();
        let outcome = executor
            .execute_with_retry(flaky(10, counter.clone()), &policy)
            .await;

        assert!(matches!(outcome.result, Err(Error::Timeout { .. })));
        assert_eq!(outcome.attempts_used, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simple_retries_with_constant_delay() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();

        let start = Instant::now();
        let outcome = executor
            .execute_with_retry(flaky(2, counter.clone()), &RetryPolicy::simple(3, 500))
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts_used, 2);
        assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_doubles_delay() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();

        let start = Instant::now();
        let outcome = executor
            .execute_with_retry(
                flaky(3, counter.clone()),
                &RetryPolicy::exponential(4, 500),
            )
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(start.elapsed(), Duration::from_millis(3_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();

        let start = Instant::now();
        let outcome = executor
            .execute_with_retry(flaky(10, counter.clone()), &RetryPolicy::simple(3, 100))
            .await;

        assert!(matches!(outcome.result, Err(Error::Timeout { .. })));
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        // no wait after the final attempt
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_timeout_short_circuits() {
        for policy in [
            RetryPolicy::simple(5, 100),
            RetryPolicy::exponential(5, 100),
            RetryPolicy::intelligent(5, 100),
        ] {
            let counter = Arc::new(AtomicU32::new(0));
            let counter_clone = counter.clone();
            let mut executor = RetryExecutor::default();

            let outcome = executor
                .execute_with_retry(
                    move || {
                        let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if count == 0 {
                                Err::<(), Error>(timeout())
                            } else {
                                Err(Error::network("connection refused"))
                            }
                        }
                    },
                    &policy,
                )
                .await;

            assert!(matches!(outcome.result, Err(Error::Network { .. })));
            assert_eq!(outcome.attempts_used, 1, "strategy {}", policy.strategy);
            assert_eq!(counter.load(Ordering::SeqCst), 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_after_five_timeouts() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();
        let policy = RetryPolicy::intelligent(5, 10);

        let outcome = executor
            .execute_with_retry(flaky(u32::MAX, counter.clone()), &policy)
            .await;
        assert_eq!(outcome.attempts_used, 5);
        assert_eq!(executor.breaker().consecutive_failures(), 5);

        let outcome = executor
            .execute_with_retry(flaky(u32::MAX, counter.clone()), &policy)
            .await;
        assert!(matches!(outcome.result, Err(Error::CircuitOpen { .. })));
        assert_eq!(outcome.attempts_used, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 5);

        tokio::time::advance(Duration::from_secs(30)).await;

        let outcome = executor
            .execute_with_retry(flaky(0, counter.clone()), &policy)
            .await;
        assert!(outcome.is_success());
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intelligent_delay_grows_with_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();

        let start = Instant::now();
        let outcome = executor
            .execute_with_retry(
                flaky(2, counter.clone()),
                &RetryPolicy::intelligent(3, 100),
            )
            .await;

        // 100 * 1.2 + 200 * 1.4
        assert!(outcome.is_success());
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert_eq!(executor.breaker().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intelligent_ignores_other_failures() {
        let mut executor = RetryExecutor::default();
        let policy = RetryPolicy::intelligent(3, 10);

        for _ in 0..10 {
            let outcome = executor
                .execute_with_retry(
                    || async { Err::<(), Error>(Error::network("refused")) },
                    &policy,
                )
                .await;
            assert_eq!(outcome.attempts_used, 0);
        }

        assert_eq!(executor.breaker().consecutive_failures(), 0);
        assert!(!executor.breaker().is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_keep_failure_count() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();
        let policy = RetryPolicy::intelligent(3, 10);

        let outcome = executor
            .execute_with_retry(flaky(u32::MAX, counter.clone()), &policy)
            .await;
        assert_eq!(outcome.attempts_used, 3);
        assert_eq!(executor.breaker().consecutive_failures(), 3);

        let outcome = executor
            .execute_with_retry(
                || async { Err::<(), Error>(Error::network("connection reset")) },
                &policy,
            )
            .await;

        assert!(matches!(outcome.result, Err(Error::Network { .. })));
        assert_eq!(outcome.attempts_used, 0);
        // neither incremented nor reset
        assert_eq!(executor.breaker().consecutive_failures(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_circuit_breaker() {
        let counter = Arc::new(AtomicU32::new(0));
        let mut executor = RetryExecutor::default();
        let policy = RetryPolicy::intelligent(5, 1);

        let _ = executor
            .execute_with_retry(flaky(u32::MAX, counter.clone()), &policy)
            .await;
        assert!(executor.breaker().is_open());

        executor.reset_circuit_breaker();
        let outcome = executor
            .execute_with_retry(flaky(0, counter.clone()), &policy)
            .await;
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_execute_once() {
        let value = execute_once(|| async { Ok::<u32, Error>(42) }, RetryStrategyKind::Simple)
            .await
            .unwrap();
        assert_eq!(value, 42);
    }
}
