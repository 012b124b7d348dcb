use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed - probes flow normally
    Closed,
    /// Circuit is open - probes are rejected without touching the network
    Open { retry_in: Duration },
}

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive timeout failures needed to open the circuit
    pub failure_threshold: u32,
    /// Time since the last failure after which the circuit closes again
    pub reset_window_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_window_ms: 30_000,
        }
    }
}

impl BreakerConfig {
    /// Reset window as a [`Duration`]
    #[must_use]
    pub const fn reset_window(&self) -> Duration {
        Duration::from_millis(self.reset_window_ms)
    }
}

/// Serializable view of the breaker for display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub open: bool,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    /// Milliseconds until the circuit closes on its own, when open
    pub retry_in_ms: Option<u64>,
}

/// Consecutive-failure circuit breaker.
///
/// There is no half-open state: the breaker counts timeout failures and
/// rejects calls while the count is at or above the threshold and the last
/// failure is younger than the reset window. Reset happens on the next
/// success, lazily once the window has elapsed, or explicitly via [`reset`].
///
/// [`reset`]: CircuitBreaker::reset
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a new closed circuit breaker
    #[must_use]
    pub const fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            last_failure: None,
        }
    }

    /// Current state, without mutating the counters
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    fn state_at(&self, now: Instant) -> CircuitState {
        if self.consecutive_failures < self.config.failure_threshold {
            return CircuitState::Closed;
        }

        match self.last_failure {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                let window = self.config.reset_window();
                if elapsed < window {
                    CircuitState::Open {
                        retry_in: window - elapsed,
                    }
                } else {
                    CircuitState::Closed
                }
            }
            None => CircuitState::Closed,
        }
    }

    /// Whether calls are currently being rejected
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state(), CircuitState::Open { .. })
    }

    /// Gate a call. Clears a stale failure count once the reset window has
    /// passed; returns [`Error::CircuitOpen`] while the circuit is open.
    pub fn check(&mut self) -> Result<()> {
        let now = Instant::now();

        if let Some(last) = self.last_failure {
            if self.consecutive_failures > 0
                && now.saturating_duration_since(last) >= self.config.reset_window()
            {
                debug!(
                    "Circuit breaker: reset window elapsed, clearing {} failures",
                    self.consecutive_failures
                );
                self.consecutive_failures = 0;
            }
        }

        match self.state_at(now) {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { retry_in } => Err(Error::CircuitOpen {
                consecutive_failures: self.consecutive_failures,
                retry_in,
            }),
        }
    }

    /// Record a timeout failure
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(Instant::now());

        if self.consecutive_failures == self.config.failure_threshold {
            warn!(
                "Circuit breaker: opening after {} consecutive failures",
                self.consecutive_failures
            );
        }
    }

    /// Record a successful call, closing the circuit
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            debug!(
                "Circuit breaker: success after {} failures, closing",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// Force the circuit closed with a zero failure count
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.last_failure = None;
        info!("Circuit breaker: reset to Closed state");
    }

    /// Timeout failures since the last success or reset
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// When the most recent failure was recorded
    #[must_use]
    pub const fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Get the breaker configuration
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Snapshot for display. A failure count whose reset window has
    /// elapsed is reported as zero, matching what the next [`check`] sees.
    ///
    /// [`check`]: CircuitBreaker::check
    #[must_use]
    pub fn status(&self) -> BreakerStatus {
        let now = Instant::now();
        let retry_in_ms = match self.state_at(now) {
            CircuitState::Open { retry_in } => {
                Some(u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX))
            }
            CircuitState::Closed => None,
        };
        let expired = self
            .last_failure
            .is_some_and(|last| now.saturating_duration_since(last) >= self.config.reset_window());

        BreakerStatus {
            open: retry_in_ms.is_some(),
            consecutive_failures: if expired { 0 } else { self.consecutive_failures },
            failure_threshold: self.config.failure_threshold,
            retry_in_ms,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    fn tripped() -> CircuitBreaker {
        let mut cb = CircuitBreaker::default();
        for _ in 0..5 {
            cb.record_failure();
        }
        cb
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_closed_below_threshold() {
        let mut cb = CircuitBreaker::default();
        for _ in 0..4 {
            cb.record_failure();
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.check().is_ok());
        assert_eq!(cb.consecutive_failures(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_on_fifth_failure() {
        let mut cb = tripped();

        assert!(cb.is_open());
        let err = cb.check().unwrap_err();
        assert!(matches!(
            err,
            Error::CircuitOpen {
                consecutive_failures: 5,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_reset_after_window() {
        let mut cb = tripped();

        advance(Duration::from_millis(29_999)).await;
        assert!(cb.check().is_err());

        advance(Duration::from_millis(1)).await;
        assert!(cb.check().is_ok());
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_count() {
        let mut cb = tripped();
        cb.record_success();

        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_reset() {
        let mut cb = tripped();
        cb.reset();

        assert!(cb.check().is_ok());
        assert!(cb.last_failure().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_retry_in() {
        let cb = tripped();
        advance(Duration::from_secs(10)).await;

        let status = cb.status();
        assert!(status.open);
        assert_eq!(status.consecutive_failures, 5);
        assert_eq!(status.retry_in_ms, Some(20_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_closes_after_window_without_check() {
        let cb = tripped();
        advance(Duration::from_secs(31)).await;

        let status = cb.status();
        assert!(!status.open);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.retry_in_ms, None);
    }
}
