use crate::error::FailureKind;
use crate::resilience::RetryOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of one probe cycle, fed to the aggregator once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptOutcome {
    pub succeeded: bool,
    pub attempts_used: u32,
    pub total_elapsed_ms: u64,
    pub failure_kind: Option<FailureKind>,
}

impl AttemptOutcome {
    /// Outcome of a cycle that ended in success
    #[must_use]
    pub const fn success(attempts_used: u32, total_elapsed_ms: u64) -> Self {
        Self {
            succeeded: true,
            attempts_used,
            total_elapsed_ms,
            failure_kind: None,
        }
    }

    /// Outcome of a cycle that ended in failure
    #[must_use]
    pub const fn failure(kind: FailureKind, attempts_used: u32, total_elapsed_ms: u64) -> Self {
        Self {
            succeeded: false,
            attempts_used,
            total_elapsed_ms,
            failure_kind: Some(kind),
        }
    }

    /// Summarize an executor result
    pub fn from_retry<T>(outcome: &RetryOutcome<T>, elapsed: Duration) -> Self {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match &outcome.result {
            Ok(_) => Self::success(outcome.attempts_used, elapsed_ms),
            Err(e) => Self::failure(e.failure_kind(), outcome.attempts_used, elapsed_ms),
        }
    }
}

/// Running ping statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PingStatistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_retries: u64,
    /// Mean elapsed time of successful cycles only
    pub average_response_time_ms: f64,
    pub min_response_time_ms: Option<u64>,
    pub max_response_time_ms: Option<u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PingStatistics {
    /// Percentage of successful cycles, 0 when nothing was recorded
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64 * 100.0
        }
    }
}

/// Accumulates [`AttemptOutcome`]s into [`PingStatistics`]. Never rolls back.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAggregator {
    stats: PingStatistics,
}

impl StatisticsAggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one probe cycle into the totals
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, outcome: &AttemptOutcome) {
        let stats = &mut self.stats;
        stats.total_requests += 1;
        stats.total_retries += u64::from(outcome.attempts_used);
        stats.last_updated = Some(Utc::now());

        if !outcome.succeeded {
            stats.failed_requests += 1;
            return;
        }

        let previous = stats.successful_requests as f64;
        stats.successful_requests += 1;
        let elapsed = outcome.total_elapsed_ms;
        stats.average_response_time_ms = stats
            .average_response_time_ms
            .mul_add(previous, elapsed as f64)
            / stats.successful_requests as f64;
        stats.min_response_time_ms = Some(
            stats
                .min_response_time_ms
                .map_or(elapsed, |m| m.min(elapsed)),
        );
        stats.max_response_time_ms = Some(
            stats
                .max_response_time_ms
                .map_or(elapsed, |m| m.max(elapsed)),
        );
    }

    /// Reset all counters to zero
    pub fn reset(&mut self) {
        self.stats = PingStatistics::default();
    }

    /// Get an owned copy of the statistics
    #[must_use]
    pub fn snapshot(&self) -> PingStatistics {
        self.stats.clone()
    }

    /// Borrow the statistics
    #[must_use]
    pub const fn stats(&self) -> &PingStatistics {
        &self.stats
    }
}
