use super::circuit_breaker::CircuitBreaker;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Retry strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyKind {
    /// Single attempt, never retries
    None,
    /// Constant delay between timeout retries
    Simple,
    /// Doubling delay between timeout retries
    #[default]
    Exponential,
    /// Exponential backoff guarded by a circuit breaker
    Intelligent,
}

impl fmt::Display for RetryStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Simple => "simple",
            Self::Exponential => "exponential",
            Self::Intelligent => "intelligent",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for RetryStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "simple" => Ok(Self::Simple),
            "exponential" => Ok(Self::Exponential),
            "intelligent" | "circuit_breaker" | "circuit-breaker" => Ok(Self::Intelligent),
            other => Err(Error::invalid(
                "strategy",
                format!("unknown retry strategy '{other}'"),
            )),
        }
    }
}

/// Retry policy applied to every probe cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub strategy: RetryStrategyKind,
    /// Maximum attempts per probe cycle
    pub max_attempts: u32,
    /// Base delay between attempts
    pub base_delay_ms: u64,
    /// Pause between probe cycles
    pub throttle_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            strategy: RetryStrategyKind::Exponential,
            max_attempts: 3,
            base_delay_ms: 500,
            throttle_delay_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self {
            strategy: RetryStrategyKind::None,
            max_attempts: 1,
            base_delay_ms: 0,
            throttle_delay_ms: 0,
        }
    }

    /// Constant delay between attempts
    #[must_use]
    pub const fn simple(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            strategy: RetryStrategyKind::Simple,
            max_attempts,
            base_delay_ms,
            throttle_delay_ms: 0,
        }
    }

    /// Delay doubling from `base_delay_ms`
    #[must_use]
    pub const fn exponential(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            strategy: RetryStrategyKind::Exponential,
            max_attempts,
            base_delay_ms,
            throttle_delay_ms: 0,
        }
    }

    /// Exponential delay stretched by recent failures, guarded by the
    /// circuit breaker
    #[must_use]
    pub const fn intelligent(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            strategy: RetryStrategyKind::Intelligent,
            max_attempts,
            base_delay_ms,
            throttle_delay_ms: 0,
        }
    }

    /// Set the pause between probe cycles
    #[must_use]
    pub const fn with_throttle(mut self, throttle_delay_ms: u64) -> Self {
        self.throttle_delay_ms = throttle_delay_ms;
        self
    }

    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub const fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.throttle_delay_ms)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid("max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    /// Build the strategy object for this policy
    #[must_use]
    pub fn build_strategy(&self) -> Box<dyn RetryStrategy> {
        let base_delay = self.base_delay();
        match self.strategy {
            RetryStrategyKind::None => Box::new(NoRetry),
            RetryStrategyKind::Simple => Box::new(FixedDelay { base_delay }),
            RetryStrategyKind::Exponential => Box::new(ExponentialBackoff { base_delay }),
            RetryStrategyKind::Intelligent => Box::new(AdaptiveBackoff { base_delay }),
        }
    }
}

/// Delay schedule for one retry strategy.
///
/// `attempt` is the zero-based index of the attempt that just timed out.
/// `None` means the strategy does not retry at all.
pub trait RetryStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> RetryStrategyKind;

    fn next_delay(&self, attempt: u32, breaker: &CircuitBreaker) -> Option<Duration>;

    /// Whether the executor must gate calls and record results on the breaker
    fn uses_circuit_breaker(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn kind(&self) -> RetryStrategyKind {
        RetryStrategyKind::None
    }

    fn next_delay(&self, _attempt: u32, _breaker: &CircuitBreaker) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub base_delay: Duration,
}

impl RetryStrategy for FixedDelay {
    fn kind(&self) -> RetryStrategyKind {
        RetryStrategyKind::Simple
    }

    fn next_delay(&self, _attempt: u32, _breaker: &CircuitBreaker) -> Option<Duration> {
        Some(self.base_delay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
}

impl RetryStrategy for ExponentialBackoff {
    fn kind(&self) -> RetryStrategyKind {
        RetryStrategyKind::Exponential
    }

    fn next_delay(&self, attempt: u32, _breaker: &CircuitBreaker) -> Option<Duration> {
        Some(Duration::from_millis(exponential_ms(self.base_delay, attempt)))
    }
}

/// Exponential backoff stretched by 20% per consecutive breaker failure
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveBackoff {
    pub base_delay: Duration,
}

impl RetryStrategy for AdaptiveBackoff {
    fn kind(&self) -> RetryStrategyKind {
        RetryStrategyKind::Intelligent
    }

    fn next_delay(&self, attempt: u32, breaker: &CircuitBreaker) -> Option<Duration> {
        let base_ms = u128::from(exponential_ms(self.base_delay, attempt));
        // (1 + 0.2 * n) == (5 + n) / 5, integer division floors
        let factor = 5 + u128::from(breaker.consecutive_failures());
        let scaled = base_ms.saturating_mul(factor) / 5;
        Some(Duration::from_millis(
            u64::try_from(scaled).unwrap_or(u64::MAX),
        ))
    }

    fn uses_circuit_breaker(&self) -> bool {
        true
    }
}

/// `base * 2^attempt` in whole milliseconds, saturating
fn exponential_ms(base: Duration, attempt: u32) -> u64 {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let multiplier = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    base_ms.saturating_mul(multiplier)
}
