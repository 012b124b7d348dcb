use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the diagnostics subsystem
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (permanent failures)
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // Probe failures
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Probe timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Network failure: {message}")]
    Network { message: String },

    // Synthetic failure, no network attempt was made
    #[error("Circuit open after {consecutive_failures} consecutive failures, retry in {retry_in:?}")]
    CircuitOpen {
        consecutive_failures: u32,
        retry_in: Duration,
    },

    // Client errors (permanent - don't retry)
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Service error: {0}")]
    Service(String),
}

/// Classification of a failed attempt, used to decide retry eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The probe exceeded its own deadline - retryable
    Timeout,
    /// Any other failure - surfaced immediately
    Other,
    /// Rejected by the circuit breaker before reaching the network
    CircuitOpen,
}

impl Error {
    /// Classify the error for the retry executor
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Http(e) if e.is_timeout() => FailureKind::Timeout,
            Self::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => FailureKind::Timeout,
            Self::CircuitOpen { .. } => FailureKind::CircuitOpen,
            _ => FailureKind::Other,
        }
    }

    /// Only timeouts are considered transient
    pub fn is_retryable(&self) -> bool {
        self.failure_kind() == FailureKind::Timeout
    }

    /// Shorthand for a non-retryable network failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
