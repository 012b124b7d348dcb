use crate::diagnostics::DEFAULT_LOG_CAPACITY;
use crate::resilience::{BreakerConfig, RetryPolicy, RetryStrategyKind};
use crate::{Error, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix, e.g. `NETDIAG__RETRY__MAX_ATTEMPTS=5`
pub const ENV_PREFIX: &str = "NETDIAG";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub probe: ProbeConfig,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    pub diagnostics: DiagnosticsConfig,
    pub logging: LoggingConfig,
}

/// Target of the HTTP probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub url: String,
    /// Per-attempt deadline; exceeding it counts as a retryable timeout
    pub timeout_ms: u64,
    /// Exact status code to require, any 2xx when unset
    pub expected_status: Option<u16>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/health".to_string(),
            timeout_ms: 5_000,
            expected_status: None,
        }
    }
}

impl ProbeConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Maximum retained events
    pub log_capacity: usize,
    /// Buffer of the live event feed; slow subscribers lag past this
    pub broadcast_capacity: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            broadcast_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Command-line overrides applied on top of the loaded configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub url: Option<String>,
    pub strategy: Option<RetryStrategyKind>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub throttle_delay_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub log_level: Option<String>,
    pub json_logs: Option<bool>,
}

impl Config {
    /// Load defaults, then an optional TOML file, then `NETDIAG__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::invalid("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::invalid("config", e.to_string()))
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.url {
            self.probe.url.clone_from(url);
        }
        if let Some(strategy) = overrides.strategy {
            self.retry.strategy = strategy;
        }
        if let Some(max_attempts) = overrides.max_attempts {
            self.retry.max_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = overrides.base_delay_ms {
            self.retry.base_delay_ms = base_delay_ms;
        }
        if let Some(throttle) = overrides.throttle_delay_ms {
            self.retry.throttle_delay_ms = throttle;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.probe.timeout_ms = timeout_ms;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level.clone_from(level);
        }
        if let Some(json) = overrides.json_logs {
            self.logging.json = json;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.probe.url)
            .map_err(|e| Error::invalid("probe.url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid(
                "probe.url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if self.probe.timeout_ms == 0 {
            return Err(Error::invalid("probe.timeout_ms", "must be positive"));
        }

        self.retry.validate()?;

        if self.breaker.failure_threshold == 0 {
            return Err(Error::invalid("breaker.failure_threshold", "must be at least 1"));
        }

        if self.diagnostics.log_capacity == 0 {
            return Err(Error::invalid("diagnostics.log_capacity", "must be at least 1"));
        }

        if self.diagnostics.broadcast_capacity == 0 {
            return Err(Error::invalid(
                "diagnostics.broadcast_capacity",
                "must be at least 1",
            ));
        }

        Ok(())
    }
}
