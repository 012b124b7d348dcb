pub mod config;
pub mod diagnostics;
pub mod error;
pub mod probe;
pub mod resilience;

pub use config::{Config, ConfigOverrides};
pub use diagnostics::{
    AttemptOutcome, DiagnosticEvent, DiagnosticsMonitor, DiagnosticsSnapshot, EventLog,
    NetworkState, NetworkStateChange, PingStatistics, StatisticsAggregator,
};
pub use error::{Error, FailureKind, Result};
pub use probe::{FnProbe, HttpProbe, MetadataSource, Probe, ProbeMetadata, ProbeResponse};
pub use resilience::{
    BreakerConfig, CircuitBreaker, RetryExecutor, RetryOutcome, RetryPolicy, RetryStrategy,
    RetryStrategyKind, TimeoutExt,
};
