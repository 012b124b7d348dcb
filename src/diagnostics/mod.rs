//! # Diagnostics
//!
//! Continuous probing, ping statistics and the bounded diagnostic event
//! log exposed to UI layers.

pub mod events;
pub mod monitor;
pub mod statistics;

pub use events::{
    DiagnosticEvent, EventKind, EventLog, NetworkState, NetworkStateChange, PingRecord,
    DEFAULT_LOG_CAPACITY,
};
pub use monitor::{DiagnosticsMonitor, DiagnosticsSnapshot};
pub use statistics::{AttemptOutcome, PingStatistics, StatisticsAggregator};
