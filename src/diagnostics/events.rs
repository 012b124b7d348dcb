use super::statistics::AttemptOutcome;
use crate::probe::ProbeMetadata;
use crate::resilience::RetryStrategyKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of events retained by an [`EventLog`]
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// Connectivity as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    Available,
    Lost,
    Changed,
}

/// Externally sourced network-state-change event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStateChange {
    pub state: NetworkState,
    /// e.g. "wifi", "cellular"
    pub transport: Option<String>,
    pub details: Option<String>,
}

impl NetworkStateChange {
    #[must_use]
    pub const fn new(state: NetworkState) -> Self {
        Self {
            state,
            transport: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = Some(transport.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Log record for one completed probe cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRecord {
    pub target: String,
    pub strategy: RetryStrategyKind,
    pub outcome: AttemptOutcome,
    /// Status code of the successful response, if any
    pub status: Option<u16>,
    pub message: String,
    pub metadata: ProbeMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Ping(PingRecord),
    NetworkStateChange(NetworkStateChange),
}

/// One entry in the diagnostics feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl DiagnosticEvent {
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self::at(Utc::now(), kind)
    }

    #[must_use]
    pub fn at(timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            kind,
        }
    }

    #[must_use]
    pub const fn as_ping(&self) -> Option<&PingRecord> {
        match &self.kind {
            EventKind::Ping(record) => Some(record),
            EventKind::NetworkStateChange(_) => None,
        }
    }
}

/// Bounded diagnostic event log ordered newest first.
///
/// The log keeps at most `capacity` events. When an insert would exceed the
/// capacity, the oldest event (the back of the log) is discarded. Index 0 is
/// always the most recent event.
///
/// # Complexity
/// - `len`, `is_empty`, `is_full`, `capacity` and eviction are **O(1)**.
/// - `push` is **O(log n)** to locate the slot plus the shift of the
///   `VecDeque` insert; events stamped now land at the front in O(1).
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<DiagnosticEvent>,
    capacity: usize,
}

impl EventLog {
    /// Creates a log holding [`DEFAULT_LOG_CAPACITY`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Creates a log with the provided capacity.
    ///
    /// A capacity of zero is clamped to `1`.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Inserts an event keeping descending timestamp order, discarding the
    /// oldest event when full.
    ///
    /// Events produced by the probe loop are always newest and land at the
    /// front. External events may arrive late and are merged into place.
    pub fn push(&mut self, event: DiagnosticEvent) {
        let index = self
            .entries
            .partition_point(|existing| existing.timestamp > event.timestamp);
        self.entries.insert(index, event);

        if self.entries.len() > self.capacity {
            let _ = self.entries.pop_back();
        }
    }

    /// Returns an iterator visiting events from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.entries.iter()
    }

    /// Returns up to `limit` newest events.
    #[must_use]
    pub fn latest(&self, limit: usize) -> Vec<DiagnosticEvent> {
        self.entries.iter().take(limit).cloned().collect()
    }

    /// Returns the number of events currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the log has no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` when the log reached its capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Returns the maximum number of events the log can hold.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes all events, leaving the capacity unchanged.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn network_event(at: DateTime<Utc>, state: NetworkState) -> DiagnosticEvent {
        DiagnosticEvent::at(
            at,
            EventKind::NetworkStateChange(NetworkStateChange::new(state)),
        )
    }

    #[test]
    fn test_newest_first() {
        let mut log = EventLog::new();
        let now = Utc::now();
        log.push(network_event(now, NetworkState::Available));
        log.push(network_event(now + Duration::seconds(1), NetworkState::Lost));

        let states: Vec<_> = log
            .iter()
            .map(|e| match &e.kind {
                EventKind::NetworkStateChange(change) => change.state,
                EventKind::Ping(_) => unreachable!(),
            })
            .collect();
        assert_eq!(states, vec![NetworkState::Lost, NetworkState::Available]);
    }

    #[test]
    fn test_late_event_merged_by_timestamp() {
        let mut log = EventLog::new();
        let now = Utc::now();
        log.push(network_event(now, NetworkState::Available));
        log.push(network_event(now + Duration::seconds(10), NetworkState::Lost));
        log.push(network_event(now + Duration::seconds(5), NetworkState::Changed));

        let timestamps: Vec<_> = log.iter().map(|e| e.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = EventLog::new();
        let start = Utc::now();
        for i in 0..=DEFAULT_LOG_CAPACITY {
            let offset = i64::try_from(i).unwrap();
            log.push(network_event(
                start + Duration::milliseconds(offset),
                NetworkState::Changed,
            ));
        }

        assert_eq!(log.len(), DEFAULT_LOG_CAPACITY);
        assert!(log.is_full());
        // the very first event is gone
        assert!(log.iter().all(|e| e.timestamp > start));
        assert_eq!(log.latest(1)[0].timestamp, start + Duration::milliseconds(10_000));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut log = EventLog::with_capacity(0);
        assert_eq!(log.capacity(), 1);

        let now = Utc::now();
        log.push(network_event(now, NetworkState::Lost));
        log.push(network_event(now + Duration::seconds(1), NetworkState::Available));

        assert!(log.is_full());
        assert_eq!(log.latest(5)[0].timestamp, now + Duration::seconds(1));
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = network_event(Utc::now(), NetworkState::Lost);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "network_state_change");
        assert_eq!(json["state"], "lost");
        assert!(json["id"].is_string());
    }
}
