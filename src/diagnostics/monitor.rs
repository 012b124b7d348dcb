use super::events::{DiagnosticEvent, EventKind, EventLog, NetworkStateChange, PingRecord};
use super::statistics::{AttemptOutcome, PingStatistics, StatisticsAggregator};
use crate::config::{Config, DiagnosticsConfig};
use crate::probe::{MetadataSource, Probe, StaticMetadata};
use crate::resilience::{BreakerConfig, BreakerStatus, CircuitBreaker, RetryExecutor, RetryPolicy};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Everything a UI layer needs to render the diagnostics screen
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Newest first
    pub events: Vec<DiagnosticEvent>,
    pub statistics: PingStatistics,
    pub policy: RetryPolicy,
    pub breaker: BreakerStatus,
    pub running: bool,
}

/// State shared between the monitor handle and its probe loop
struct Shared {
    /// Held for a whole probe cycle, which serializes cycles with resets
    /// and policy changes
    executor: Mutex<RetryExecutor>,
    policy: watch::Sender<RetryPolicy>,
    statistics: RwLock<StatisticsAggregator>,
    log: RwLock<EventLog>,
    /// Copy of the executor's breaker as of the last cycle or reset. Status
    /// is derived from it at read time so the reset window keeps ticking
    /// while no cycle runs.
    breaker: RwLock<CircuitBreaker>,
    events: broadcast::Sender<DiagnosticEvent>,
    metadata: Arc<dyn MetadataSource>,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Continuous network probe loop with retry, circuit breaking and statistics.
///
/// A monitor owns one [`RetryExecutor`] (and therefore one circuit
/// breaker), one statistics aggregator and one event log. At most one probe
/// loop runs per monitor; [`start`](Self::start) while running is a no-op.
pub struct DiagnosticsMonitor {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl DiagnosticsMonitor {
    /// Create a monitor with no ambient metadata
    #[must_use]
    pub fn new(
        policy: RetryPolicy,
        breaker: BreakerConfig,
        diagnostics: &DiagnosticsConfig,
    ) -> Self {
        Self::with_metadata(
            policy,
            breaker,
            diagnostics,
            Arc::new(StaticMetadata::default()),
        )
    }

    /// Create a monitor that snapshots `metadata` on every cycle
    #[must_use]
    pub fn with_metadata(
        policy: RetryPolicy,
        breaker: BreakerConfig,
        diagnostics: &DiagnosticsConfig,
        metadata: Arc<dyn MetadataSource>,
    ) -> Self {
        let executor = RetryExecutor::new(breaker);
        let breaker_snapshot = executor.breaker().clone();
        let (policy_tx, _) = watch::channel(policy);
        let (events_tx, _) = broadcast::channel(diagnostics.broadcast_capacity.max(1));

        Self {
            shared: Arc::new(Shared {
                executor: Mutex::new(executor),
                policy: policy_tx,
                statistics: RwLock::new(StatisticsAggregator::new()),
                log: RwLock::new(EventLog::with_capacity(diagnostics.log_capacity)),
                breaker: RwLock::new(breaker_snapshot),
                events: events_tx,
                metadata,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Create a monitor from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.retry.clone(),
            config.breaker.clone(),
            &config.diagnostics,
        )
    }

    /// Start the probe loop. Returns `false` when a loop is already running.
    #[instrument(skip(self, probe), fields(target = probe.target()))]
    pub async fn start(&self, probe: Arc<dyn Probe>, policy: RetryPolicy) -> Result<bool> {
        policy.validate()?;

        let mut worker = self.worker.lock().await;
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            debug!("Probe loop already running, ignoring start");
            return Ok(false);
        }

        self.set_policy(policy).await?;

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            shared.run_loop(probe, token).await;
        });

        *worker = Some(Worker { cancel, handle });
        info!("Probe loop started");
        Ok(true)
    }

    /// Stop the probe loop. The cycle in flight, including its retry
    /// waits, completes before this returns.
    pub async fn stop(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().await.take() else {
            return Ok(());
        };

        worker.cancel.cancel();
        worker
            .handle
            .await
            .map_err(|e| Error::Service(format!("Probe loop terminated abnormally: {e}")))?;

        info!("Probe loop stopped");
        Ok(())
    }

    /// Whether the probe loop task is alive
    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Run exactly one probe cycle outside the loop
    pub async fn run_cycle(&self, probe: &dyn Probe) -> DiagnosticEvent {
        self.shared.run_cycle(probe).await
    }

    /// Replace the retry policy. A different policy resets the circuit
    /// breaker and the statistics.
    pub async fn set_policy(&self, policy: RetryPolicy) -> Result<()> {
        policy.validate()?;

        let mut executor = self.shared.executor.lock().await;
        let changed = self.shared.policy.send_if_modified(|current| {
            if *current == policy {
                false
            } else {
                *current = policy;
                true
            }
        });

        if changed {
            executor.reset_circuit_breaker();
            self.shared.statistics.write().await.reset();
            *self.shared.breaker.write().await = executor.breaker().clone();
            info!("Retry policy updated: {:?}", *self.shared.policy.borrow());
        }
        Ok(())
    }

    /// Force the circuit breaker closed
    pub async fn reset_circuit_breaker(&self) {
        let mut executor = self.shared.executor.lock().await;
        executor.reset_circuit_breaker();
        *self.shared.breaker.write().await = executor.breaker().clone();
    }

    /// Clear the event log, statistics and circuit breaker
    pub async fn clear_logs(&self) {
        let mut executor = self.shared.executor.lock().await;
        executor.reset_circuit_breaker();
        self.shared.log.write().await.clear();
        self.shared.statistics.write().await.reset();
        *self.shared.breaker.write().await = executor.breaker().clone();
        info!("Diagnostics log cleared");
    }

    /// Merge an externally observed network change into the feed
    pub async fn record_network_event(&self, change: NetworkStateChange) -> DiagnosticEvent {
        self.merge_network_event(Utc::now(), change).await
    }

    /// Like [`record_network_event`](Self::record_network_event) for events
    /// observed earlier; they are placed by timestamp
    pub async fn merge_network_event(
        &self,
        timestamp: DateTime<Utc>,
        change: NetworkStateChange,
    ) -> DiagnosticEvent {
        let event = DiagnosticEvent::at(timestamp, EventKind::NetworkStateChange(change));
        self.shared.publish(event.clone()).await;
        event
    }

    /// Live feed of every event appended to the log
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.shared.events.subscribe()
    }

    /// Get the active retry policy
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.shared.policy.borrow().clone()
    }

    /// Get current ping statistics
    pub async fn statistics(&self) -> PingStatistics {
        self.shared.statistics.read().await.snapshot()
    }

    /// Circuit breaker status evaluated against the current time
    pub async fn breaker_status(&self) -> BreakerStatus {
        self.shared.breaker.read().await.status()
    }

    /// Up to `limit` newest events
    pub async fn events(&self, limit: usize) -> Vec<DiagnosticEvent> {
        self.shared.log.read().await.latest(limit)
    }

    /// Capture log, statistics, policy and breaker in one value
    pub async fn snapshot(&self) -> DiagnosticsSnapshot {
        let events = self.shared.log.read().await.iter().cloned().collect();
        DiagnosticsSnapshot {
            events,
            statistics: self.statistics().await,
            policy: self.policy(),
            breaker: self.breaker_status().await,
            running: self.is_running().await,
        }
    }
}

impl Drop for DiagnosticsMonitor {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut() {
            worker.cancel.cancel();
        }
    }
}

impl Shared {
    async fn run_loop(&self, probe: Arc<dyn Probe>, cancel: CancellationToken) {
        debug!("Probe loop entered for {}", probe.target());

        while !cancel.is_cancelled() {
            self.run_cycle(probe.as_ref()).await;

            let throttle = self.policy.borrow().throttle_delay();
            if throttle.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = sleep(throttle) => {}
            }
        }

        debug!("Probe loop exited for {}", probe.target());
    }

    async fn run_cycle(&self, probe: &dyn Probe) -> DiagnosticEvent {
        let metadata = self.metadata.snapshot();

        let mut executor = self.executor.lock().await;
        let policy = self.policy.borrow().clone();

        let started = Instant::now();
        let outcome = executor
            .execute_with_retry(|| probe.probe(), &policy)
            .await;
        let summary = AttemptOutcome::from_retry(&outcome, started.elapsed());

        let (status, message) = match &outcome.result {
            Ok(response) => (
                response.status,
                format!(
                    "{} reachable in {} ms ({} retries)",
                    probe.target(),
                    summary.total_elapsed_ms,
                    summary.attempts_used
                ),
            ),
            Err(e) => {
                if matches!(e, Error::CircuitOpen { .. }) {
                    warn!("Probe of {} skipped: {}", probe.target(), e);
                } else {
                    debug!("Probe of {} failed: {}", probe.target(), e);
                }
                (None, format!("{} unreachable: {e}", probe.target()))
            }
        };

        let event = DiagnosticEvent::new(EventKind::Ping(PingRecord {
            target: probe.target().to_string(),
            strategy: policy.strategy,
            outcome: summary,
            status,
            message,
            metadata,
        }));

        self.statistics.write().await.record(&summary);
        *self.breaker.write().await = executor.breaker().clone();
        self.publish(event.clone()).await;
        drop(executor);

        event
    }

    async fn publish(&self, event: DiagnosticEvent) {
        self.log.write().await.push(event.clone());
        // no subscribers is fine
        if self.events.send(event).is_err() {
            debug!("No live subscribers for diagnostic event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::events::NetworkState;
    use crate::probe::{FnProbe, ProbeResponse};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn monitor() -> DiagnosticsMonitor {
        DiagnosticsMonitor::new(
            RetryPolicy::default(),
            BreakerConfig::default(),
            &DiagnosticsConfig::default(),
        )
    }

    fn counting_probe(counter: Arc<AtomicU32>) -> Arc<dyn Probe> {
        Arc::new(FnProbe::new("counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(ProbeResponse::new(Some(200), Duration::from_millis(1))) }
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycle_records_outcome() {
        let monitor = monitor();
        let counter = Arc::new(AtomicU32::new(0));
        let probe = counting_probe(counter.clone());

        let event = monitor.run_cycle(probe.as_ref()).await;
        let record = event.as_ping().unwrap();
        assert!(record.outcome.succeeded);
        assert_eq!(record.status, Some(200));

        let stats = monitor.statistics().await;
        assert_eq!(stats.total_requests, 1);
        assert_eq!(monitor.events(10).await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let monitor = monitor();
        let counter = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::simple(1, 0).with_throttle(1_000);

        assert!(monitor
            .start(counting_probe(counter.clone()), policy.clone())
            .await
            .unwrap());
        assert!(!monitor
            .start(counting_probe(counter.clone()), policy)
            .await
            .unwrap());
        assert!(monitor.is_running().await);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        monitor.stop().await.unwrap();

        // one loop: cycles at t=0, 1000, 2000
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert!(!monitor.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_policy_change_resets_statistics() {
        let monitor = monitor();
        let probe = counting_probe(Arc::new(AtomicU32::new(0)));
        monitor.run_cycle(probe.as_ref()).await;
        assert_eq!(monitor.statistics().await.total_requests, 1);

        // same policy leaves state alone
        monitor.set_policy(RetryPolicy::default()).await.unwrap();
        assert_eq!(monitor.statistics().await.total_requests, 1);

        monitor
            .set_policy(RetryPolicy::intelligent(3, 100))
            .await
            .unwrap();
        assert_eq!(monitor.statistics().await.total_requests, 0);
        assert_eq!(monitor.policy(), RetryPolicy::intelligent(3, 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_policy_rejected() {
        let monitor = monitor();
        let result = monitor.set_policy(RetryPolicy::simple(0, 10)).await;
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_logs() {
        let monitor = monitor();
        let probe = counting_probe(Arc::new(AtomicU32::new(0)));
        monitor.run_cycle(probe.as_ref()).await;
        monitor
            .record_network_event(NetworkStateChange::new(NetworkState::Lost))
            .await;
        assert_eq!(monitor.events(100).await.len(), 2);

        monitor.clear_logs().await;
        let snapshot = monitor.snapshot().await;
        assert!(snapshot.events.is_empty());
        assert_eq!(snapshot.statistics, PingStatistics::default());
        assert!(!snapshot.breaker.open);
    }
}
