use criterion::{black_box, criterion_group, criterion_main, Criterion};
use network_diagnostics::diagnostics::{EventKind, NetworkState, NetworkStateChange};
use network_diagnostics::{
    AttemptOutcome, DiagnosticEvent, EventLog, FailureKind, StatisticsAggregator,
};

fn benchmark_statistics(c: &mut Criterion) {
    c.bench_function("record_outcome", |b| {
        let mut agg = StatisticsAggregator::new();
        let success = AttemptOutcome::success(1, 120);
        let failure = AttemptOutcome::failure(FailureKind::Timeout, 3, 900);
        b.iter(|| {
            agg.record(black_box(&success));
            agg.record(black_box(&failure));
        });
    });
}

fn benchmark_event_log(c: &mut Criterion) {
    c.bench_function("push_full_log", |b| {
        let mut log = EventLog::new();
        let event = DiagnosticEvent::new(EventKind::NetworkStateChange(NetworkStateChange::new(
            NetworkState::Changed,
        )));
        for _ in 0..log.capacity() {
            log.push(event.clone());
        }
        b.iter(|| log.push(black_box(DiagnosticEvent::new(event.kind.clone()))));
    });
}

criterion_group!(benches, benchmark_statistics, benchmark_event_log);
criterion_main!(benches);
