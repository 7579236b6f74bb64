use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ocpwatch::pipeline::{default_rules, AlertEngine, FilterSettings, HealthScorer, SignalFilter};
use ocpwatch::PublishHub;
use ocpwatch_types::{ChannelSpec, MonitorEvent, Reading, Snapshot, Subsystem};

fn offset_channel() -> ChannelSpec {
    ChannelSpec::numeric("clock_offset_ns", Subsystem::Timing, -1e9, 1e9)
}

fn snapshot(offset: f64) -> Snapshot {
    Snapshot::builder("bench")
        .timestamp_ms(1)
        .number("clock_offset_ns", Subsystem::Timing, offset)
        .text("gnss_sync", Subsystem::Gnss, "SYNC")
        .number("voltage_3v3", Subsystem::Power, 3.31)
        .number("fpga_temp_c", Subsystem::Environment, 55.0)
        .build()
}

/// Benchmark one filtered reading (hot path)
fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    for window in [5usize, 20, 100].iter() {
        let settings = FilterSettings {
            window: *window,
            outlier_threshold: Some(500.0),
            stale_after: 5,
        }
        .resolve(None);
        let mut filter = SignalFilter::new(&offset_channel(), settings);
        let mut i = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(window), window, |b, _| {
            b.iter(|| {
                i += 1;
                filter.filter(black_box(Reading::number((i % 100) as f64)))
            });
        });
    }
    group.finish();
}

/// Benchmark alert evaluation plus scoring of a steady snapshot
fn bench_evaluate(c: &mut Criterion) {
    let engine = AlertEngine::default();
    let rules = default_rules();
    let scorer = HealthScorer::default();
    let snapshot = snapshot(120.0);

    c.bench_function("evaluate_and_score", |b| {
        b.iter(|| {
            engine.apply(black_box(&snapshot), &rules);
            let active = engine.active_alerts("bench");
            scorer.report(&snapshot, &active)
        });
    });
}

/// Benchmark publish across varying subscriber counts
fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");
    let event = MonitorEvent::snapshot(Arc::new(snapshot(120.0)));

    for subscribers in [1usize, 10, 100].iter() {
        let hub = PublishHub::new(64);
        // Never drained: every publish past 64 also exercises eviction
        let _subs: Vec<_> = (0..*subscribers).map(|_| hub.subscribe()).collect();
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, _| {
                b.iter(|| hub.publish(black_box(event.clone())));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_filter, bench_evaluate, bench_publish);
criterion_main!(benches);
