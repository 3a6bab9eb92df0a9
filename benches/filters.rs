// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for detection filters.
//!
//! Measures the per-event cost of threshold and sustained-threshold
//! evaluation, the hot path of every registered rule.

use criterion::{criterion_group, criterion_main, Criterion};
use metric_rules::{
    EventFilter, SinkEvent, SustainedThresholdFilter, ThresholdFilter, Window,
};

fn bench_threshold(c: &mut Criterion) {
    c.bench_function("threshold_filter", |b| {
        let mut filter = ThresholdFilter::new(75, true, 0);
        let mut ts = 0i64;
        b.iter(|| {
            ts += 1000;
            let event = SinkEvent::new("system", "load", ts, (ts / 1000 % 100) as i64);
            let _ = filter.excludes(&event);
        });
    });
}

fn bench_sustained_duration(c: &mut Criterion) {
    c.bench_function("sustained_filter_duration_window", |b| {
        let mut filter =
            SustainedThresholdFilter::new(75, true, Window::Duration(60_000), 0.15, 10, 0);
        let mut ts = 0i64;
        b.iter(|| {
            ts += 1000;
            let event = SinkEvent::new("system", "load", ts, 80 + (ts / 1000 % 10) as i64);
            let _ = filter.excludes(&event);
        });
    });
}

fn bench_sustained_amount(c: &mut Criterion) {
    c.bench_function("sustained_filter_amount_window", |b| {
        let mut filter =
            SustainedThresholdFilter::new(75, true, Window::Amount(60), 0.15, 10, 0);
        let mut ts = 0i64;
        b.iter(|| {
            ts += 1000;
            let event = SinkEvent::new("system", "load", ts, 80 + (ts / 1000 % 10) as i64);
            let _ = filter.excludes(&event);
        });
    });
}

criterion_group!(
    benches,
    bench_threshold,
    bench_sustained_duration,
    bench_sustained_amount
);
criterion_main!(benches);
