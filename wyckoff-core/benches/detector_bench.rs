//! Criterion benchmarks for the detector hot path.
//!
//! Benchmarks:
//! 1. Per-bar `update` over series of increasing length
//! 2. Rolling window push at several capacities
//! 3. Daily classification over a finished event table

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use wyckoff_core::classify::classify_daily;
use wyckoff_core::stats::RollingStats;
use wyckoff_core::{Bar, DetectorConfig, IncrementalDetector, RawBar};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2010, 1, 4).unwrap();
    (0..n)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + (t * 0.05).sin() * 20.0 + (t * 0.31).cos() * 3.0;
            let range = 1.5 + (t * 0.7).sin().abs() * 4.0;
            let low = close - range * 0.5;
            Bar::from_raw(&RawBar {
                date: base_date + chrono::Duration::days(i as i64),
                open: close,
                high: low + range,
                low,
                close,
                volume: 1_000_000.0 + ((i * 7919) % 500_000) as f64,
            })
        })
        .collect()
}

// ── 1. Detector update ───────────────────────────────────────────────

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("detector_update");
    for n in [1_000usize, 5_000, 20_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| {
                let mut det = IncrementalDetector::new(DetectorConfig::default()).unwrap();
                for bar in bars {
                    black_box(det.update(bar).unwrap());
                }
            })
        });
    }
    group.finish();
}

// ── 2. Rolling window ────────────────────────────────────────────────

fn bench_rolling(c: &mut Criterion) {
    let mut group = c.benchmark_group("rolling_push");
    for capacity in [20usize, 40, 120] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
            b.iter(|| {
                let mut rs = RollingStats::new(cap);
                for i in 0..2_000 {
                    black_box(rs.push(i as f64 * 0.5));
                }
            })
        });
    }
    group.finish();
}

// ── 3. Daily classification ──────────────────────────────────────────

fn bench_classify(c: &mut Criterion) {
    let bars = make_bars(10_000);
    let mut det = IncrementalDetector::new(DetectorConfig::default()).unwrap();
    let out = det.run(&bars).unwrap();
    let dates: Vec<_> = bars.iter().map(|b| b.date).collect();

    c.bench_function("classify_daily_10k", |b| {
        b.iter(|| black_box(classify_daily(&dates, &out.events)))
    });
}

criterion_group!(benches, bench_update, bench_rolling, bench_classify);
criterion_main!(benches);
