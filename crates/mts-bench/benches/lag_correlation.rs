// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mts_bench::{bathtub_profile, synthetic_mooring};
use mts_clock::{LagCorrelationAnalyzer, LagCorrelationConfig, lag_correlation};
use mts_core::ExecutionContext;

fn benchmark_lag_correlation(c: &mut Criterion) {
    let x = bathtub_profile(20_000, 500, 0, 11);
    let y = bathtub_profile(20_000, 500, 7, 12);
    c.bench_function("lag_correlation_n2e4_lag200", |b| {
        b.iter(|| {
            lag_correlation(black_box(&x), black_box(&y), 200, 10)
                .expect("equal lengths should correlate")
        })
    });
}

fn benchmark_analyzer(c: &mut Criterion) {
    let data = synthetic_mooring(20_000, 8).expect("synthetic mooring should be valid");
    let analyzer = LagCorrelationAnalyzer::new(LagCorrelationConfig {
        max_lag_divisor: 20,
        ..LagCorrelationConfig::default()
    })
    .expect("benchmark config should be valid");
    let ctx = ExecutionContext::new();

    c.bench_function("lag_analyzer_n2e4_levels8_sub5", |b| {
        b.iter(|| {
            analyzer
                .analyze(black_box(&data), 0, black_box(&ctx))
                .expect("lag analysis should succeed")
        })
    });
}

criterion_group!(benches, benchmark_lag_correlation, benchmark_analyzer);
criterion_main!(benches);
