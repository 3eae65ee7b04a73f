// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mts_bench::synthetic_mooring;
use mts_core::ExecutionContext;
use mts_detect::{DeploymentConfig, DeploymentDetector, DetectionMethod};

fn bench_method(c: &mut Criterion, label: &str, method: DetectionMethod) {
    let data = synthetic_mooring(100_000, 12).expect("synthetic mooring should be valid");
    let detector = DeploymentDetector::new(DeploymentConfig {
        method,
        ..DeploymentConfig::default()
    })
    .expect("benchmark config should be valid");
    let ctx = ExecutionContext::new();

    c.bench_function(&format!("deployment_{label}_n1e5_levels12"), |b| {
        b.iter(|| {
            detector
                .detect(black_box(&data), black_box(&ctx))
                .expect("detection should succeed")
        })
    });
}

fn benchmark_sigma_band(c: &mut Criterion) {
    bench_method(c, "sigma_band", DetectionMethod::SigmaBand);
}

fn benchmark_change_point(c: &mut Criterion) {
    bench_method(c, "change_point", DetectionMethod::change_point());
}

fn benchmark_quantile_dwell(c: &mut Criterion) {
    bench_method(c, "quantile_dwell", DetectionMethod::quantile_dwell());
}

fn benchmark_histogram_split(c: &mut Criterion) {
    bench_method(c, "histogram_split", DetectionMethod::histogram_split());
}

criterion_group!(
    benches,
    benchmark_sigma_band,
    benchmark_change_point,
    benchmark_quantile_dwell,
    benchmark_histogram_split
);
criterion_main!(benches);
