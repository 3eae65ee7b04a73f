// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_clock::{
    ConsensusConfig, ConsensusResolver, LagCorrelationAnalyzer, LagCorrelationConfig,
    suggest_reference,
};
use mts_core::{
    Diagnostic, DiagnosticLog, ExecutionContext, InstrumentLevel, InstrumentMeta, MooringDataset,
    NS_PER_SECOND, TimeAxis,
};
use mts_detect::{DeploymentConfig, DeploymentDetector};

const MINUTE_NS: i64 = 60 * NS_PER_SECOND;
const T0_NS: i64 = 1_700_000_000 * NS_PER_SECOND;

fn assert_close(actual: f64, expected: f64, tol: f64) {
    assert!(
        (actual - expected).abs() <= tol,
        "actual={actual}, expected={expected}, tol={tol}"
    );
}

fn profile(n: usize, surface: usize, delay: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let deep = i >= surface + delay && i < n - surface + delay;
            if deep { 5.0 } else { 20.0 }
        })
        .collect()
}

fn mooring(delays: &[usize]) -> MooringDataset {
    let n = 1000;
    let time = TimeAxis::uniform(T0_NS, MINUTE_NS, n).expect("uniform axis");
    let levels = delays
        .iter()
        .enumerate()
        .map(|(idx, delay)| {
            InstrumentLevel::new(profile(n, 50, *delay)).with_meta(InstrumentMeta {
                serial_number: Some(format!("{}", 4701 + idx)),
                instrument: Some("microcat".to_string()),
                nominal_depth_m: Some(50.0 + 25.0 * idx as f64),
            })
        })
        .collect();
    MooringDataset::new(time, levels).expect("dataset should be valid")
}

#[test]
fn delayed_level_is_measured_against_the_consensus_group() {
    let data = mooring(&[0, 0, 2]);
    let annotations = DeploymentDetector::new(DeploymentConfig::default())
        .expect("default config is valid")
        .detect(&data, &ExecutionContext::new())
        .expect("detection should succeed");
    let consensus = ConsensusResolver::new(ConsensusConfig::default())
        .expect("default config is valid")
        .resolve_annotations(&annotations, &ExecutionContext::new())
        .expect("consensus should form");

    assert_eq!(consensus.consensus_indices, vec![0, 1]);
    assert_close(consensus.start_offsets_seconds[2], 120.0, 60.0);
    assert_close(consensus.end_offsets_seconds[2], 120.0, 60.0);
    assert_close(consensus.suggested_correction_seconds(2), -120.0, 60.0);
    assert_close(consensus.avg_offsets_seconds[0], 0.0, 1e-9);
    assert_close(consensus.drift_rates_per_day[2], 0.0, 1e-6);
}

#[test]
fn lag_estimate_agrees_with_consensus_correction() {
    let data = mooring(&[0, 0, 2]);
    let log = DiagnosticLog::new();
    let ctx = ExecutionContext::new().with_sink(&log);

    let annotations = DeploymentDetector::new(DeploymentConfig::default())
        .expect("default config is valid")
        .detect(&data, &ctx)
        .expect("detection should succeed");
    let consensus = ConsensusResolver::new(ConsensusConfig::default())
        .expect("default config is valid")
        .resolve_annotations(&annotations, &ctx)
        .expect("consensus should form");
    let reference = suggest_reference(&consensus, &ctx);
    assert_eq!(reference.index, 0);

    let lags = LagCorrelationAnalyzer::new(LagCorrelationConfig {
        sub_sample: 1,
        ..LagCorrelationConfig::default()
    })
    .expect("config is valid")
    .analyze(&data, reference.index, &ctx)
    .expect("lag analysis should succeed");

    assert_eq!(lags.best_lags(), vec![Some(0), Some(0), Some(-2)]);
    let estimate = lags.levels[2].clock_offset_estimate_seconds;
    assert_close(estimate, -120.0, 1e-9);
    assert_close(estimate, consensus.suggested_correction_seconds(2), 60.0);

    let records = log.snapshot();
    let position = |pred: fn(&Diagnostic) -> bool| records.iter().position(pred);
    let consensus_at = position(|d| matches!(d, Diagnostic::ConsensusFormed { .. }));
    let reference_at = position(|d| matches!(d, Diagnostic::ReferenceSuggested { .. }));
    let lag_at = position(|d| matches!(d, Diagnostic::LagResolved { .. }));
    assert!(consensus_at.is_some() && reference_at.is_some() && lag_at.is_some());
    assert!(consensus_at < reference_at);
    assert!(reference_at < lag_at);
}

#[test]
fn early_level_gets_positive_correction() {
    let data = mooring(&[3, 3, 0]);
    let annotations = DeploymentDetector::new(DeploymentConfig::default())
        .expect("default config is valid")
        .detect(&data, &ExecutionContext::new())
        .expect("detection should succeed");
    let consensus = ConsensusResolver::new(ConsensusConfig::default())
        .expect("default config is valid")
        .resolve_annotations(&annotations, &ExecutionContext::new())
        .expect("consensus should form");

    assert_eq!(consensus.consensus_indices, vec![0, 1]);
    assert_close(consensus.start_offsets_seconds[2], -180.0, 60.0);
    assert_close(consensus.suggested_correction_seconds(2), 180.0, 60.0);
}
