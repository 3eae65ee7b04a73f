// SPDX-License-Identifier: MIT OR Apache-2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use mts_clock::{
    ConsensusConfig, ConsensusResolver, LagCorrelationAnalyzer, LagCorrelationConfig,
    suggest_reference,
};
use mts_core::{DiagnosticLog, ExecutionContext, InstrumentLevel, MooringDataset, TimeAxis};
use mts_detect::{
    BottomWindowStrategy, BoundaryPolarity, DeploymentConfig, DeploymentDetector, DetectionMethod,
    ThresholdConfig, WarmSideMode,
};

struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn next_u8(&mut self) -> u8 {
        let value = self.data.get(self.offset).copied().unwrap_or(0);
        self.offset = self.offset.saturating_add(1);
        value
    }

    fn next_i16(&mut self) -> i16 {
        i16::from_le_bytes([self.next_u8(), self.next_u8()])
    }
}

fn bounded(seed: u8, min: usize, max: usize) -> usize {
    min + usize::from(seed) % (max - min + 1)
}

fn build_strategy(seed: u8, value_seed: u8, t0: i64, span: i64) -> BottomWindowStrategy {
    match seed % 3 {
        0 => BottomWindowStrategy::FixedHours {
            margin_hours: f64::from(value_seed) / 8.0,
        },
        1 => BottomWindowStrategy::PercentSpan {
            inner_fraction: f64::from(value_seed % 100) / 200.0,
        },
        _ => {
            let cut = span / 4;
            BottomWindowStrategy::DeploymentBounds {
                deployment_ns: (value_seed & 1 == 0).then_some(t0 + cut),
                recovery_ns: (value_seed & 2 == 0).then_some(t0 + span - cut),
                margin_hours: f64::from(value_seed % 16) / 4.0,
            }
        }
    }
}

fn build_method(seed: u8, value_seed: u8) -> DetectionMethod {
    match seed % 4 {
        0 => DetectionMethod::SigmaBand,
        1 => DetectionMethod::ChangePoint {
            surface_window_hours: f64::from(value_seed % 48),
            smooth_window: bounded(value_seed, 1, 15),
            dwell_seconds: f64::from(value_seed) * 30.0,
            tol_sigma: f64::from(value_seed % 8) / 2.0,
        },
        2 => DetectionMethod::HistogramSplit {
            bins: bounded(value_seed, 3, 64),
        },
        _ => DetectionMethod::QuantileDwell {
            quantile: f64::from(value_seed) / 255.0,
            dwell_seconds: f64::from(value_seed) * 30.0,
            smooth_window: bounded(value_seed, 1, 9),
        },
    }
}

fn build_value(mode_seed: u8, raw_seed: i16) -> f64 {
    match mode_seed % 8 {
        0 => f64::NAN,
        1 => f64::INFINITY,
        2 => 2.0,
        3 => 20.0,
        _ => f64::from(raw_seed) / 512.0,
    }
}

fuzz_target!(|data: &[u8]| {
    let mut cursor = ByteCursor::new(data);

    let n = bounded(cursor.next_u8(), 2, 160);
    let n_levels = bounded(cursor.next_u8(), 1, 5);
    let step_ns = 1 + i64::from(cursor.next_u8()) * 15_000_000_000;
    let t0 = i64::from(cursor.next_i16()) * 1_000_000_000;
    let duplicate_every = bounded(cursor.next_u8(), 0, 12);

    let mut time = Vec::with_capacity(n);
    let mut t = t0;
    for idx in 0..n {
        if duplicate_every == 0 || idx % duplicate_every != 0 {
            t = t.saturating_add(step_ns);
        }
        time.push(t);
    }
    let Ok(axis) = TimeAxis::new(time) else {
        return;
    };
    let span = axis.span_ns();

    let levels = (0..n_levels)
        .map(|_| {
            let values = (0..n)
                .map(|_| build_value(cursor.next_u8(), cursor.next_i16()))
                .collect();
            InstrumentLevel::new(values).with_clock_offset(f64::from(cursor.next_i16()))
        })
        .collect();
    let Ok(dataset) = MooringDataset::new(axis, levels) else {
        return;
    };

    let config = DeploymentConfig {
        strategy: build_strategy(cursor.next_u8(), cursor.next_u8(), t0, span),
        threshold: ThresholdConfig {
            band_sigma: f64::from(cursor.next_u8() % 32) / 8.0,
            warm_side: match cursor.next_u8() % 3 {
                0 => WarmSideMode::High,
                1 => WarmSideMode::Low,
                _ => WarmSideMode::Auto,
            },
            smooth_window: bounded(cursor.next_u8(), 1, 15),
            ..ThresholdConfig::default()
        },
        method: build_method(cursor.next_u8(), cursor.next_u8()),
        polarity: if cursor.next_u8() & 1 == 0 {
            BoundaryPolarity::RespectThreshold
        } else {
            BoundaryPolarity::AlwaysBelow
        },
    };

    let log = DiagnosticLog::new();
    let ctx = ExecutionContext::new().with_sink(&log);
    let Ok(detector) = DeploymentDetector::new(config) else {
        return;
    };
    let Ok(annotations) = detector.detect(&dataset, &ctx) else {
        return;
    };

    let bin_width_sec = 1.0 + f64::from(cursor.next_u8()) * 4.0;
    let Ok(resolver) = ConsensusResolver::new(ConsensusConfig { bin_width_sec }) else {
        return;
    };
    let reference = match resolver.resolve_annotations(&annotations, &ctx) {
        Ok(consensus) => suggest_reference(&consensus, &ctx).index,
        Err(_) => usize::from(cursor.next_u8()) % n_levels,
    };

    let lag_config = LagCorrelationConfig {
        sub_sample: bounded(cursor.next_u8(), 1, 6),
        min_overlap: bounded(cursor.next_u8(), 0, 20),
        max_lag_divisor: bounded(cursor.next_u8(), 1, 8),
    };
    if let Ok(analyzer) = LagCorrelationAnalyzer::new(lag_config) {
        let _ = analyzer.analyze(&dataset, reference, &ctx);
    }
});
