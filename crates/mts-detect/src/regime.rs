// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::window::BottomWindow;
use mts_core::stats::{finite_count, finite_mean, finite_std, percentile};
use mts_core::{SeaSource, TimeSeries};

/// In-water baseline of one level.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SeaStatistics {
    pub mean: f64,
    /// Sample standard deviation (ddof = 1); 0 for a single in-window sample.
    pub std: f64,
    pub source: SeaSource,
    /// Finite samples the statistics were computed from.
    pub samples: usize,
}

/// Baseline mean/std over the inclusive bottom window.
///
/// A window holding no samples falls back to the interquartile subset of the
/// whole series, then to the whole series when that subset is empty too.
pub fn sea_values(series: &TimeSeries<'_>, window: &BottomWindow) -> SeaStatistics {
    let in_window: Vec<f64> = series
        .time
        .iter()
        .zip(series.values)
        .filter(|(t, _)| window.contains(**t))
        .map(|(_, v)| *v)
        .collect();

    if !in_window.is_empty() {
        let samples = finite_count(&in_window);
        let std = if samples > 1 {
            finite_std(&in_window, 1)
        } else {
            0.0
        };
        return SeaStatistics {
            mean: finite_mean(&in_window),
            std,
            source: SeaSource::Window,
            samples,
        };
    }

    let q25 = percentile(series.values, 25.0);
    let q75 = percentile(series.values, 75.0);
    let interquartile: Vec<f64> = series
        .values
        .iter()
        .copied()
        .filter(|v| *v >= q25 && *v <= q75)
        .collect();

    if interquartile.is_empty() {
        return SeaStatistics {
            mean: finite_mean(series.values),
            std: finite_std(series.values, 1),
            source: SeaSource::FullSeries,
            samples: finite_count(series.values),
        };
    }

    let std = if interquartile.len() > 1 {
        finite_std(&interquartile, 1)
    } else {
        finite_std(series.values, 1)
    };
    SeaStatistics {
        mean: finite_mean(&interquartile),
        std,
        source: SeaSource::InterquartileProxy,
        samples: interquartile.len(),
    }
}
