// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_core::stats::{nan_median, percentile, rolling_median_centered};
use mts_core::{MtsError, TimeSeries, WarmSide, add_seconds};

const SECONDS_PER_HOUR: f64 = 3_600.0;

/// Which side of the in-water regime the surface (warm) values sit on.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WarmSideMode {
    High,
    Low,
    /// Infer from the smoothed warm percentile near the record ends.
    #[default]
    Auto,
}

/// Sigma-band threshold tunables.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdConfig {
    pub band_sigma: f64,
    pub min_halfwidth: f64,
    pub warm_side: WarmSideMode,
    /// Length of the early and late windows used by `Auto`.
    pub hours: f64,
    pub smooth_window: usize,
    pub warm_percentile: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            band_sigma: 1.5,
            min_halfwidth: 0.10,
            warm_side: WarmSideMode::Auto,
            hours: 24.0,
            smooth_window: 9,
            warm_percentile: 90.0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), MtsError> {
        if !self.band_sigma.is_finite() || self.band_sigma < 0.0 {
            return Err(MtsError::invalid_input(format!(
                "ThresholdConfig.band_sigma must be finite and >= 0.0; got {}",
                self.band_sigma
            )));
        }
        if !self.min_halfwidth.is_finite() || self.min_halfwidth < 0.0 {
            return Err(MtsError::invalid_input(format!(
                "ThresholdConfig.min_halfwidth must be finite and >= 0.0; got {}",
                self.min_halfwidth
            )));
        }
        if !self.hours.is_finite() || self.hours < 0.0 {
            return Err(MtsError::invalid_input(format!(
                "ThresholdConfig.hours must be finite and >= 0.0; got {}",
                self.hours
            )));
        }
        if !self.warm_percentile.is_finite() || !(0.0..=100.0).contains(&self.warm_percentile) {
            return Err(MtsError::invalid_input(format!(
                "ThresholdConfig.warm_percentile must be in [0.0, 100.0]; got {}",
                self.warm_percentile
            )));
        }
        Ok(())
    }
}

/// Single scalar separator between the surface and in-water regimes.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SigmaBandThreshold {
    pub threshold: f64,
    pub halfwidth: f64,
    pub side: WarmSide,
    /// True when in-water values lie below `threshold`.
    pub deep_is_below: bool,
    /// Median of the early/late warm percentiles; only set by `Auto`.
    pub warm_estimate: Option<f64>,
}

fn estimate_warm(series: &TimeSeries<'_>, config: &ThresholdConfig) -> Option<f64> {
    let (t_min, t_max) = (series.t_min()?, series.t_max()?);
    let smoothed = rolling_median_centered(series.values, config.smooth_window);
    let span = config.hours * SECONDS_PER_HOUR;
    let early_end = add_seconds(t_min, span);
    let late_start = add_seconds(t_max, -span);

    let pick = |keep: &dyn Fn(i64) -> bool| -> Vec<f64> {
        series
            .time
            .iter()
            .zip(&smoothed)
            .filter(|(t, _)| keep(**t))
            .map(|(_, v)| *v)
            .collect()
    };
    let early = pick(&|t| t <= early_end);
    let late = pick(&|t| t >= late_start);

    let estimates: Vec<f64> = [early, late]
        .iter()
        .filter(|window| !window.is_empty())
        .map(|window| percentile(window, config.warm_percentile))
        .collect();
    if estimates.is_empty() {
        return None;
    }
    let warm = nan_median(&estimates);
    warm.is_finite().then_some(warm)
}

/// Threshold at `sea_mean ± max(band_sigma·sea_std, min_halfwidth)`.
///
/// The sign follows the resolved warm side: `High` puts the threshold above
/// the sea mean with the in-water regime below it, `Low` the reverse. `Auto`
/// resolves to `High` whenever no finite warm estimate exists.
pub fn sigma_band_threshold(
    series: &TimeSeries<'_>,
    sea_mean: f64,
    sea_std: f64,
    config: &ThresholdConfig,
) -> SigmaBandThreshold {
    let halfwidth = (config.band_sigma * sea_std).max(config.min_halfwidth);

    let (side, warm_estimate) = match config.warm_side {
        WarmSideMode::High => (WarmSide::High, None),
        WarmSideMode::Low => (WarmSide::Low, None),
        WarmSideMode::Auto => {
            let warm = estimate_warm(series, config);
            let side = match warm {
                Some(estimate) if estimate < sea_mean => WarmSide::Low,
                _ => WarmSide::High,
            };
            (side, warm)
        }
    };

    let (threshold, deep_is_below) = match side {
        WarmSide::High => (sea_mean + halfwidth, true),
        WarmSide::Low => (sea_mean - halfwidth, false),
    };

    SigmaBandThreshold {
        threshold,
        halfwidth,
        side,
        deep_is_below,
        warm_estimate,
    }
}

/// Indices of strict local maxima; a flat top counts once, at its middle.
///
/// The first and last bins are never peaks.
fn local_maxima(counts: &[usize]) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < counts.len() {
        if counts[i - 1] < counts[i] {
            let mut ahead = i + 1;
            while ahead + 1 < counts.len() && counts[ahead] == counts[i] {
                ahead += 1;
            }
            if counts[ahead] < counts[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Left edge of the emptiest bin between the first two histogram peaks.
///
/// The histogram spans the finite range of `values` in `bins` equal bins with
/// the last bin closed. `None` when fewer than two peaks exist.
pub fn histogram_split(values: &[f64], bins: usize) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if bins == 0 || finite.is_empty() || hi <= lo {
        return None;
    }
    let span = hi - lo;
    let mut counts = vec![0usize; bins];
    for value in &finite {
        let bin = ((value - lo) * bins as f64 / span).floor() as usize;
        counts[bin.min(bins - 1)] += 1;
    }

    let peaks = local_maxima(&counts);
    let (&first, &second) = (peaks.first()?, peaks.get(1)?);
    let (split, _) = counts[first..second]
        .iter()
        .enumerate()
        .fold((0usize, usize::MAX), |(best, best_count), (offset, &count)| {
            if count < best_count {
                (offset, count)
            } else {
                (best, best_count)
            }
        });
    Some(lo + span * (first + split) as f64 / bins as f64)
}

#[cfg(test)]
mod tests {
    use super::{ThresholdConfig, WarmSideMode, histogram_split, local_maxima, sigma_band_threshold};
    use mts_core::{NS_PER_SECOND, TimeSeries, WarmSide};

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "actual={actual}, expected={expected}, tol={tol}"
        );
    }

    fn minutes(n: usize) -> Vec<i64> {
        (0..n as i64).map(|m| m * 60 * NS_PER_SECOND).collect()
    }

    fn bathtub(n: usize, edge: usize, surface: f64, deep: f64) -> Vec<f64> {
        (0..n)
            .map(|i| if i < edge || i >= n - edge { surface } else { deep })
            .collect()
    }

    fn short_windows() -> ThresholdConfig {
        ThresholdConfig {
            hours: 1.0,
            ..ThresholdConfig::default()
        }
    }

    #[test]
    fn explicit_sides_place_threshold_on_either_side() {
        let time = minutes(4);
        let values = [1.0; 4];
        let series = TimeSeries::new(&time, &values).expect("lengths match");

        let high = ThresholdConfig {
            warm_side: WarmSideMode::High,
            ..ThresholdConfig::default()
        };
        let out = sigma_band_threshold(&series, 5.0, 0.2, &high);
        assert_close(out.threshold, 5.3, 1e-12);
        assert!(out.deep_is_below);
        assert_eq!(out.warm_estimate, None);

        let low = ThresholdConfig {
            warm_side: WarmSideMode::Low,
            ..ThresholdConfig::default()
        };
        let out = sigma_band_threshold(&series, 5.0, 0.2, &low);
        assert_close(out.threshold, 4.7, 1e-12);
        assert!(!out.deep_is_below);
        assert_eq!(out.side, WarmSide::Low);
    }

    #[test]
    fn halfwidth_has_a_floor() {
        let time = minutes(2);
        let values = [0.0; 2];
        let series = TimeSeries::new(&time, &values).expect("lengths match");
        let cfg = ThresholdConfig {
            warm_side: WarmSideMode::High,
            ..ThresholdConfig::default()
        };
        let out = sigma_band_threshold(&series, 5.0, 0.01, &cfg);
        assert_close(out.halfwidth, 0.10, 1e-12);

        let out = sigma_band_threshold(&series, 5.0, f64::NAN, &cfg);
        assert_close(out.halfwidth, 0.10, 1e-12);
        assert_close(out.threshold, 5.10, 1e-12);
    }

    #[test]
    fn auto_detects_warm_surface() {
        let time = minutes(600);
        let values = bathtub(600, 30, 20.0, 5.0);
        let series = TimeSeries::new(&time, &values).expect("lengths match");
        let out = sigma_band_threshold(&series, 5.0, 0.0, &short_windows());
        assert_eq!(out.side, WarmSide::High);
        assert!(out.deep_is_below);
        assert_close(out.warm_estimate.expect("warm estimate"), 20.0, 1e-12);
    }

    #[test]
    fn auto_detects_cold_surface() {
        let time = minutes(600);
        let values = bathtub(600, 60, -1.0, 5.0);
        let series = TimeSeries::new(&time, &values).expect("lengths match");
        let out = sigma_band_threshold(&series, 5.0, 0.0, &short_windows());
        assert_eq!(out.side, WarmSide::Low);
        assert!(!out.deep_is_below);
        assert_close(out.threshold, 4.9, 1e-12);
    }

    #[test]
    fn auto_without_finite_estimate_defaults_high() {
        let time = minutes(10);
        let values = [f64::NAN; 10];
        let series = TimeSeries::new(&time, &values).expect("lengths match");
        let out = sigma_band_threshold(&series, 5.0, 0.5, &short_windows());
        assert_eq!(out.side, WarmSide::High);
        assert_eq!(out.warm_estimate, None);
        assert_close(out.threshold, 5.75, 1e-12);
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        assert!(ThresholdConfig::default().validate().is_ok());
        let bad = ThresholdConfig {
            warm_percentile: 120.0,
            ..ThresholdConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = ThresholdConfig {
            band_sigma: -1.0,
            ..ThresholdConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = ThresholdConfig {
            hours: f64::INFINITY,
            ..ThresholdConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn local_maxima_skip_edges_and_centre_flat_tops() {
        assert_eq!(local_maxima(&[5, 1, 3, 1, 0, 2, 2, 2, 0, 9]), vec![2, 6]);
        assert_eq!(local_maxima(&[0, 4, 4, 0]), vec![1]);
        assert!(local_maxima(&[3, 2, 1]).is_empty());
        assert!(local_maxima(&[1, 2, 2]).is_empty());
    }

    #[test]
    fn histogram_split_lands_in_the_gap_between_modes() {
        let deep = [4.0, 4.75, 4.75, 5.25];
        let surface = [17.75, 18.25, 18.25, 19.0];
        let values: Vec<f64> = (0..400)
            .map(|i| if i < 100 { surface[i % 4] } else { deep[i % 4] })
            .chain([f64::NAN])
            .collect();
        assert_close(histogram_split(&values, 30).expect("two modes"), 5.5, 1e-12);
    }

    #[test]
    fn histogram_split_needs_two_peaks() {
        let two_levels: Vec<f64> = (0..100).map(|i| if i < 10 { 20.0 } else { 5.0 }).collect();
        assert_eq!(histogram_split(&two_levels, 30), None);
        assert_eq!(histogram_split(&[1.0; 8], 30), None);
        assert_eq!(histogram_split(&[f64::NAN; 3], 30), None);
        assert_eq!(histogram_split(&[], 30), None);
    }
}
