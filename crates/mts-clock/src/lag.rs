// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_core::{Diagnostic, ExecutionContext, MooringDataset, MtsError};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LagCorrelationConfig {
    /// Stride applied to every series before correlating.
    pub sub_sample: usize,
    /// Minimum jointly finite pairs for a lag to get a correlation.
    pub min_overlap: usize,
    /// The search covers `±n_sub / max_lag_divisor` sub-sampled lags.
    pub max_lag_divisor: usize,
}

impl Default for LagCorrelationConfig {
    fn default() -> Self {
        Self {
            sub_sample: 5,
            min_overlap: 10,
            max_lag_divisor: 5,
        }
    }
}

impl LagCorrelationConfig {
    pub fn validate(&self) -> Result<(), MtsError> {
        if self.sub_sample == 0 {
            return Err(MtsError::invalid_input(
                "LagCorrelationConfig.sub_sample must be >= 1; got 0",
            ));
        }
        if self.max_lag_divisor == 0 {
            return Err(MtsError::invalid_input(
                "LagCorrelationConfig.max_lag_divisor must be >= 1; got 0",
            ));
        }
        Ok(())
    }
}

/// Pearson correlation over jointly finite pairs using population moments.
fn pearson(xs: &[f64], ys: &[f64], min_overlap: usize) -> f64 {
    let pairs = || {
        xs.iter()
            .zip(ys)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
    };
    let (count, sum_x, sum_y) = pairs().fold((0usize, 0.0_f64, 0.0_f64), |(c, sx, sy), (x, y)| {
        (c + 1, sx + x, sy + y)
    });
    if count == 0 || count < min_overlap {
        return f64::NAN;
    }
    let n = count as f64;
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);
    let (sxx, syy, sxy) = pairs().fold((0.0_f64, 0.0_f64, 0.0_f64), |(sxx, syy, sxy), (x, y)| {
        let (dx, dy) = (x - mean_x, y - mean_y);
        (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
    });
    let denom = (sxx / n).sqrt() * (syy / n).sqrt();
    if denom.is_nan() || denom <= 0.0 {
        return f64::NAN;
    }
    (sxy / n / denom).clamp(-1.0, 1.0)
}

fn correlate_lags(
    x: &[f64],
    y: &[f64],
    max_lag: usize,
    min_overlap: usize,
    ctx: &ExecutionContext<'_>,
) -> Result<Vec<f64>, MtsError> {
    if x.len() != y.len() {
        return Err(MtsError::invalid_input(format!(
            "lag correlation requires equal lengths (sub-sample both series); got {} and {}",
            x.len(),
            y.len()
        )));
    }
    let n = x.len();
    let mut out = Vec::with_capacity(2 * max_lag + 1);
    for (iteration, k) in (0..=2 * max_lag).enumerate() {
        ctx.check_cancelled_every(iteration)?;
        let corr = if k < max_lag {
            let shift = max_lag - k;
            if shift > n {
                f64::NAN
            } else {
                pearson(&x[..n - shift], &y[shift..], min_overlap)
            }
        } else {
            let shift = k - max_lag;
            if shift > n {
                f64::NAN
            } else {
                pearson(&x[shift..], &y[..n - shift], min_overlap)
            }
        };
        out.push(corr);
    }
    Ok(out)
}

/// Correlation of `x` against `y` at every integer lag in `[-max_lag, max_lag]`.
///
/// Element `k` holds lag `k - max_lag`. For a positive lag `x[lag..]` is paired
/// with `y[..n - lag]`, so a peak at `lag > 0` means `y[t] ≈ x[t + lag]`. A lag
/// with fewer than `min_overlap` jointly finite pairs, or with zero variance on
/// either side, yields NaN.
pub fn lag_correlation(
    x: &[f64],
    y: &[f64],
    max_lag: usize,
    min_overlap: usize,
) -> Result<Vec<f64>, MtsError> {
    correlate_lags(x, y, max_lag, min_overlap, &ExecutionContext::new())
}

/// Best lag of one level against the reference.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LevelLag {
    pub level: usize,
    /// Sub-sampled lag of the correlation peak; `None` when every lag was NaN.
    pub best_lag: Option<i64>,
    pub max_correlation: f64,
    /// `best_lag · sub_sample · dt + clock_offset_seconds`, the total correction
    /// to add to the level's timestamps.
    pub clock_offset_estimate_seconds: f64,
    pub correlations: Vec<f64>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LagCorrelationResult {
    pub ref_index: usize,
    pub sub_sample: usize,
    pub time_interval_seconds: f64,
    pub max_lag: usize,
    pub levels: Vec<LevelLag>,
    pub diagnostics: Vec<Diagnostic>,
}

impl LagCorrelationResult {
    /// Lag values matching each entry of `LevelLag::correlations`.
    pub fn lags(&self) -> Vec<i64> {
        let max_lag = self.max_lag as i64;
        (-max_lag..=max_lag).collect()
    }

    pub fn best_lags(&self) -> Vec<Option<i64>> {
        self.levels.iter().map(|level| level.best_lag).collect()
    }

    pub fn clock_offsets_seconds(&self) -> Vec<f64> {
        self.levels
            .iter()
            .map(|level| level.clock_offset_estimate_seconds)
            .collect()
    }
}

fn nan_argmax(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best, (idx, v)| match best {
            Some((_, current)) if v <= current => best,
            _ => Some((idx, v)),
        })
}

/// Estimates per-level clock offsets by cross-correlating against a reference level.
#[derive(Clone, Debug)]
pub struct LagCorrelationAnalyzer {
    config: LagCorrelationConfig,
}

impl LagCorrelationAnalyzer {
    pub fn new(config: LagCorrelationConfig) -> Result<Self, MtsError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LagCorrelationConfig {
        &self.config
    }

    pub fn analyze(
        &self,
        dataset: &MooringDataset,
        ref_index: usize,
        ctx: &ExecutionContext<'_>,
    ) -> Result<LagCorrelationResult, MtsError> {
        let reference = dataset.level(ref_index)?;
        let time_interval = dataset.time().median_step_seconds().ok_or_else(|| {
            MtsError::numerical_issue(format!(
                "cannot derive a sampling interval from a time axis with {} samples",
                dataset.n_samples()
            ))
        })?;

        let sub_sample = self.config.sub_sample;
        let ref_sub: Vec<f64> = reference.values.iter().step_by(sub_sample).copied().collect();
        let max_lag = ref_sub.len() / self.config.max_lag_divisor;
        let dt_sub = sub_sample as f64 * time_interval;

        let outcomes = self.analyze_levels(dataset, &ref_sub, max_lag, dt_sub, ctx)?;

        let mut levels = Vec::with_capacity(outcomes.len());
        let mut diagnostics = Vec::new();
        for (lag, notes) in outcomes {
            diagnostics.push(Diagnostic::LagResolved {
                level: lag.level,
                best_lag: lag.best_lag,
                max_correlation: lag.max_correlation,
                clock_offset_estimate_seconds: lag.clock_offset_estimate_seconds,
            });
            diagnostics.extend(notes);
            levels.push(lag);
        }
        ctx.emit_all(&diagnostics);

        tracing::info!(
            ref_index,
            sub_sample,
            max_lag,
            time_interval,
            "lag correlation finished"
        );
        Ok(LagCorrelationResult {
            ref_index,
            sub_sample,
            time_interval_seconds: time_interval,
            max_lag,
            levels,
            diagnostics,
        })
    }

    fn analyze_levels(
        &self,
        dataset: &MooringDataset,
        ref_sub: &[f64],
        max_lag: usize,
        dt_sub: f64,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<(LevelLag, Vec<Diagnostic>)>, MtsError> {
        #[cfg(feature = "rayon")]
        if can_use_parallel(ctx) {
            return (0..dataset.n_levels())
                .into_par_iter()
                .map(|level| self.analyze_level(dataset, level, ref_sub, max_lag, dt_sub, ctx))
                .collect();
        }

        let mut outcomes = Vec::with_capacity(dataset.n_levels());
        for level in 0..dataset.n_levels() {
            ctx.check_cancelled()?;
            outcomes.push(self.analyze_level(dataset, level, ref_sub, max_lag, dt_sub, ctx)?);
        }
        Ok(outcomes)
    }

    fn analyze_level(
        &self,
        dataset: &MooringDataset,
        level: usize,
        ref_sub: &[f64],
        max_lag: usize,
        dt_sub: f64,
        ctx: &ExecutionContext<'_>,
    ) -> Result<(LevelLag, Vec<Diagnostic>), MtsError> {
        let instrument = dataset.level(level)?;
        let level_sub: Vec<f64> = instrument
            .values
            .iter()
            .step_by(self.config.sub_sample)
            .copied()
            .collect();
        let correlations =
            correlate_lags(ref_sub, &level_sub, max_lag, self.config.min_overlap, ctx)?;

        let mut notes = Vec::new();
        let (best_lag, max_correlation, estimate) = match nan_argmax(&correlations) {
            Some((idx, corr)) => {
                let lag = idx as i64 - max_lag as i64;
                (
                    Some(lag),
                    corr,
                    lag as f64 * dt_sub + instrument.clock_offset_seconds,
                )
            }
            None => {
                notes.push(Diagnostic::warning(
                    Some(level),
                    "no lag had enough overlapping finite samples; clock offset is undetermined",
                ));
                (None, f64::NAN, f64::NAN)
            }
        };

        Ok((
            LevelLag {
                level,
                best_lag,
                max_correlation,
                clock_offset_estimate_seconds: estimate,
                correlations,
            },
            notes,
        ))
    }
}

#[cfg(feature = "rayon")]
fn can_use_parallel(ctx: &ExecutionContext<'_>) -> bool {
    ctx.cancel.is_none()
}

#[cfg(test)]
mod tests {
    use super::{LagCorrelationAnalyzer, LagCorrelationConfig, lag_correlation, nan_argmax};
    use mts_core::{
        CancelToken, ExecutionContext, InstrumentLevel, MooringDataset, NS_PER_SECOND, TimeAxis,
    };

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "actual={actual}, expected={expected}, tol={tol}"
        );
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (i as f64 * 0.07).sin() + 0.5 * (i as f64 * 0.013).cos())
            .collect()
    }

    #[test]
    fn autocorrelation_peaks_at_zero() {
        let x = wave(200);
        let corrs = lag_correlation(&x, &x, 10, 10).expect("equal lengths");
        assert_eq!(corrs.len(), 21);
        assert_close(corrs[10], 1.0, 1e-12);
        assert!(corrs.iter().all(|c| c.is_nan() || (-1.0..=1.0).contains(c)));
    }

    #[test]
    fn positive_lag_means_second_series_leads() {
        let x = wave(300);
        let y: Vec<f64> = (0..300).map(|t| x.get(t + 4).copied().unwrap_or(f64::NAN)).collect();
        let corrs = lag_correlation(&x, &y, 20, 10).expect("equal lengths");
        let (idx, corr) = nan_argmax(&corrs).expect("finite correlation");
        assert_eq!(idx as i64 - 20, 4);
        assert_close(corr, 1.0, 1e-9);
    }

    #[test]
    fn short_overlap_and_constant_series_are_nan() {
        let x = wave(12);
        let corrs = lag_correlation(&x, &x, 3, 10).expect("equal lengths");
        assert!(corrs[0].is_nan());
        assert!(corrs[6].is_nan());
        assert!(corrs[3].is_finite());

        let flat = vec![2.0; 50];
        let corrs = lag_correlation(&flat, &x.repeat(5)[..50], 2, 10).expect("equal lengths");
        assert!(corrs.iter().all(|c| c.is_nan()));

        assert!(lag_correlation(&x, &x[..5], 1, 1).is_err());
    }

    #[test]
    fn lags_beyond_series_length_are_nan() {
        let x = wave(4);
        let corrs = lag_correlation(&x, &x, 6, 1).expect("equal lengths");
        assert_eq!(corrs.len(), 13);
        assert!(corrs[0].is_nan());
        assert!(corrs[12].is_nan());
    }

    #[test]
    fn argmax_ignores_nan_and_prefers_first_peak() {
        assert_eq!(nan_argmax(&[f64::NAN, 0.2, 0.9, 0.9]), Some((2, 0.9)));
        assert_eq!(nan_argmax(&[f64::NAN, f64::NAN]), None);
    }

    fn lagged_dataset(shift: usize, clock_offset: f64) -> MooringDataset {
        let n = 500;
        let base = wave(n + shift);
        let reference = base[shift..].to_vec();
        let delayed = base[..n].to_vec();
        let time = TimeAxis::uniform(0, 60 * NS_PER_SECOND, n).expect("uniform axis");
        MooringDataset::new(
            time,
            vec![
                InstrumentLevel::new(reference),
                InstrumentLevel::new(delayed).with_clock_offset(clock_offset),
            ],
        )
        .expect("dataset should be valid")
    }

    #[test]
    fn recovers_three_sample_shift() {
        let data = lagged_dataset(3, 0.0);
        let analyzer = LagCorrelationAnalyzer::new(LagCorrelationConfig {
            sub_sample: 1,
            ..LagCorrelationConfig::default()
        })
        .expect("config is valid");
        let out = analyzer
            .analyze(&data, 1, &ExecutionContext::new())
            .expect("analysis should succeed");

        assert_eq!(out.max_lag, 100);
        assert_eq!(out.lags().len(), 201);
        assert_close(out.time_interval_seconds, 60.0, 1e-12);
        assert_eq!(out.levels[1].best_lag, Some(0));
        assert_eq!(out.levels[0].best_lag, Some(3));
        assert_close(out.levels[0].max_correlation, 1.0, 1e-9);
        assert_close(out.levels[0].clock_offset_estimate_seconds, 180.0, 1e-9);
    }

    #[test]
    fn delayed_level_gets_negative_correction_plus_existing_offset() {
        let data = lagged_dataset(3, 30.0);
        let analyzer = LagCorrelationAnalyzer::new(LagCorrelationConfig {
            sub_sample: 1,
            ..LagCorrelationConfig::default()
        })
        .expect("config is valid");
        let out = analyzer
            .analyze(&data, 0, &ExecutionContext::new())
            .expect("analysis should succeed");
        assert_eq!(out.levels[1].best_lag, Some(-3));
        assert_close(out.levels[1].clock_offset_estimate_seconds, -180.0 + 30.0, 1e-9);
        assert_eq!(out.clock_offsets_seconds().len(), 2);
    }

    #[test]
    fn all_missing_level_is_a_soft_failure() {
        let n = 100;
        let time = TimeAxis::uniform(0, NS_PER_SECOND, n).expect("uniform axis");
        let data = MooringDataset::new(
            time,
            vec![
                InstrumentLevel::new(wave(n)),
                InstrumentLevel::new(vec![f64::NAN; n]),
            ],
        )
        .expect("dataset should be valid");
        let out = LagCorrelationAnalyzer::new(LagCorrelationConfig::default())
            .expect("config is valid")
            .analyze(&data, 0, &ExecutionContext::new())
            .expect("soft failure must not abort");
        assert_eq!(out.best_lags(), vec![Some(0), None]);
        assert!(out.levels[1].clock_offset_estimate_seconds.is_nan());
        assert!(out.diagnostics.iter().any(|d| d.is_warning()));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        assert!(
            LagCorrelationAnalyzer::new(LagCorrelationConfig {
                sub_sample: 0,
                ..LagCorrelationConfig::default()
            })
            .is_err()
        );
        let data = lagged_dataset(1, 0.0);
        let analyzer =
            LagCorrelationAnalyzer::new(LagCorrelationConfig::default()).expect("config is valid");
        let err = analyzer
            .analyze(&data, 7, &ExecutionContext::new())
            .expect_err("out-of-range reference must fail");
        assert!(err.to_string().contains("out of range"));

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = analyzer
            .analyze(&data, 0, &ExecutionContext::new().with_cancel(&cancel))
            .expect_err("cancelled analysis must fail");
        assert_eq!(err.to_string(), "cancelled");
    }
}
