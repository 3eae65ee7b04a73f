// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::changepoint::best_step_change;
use crate::regime::{SeaStatistics, sea_values};
use crate::runs::{Run, first_sustained, last_sustained};
use crate::threshold::{ThresholdConfig, histogram_split, sigma_band_threshold};
use crate::window::{BottomWindow, BottomWindowStrategy, bottom_window};
use mts_core::stats::{finite_mean, nan_median, quantile, rolling_median_centered};
use mts_core::{
    Diagnostic, ExecutionContext, MooringDataset, MtsError, SeaSource, TimeSeries, WarmSide,
    add_seconds,
};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

const SECONDS_PER_HOUR: f64 = 3_600.0;

/// Boundary detection algorithm applied to every level.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "method", rename_all = "snake_case", deny_unknown_fields)
)]
#[derive(Clone, Debug, Default, PartialEq)]
pub enum DetectionMethod {
    /// Sigma-band threshold around the in-water mean, first/last deep sample.
    #[default]
    SigmaBand,
    /// Step change plus sustained cold dwell inside the early and late windows.
    ChangePoint {
        surface_window_hours: f64,
        smooth_window: usize,
        dwell_seconds: f64,
        tol_sigma: f64,
    },
    /// Quantile threshold on the smoothed series plus sustained dwell.
    QuantileDwell {
        quantile: f64,
        dwell_seconds: f64,
        smooth_window: usize,
    },
    /// Split between the two histogram modes; the deep side is the one the
    /// record does not start on.
    HistogramSplit { bins: usize },
}

impl DetectionMethod {
    pub fn change_point() -> Self {
        Self::ChangePoint {
            surface_window_hours: 24.0,
            smooth_window: 9,
            dwell_seconds: 1_800.0,
            tol_sigma: 2.0,
        }
    }

    pub fn quantile_dwell() -> Self {
        Self::QuantileDwell {
            quantile: 0.95,
            dwell_seconds: 1_800.0,
            smooth_window: 5,
        }
    }

    pub fn histogram_split() -> Self {
        Self::HistogramSplit { bins: 30 }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SigmaBand => "sigma_band",
            Self::ChangePoint { .. } => "change_point",
            Self::QuantileDwell { .. } => "quantile_dwell",
            Self::HistogramSplit { .. } => "histogram_split",
        }
    }

    fn uses_bottom_window(&self) -> bool {
        matches!(self, Self::SigmaBand | Self::ChangePoint { .. })
    }

    pub fn validate(&self) -> Result<(), MtsError> {
        match *self {
            Self::SigmaBand => Ok(()),
            Self::ChangePoint {
                surface_window_hours,
                dwell_seconds,
                tol_sigma,
                ..
            } => {
                non_negative("ChangePoint.surface_window_hours", surface_window_hours)?;
                non_negative("ChangePoint.dwell_seconds", dwell_seconds)?;
                non_negative("ChangePoint.tol_sigma", tol_sigma)
            }
            Self::QuantileDwell {
                quantile,
                dwell_seconds,
                ..
            } => {
                if !quantile.is_finite() || !(0.0..=1.0).contains(&quantile) {
                    return Err(MtsError::invalid_input(format!(
                        "QuantileDwell.quantile must be in [0.0, 1.0]; got {quantile}"
                    )));
                }
                non_negative("QuantileDwell.dwell_seconds", dwell_seconds)
            }
            Self::HistogramSplit { bins } => {
                if bins < 3 {
                    return Err(MtsError::invalid_input(format!(
                        "HistogramSplit.bins must be >= 3; got {bins}"
                    )));
                }
                Ok(())
            }
        }
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), MtsError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MtsError::invalid_input(format!(
            "{field} must be finite and >= 0.0; got {value}"
        )));
    }
    Ok(())
}

/// Which side of the threshold the sigma-band boundary search treats as deep.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BoundaryPolarity {
    /// Follow the resolved warm side: below the threshold for `High`, above for `Low`.
    #[default]
    RespectThreshold,
    /// Always search strictly below the threshold.
    AlwaysBelow,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeploymentConfig {
    pub strategy: BottomWindowStrategy,
    pub threshold: ThresholdConfig,
    pub method: DetectionMethod,
    pub polarity: BoundaryPolarity,
}

impl DeploymentConfig {
    pub fn validate(&self) -> Result<(), MtsError> {
        self.strategy.validate()?;
        self.threshold.validate()?;
        self.method.validate()
    }
}

/// Deployment annotation of one level.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct LevelAnnotation {
    pub level: usize,
    /// First in-water timestamp; `None` when no sample qualified.
    pub start_ns: Option<i64>,
    /// Last in-water timestamp; `None` when no sample qualified.
    pub end_ns: Option<i64>,
    /// Threshold separating the surface and in-water regimes.
    pub split_value: f64,
    pub deep_is_below: bool,
    pub method: String,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct DeploymentAnnotations {
    pub levels: Vec<LevelAnnotation>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DeploymentAnnotations {
    pub fn start_times(&self) -> Vec<Option<i64>> {
        self.levels.iter().map(|level| level.start_ns).collect()
    }

    pub fn end_times(&self) -> Vec<Option<i64>> {
        self.levels.iter().map(|level| level.end_ns).collect()
    }

    pub fn split_values(&self) -> Vec<f64> {
        self.levels.iter().map(|level| level.split_value).collect()
    }
}

/// First and last finite samples strictly on the deep side of `threshold`.
pub fn find_entry_exit(
    series: &TimeSeries<'_>,
    threshold: f64,
    deep_is_below: bool,
) -> (Option<i64>, Option<i64>) {
    let is_deep = |value: f64| {
        value.is_finite()
            && if deep_is_below {
                value < threshold
            } else {
                value > threshold
            }
    };
    let first = series.values.iter().position(|v| is_deep(*v));
    let last = series.values.iter().rposition(|v| is_deep(*v));
    (
        first.map(|idx| series.time[idx]),
        last.map(|idx| series.time[idx]),
    )
}

/// True unless the record opens on the low side of `threshold`.
///
/// The side holding the first sample strictly off the threshold is taken as
/// the surface, so the in-water regime is the other one.
pub fn infer_deep_is_below(values: &[f64], threshold: f64) -> bool {
    let first_below = values.iter().position(|v| *v < threshold);
    let first_above = values.iter().position(|v| *v > threshold);
    match (first_below, first_above) {
        (Some(below), Some(above)) => below > above,
        (Some(_), None) => false,
        _ => true,
    }
}

/// Legacy search that treats "strictly below threshold" as deep regardless of polarity.
pub fn find_entry_exit_below(
    series: &TimeSeries<'_>,
    threshold: f64,
) -> (Option<i64>, Option<i64>) {
    find_entry_exit(series, threshold, true)
}

fn dwell_samples(dwell_seconds: f64, dt_seconds: Option<f64>) -> usize {
    match dt_seconds {
        Some(dt) if dt.is_finite() && dt > 0.0 => ((dwell_seconds / dt).ceil() as usize).max(1),
        _ => 1,
    }
}

struct Boundaries {
    start_ns: Option<i64>,
    end_ns: Option<i64>,
    threshold: f64,
    deep_is_below: bool,
}

struct LevelOutcome {
    annotation: LevelAnnotation,
    diagnostics: Vec<Diagnostic>,
}

/// Per-level deployment boundary detector.
#[derive(Clone, Debug)]
pub struct DeploymentDetector {
    config: DeploymentConfig,
}

impl DeploymentDetector {
    pub fn new(config: DeploymentConfig) -> Result<Self, MtsError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Annotates every level with its in-water start/end and threshold.
    ///
    /// Only structural problems fail the run; every per-level problem resolves
    /// to a fallback value and a diagnostic record.
    pub fn detect(
        &self,
        dataset: &MooringDataset,
        ctx: &ExecutionContext<'_>,
    ) -> Result<DeploymentAnnotations, MtsError> {
        let time = dataset.time();
        if time.len() < 2 {
            return Err(MtsError::invalid_input(format!(
                "deployment detection requires a time axis with at least 2 samples; got {}",
                time.len()
            )));
        }

        let window = if self.config.method.uses_bottom_window() {
            Some(bottom_window(time.as_slice(), &self.config.strategy)?)
        } else {
            None
        };
        // Quantile dwell counts repeated timestamps as zero-length steps.
        let dt_seconds = match self.config.method {
            DetectionMethod::QuantileDwell { .. } => time.median_step_seconds(),
            _ => time.sampling_interval_seconds(),
        };

        let outcomes = self.detect_levels(dataset, window.as_ref(), dt_seconds, ctx)?;

        let mut levels = Vec::with_capacity(outcomes.len());
        let mut diagnostics = Vec::new();
        for outcome in outcomes {
            ctx.emit_all(&outcome.diagnostics);
            levels.push(outcome.annotation);
            diagnostics.extend(outcome.diagnostics);
        }

        tracing::info!(
            levels = levels.len(),
            method = self.config.method.name(),
            "deployment detection finished"
        );
        Ok(DeploymentAnnotations {
            levels,
            diagnostics,
        })
    }

    fn detect_levels(
        &self,
        dataset: &MooringDataset,
        window: Option<&BottomWindow>,
        dt_seconds: Option<f64>,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<LevelOutcome>, MtsError> {
        #[cfg(feature = "rayon")]
        if can_use_parallel(ctx) {
            return (0..dataset.n_levels())
                .into_par_iter()
                .map(|level| self.detect_level(dataset, level, window, dt_seconds))
                .collect();
        }

        let mut outcomes = Vec::with_capacity(dataset.n_levels());
        for level in 0..dataset.n_levels() {
            ctx.check_cancelled()?;
            outcomes.push(self.detect_level(dataset, level, window, dt_seconds)?);
        }
        Ok(outcomes)
    }

    fn detect_level(
        &self,
        dataset: &MooringDataset,
        level: usize,
        window: Option<&BottomWindow>,
        dt_seconds: Option<f64>,
    ) -> Result<LevelOutcome, MtsError> {
        let series = dataset.series(level)?;
        let mut diagnostics = Vec::new();

        let sea = window.map(|window| {
            diagnostics.push(Diagnostic::WindowSelected {
                level,
                start_ns: window.start_ns,
                end_ns: window.end_ns,
                fallback: window.fallback,
            });
            if window.fallback {
                diagnostics.push(Diagnostic::warning(
                    Some(level),
                    "bottom window was empty after clipping; using the middle third of the record",
                ));
            }
            let sea = sea_values(&series, window);
            diagnostics.push(Diagnostic::SeaStatistics {
                level,
                mean: sea.mean,
                std: sea.std,
                source: sea.source,
                samples: sea.samples,
            });
            if sea.source != SeaSource::Window {
                diagnostics.push(Diagnostic::warning(
                    Some(level),
                    "bottom window held no samples; sea statistics use the interquartile proxy",
                ));
            }
            sea
        });

        let boundaries = match (&self.config.method, sea) {
            (DetectionMethod::SigmaBand, Some(sea)) => {
                self.sigma_band(&series, level, &sea, &mut diagnostics)
            }
            (
                DetectionMethod::ChangePoint {
                    surface_window_hours,
                    smooth_window,
                    dwell_seconds,
                    tol_sigma,
                },
                Some(sea),
            ) => {
                let boundaries = surface_transitions(
                    &series,
                    &sea,
                    SurfaceParams {
                        hours: *surface_window_hours,
                        smooth_window: *smooth_window,
                        min_len: dwell_samples(*dwell_seconds, dt_seconds),
                        tol_sigma: *tol_sigma,
                    },
                );
                diagnostics.push(Diagnostic::ThresholdComputed {
                    level,
                    threshold: boundaries.threshold,
                    halfwidth: (boundaries.threshold - sea.mean).abs(),
                    side: WarmSide::High,
                    deep_is_below: true,
                    warm_estimate: None,
                });
                boundaries
            }
            (
                DetectionMethod::QuantileDwell {
                    quantile: q,
                    dwell_seconds,
                    smooth_window,
                },
                _,
            ) => {
                let boundaries = cold_entry_exit(
                    &series,
                    *q,
                    *smooth_window,
                    dwell_samples(*dwell_seconds, dt_seconds),
                );
                diagnostics.push(Diagnostic::info(
                    Some(level),
                    format!(
                        "quantile threshold {} at q={q}",
                        boundaries.threshold
                    ),
                ));
                boundaries
            }
            (DetectionMethod::HistogramSplit { bins }, _) => {
                let boundaries = histogram_boundaries(&series, *bins);
                if boundaries.threshold.is_nan() {
                    diagnostics.push(Diagnostic::warning(
                        Some(level),
                        "histogram has fewer than two peaks; no split value",
                    ));
                } else {
                    diagnostics.push(Diagnostic::info(
                        Some(level),
                        format!(
                            "histogram split {} with the in-water regime {} it",
                            boundaries.threshold,
                            if boundaries.deep_is_below { "below" } else { "above" }
                        ),
                    ));
                }
                boundaries
            }
            (_, None) => {
                return Err(MtsError::invalid_input(format!(
                    "detection method {} requires a bottom window",
                    self.config.method.name()
                )));
            }
        };

        let (start_ns, end_ns) = match (boundaries.start_ns, boundaries.end_ns) {
            (Some(start), Some(end)) if start > end => {
                diagnostics.push(Diagnostic::warning(
                    Some(level),
                    format!(
                        "detected start {start} lies after end {end}; discarding both boundaries"
                    ),
                ));
                (None, None)
            }
            pair => pair,
        };
        if start_ns.is_none() && end_ns.is_none() {
            diagnostics.push(Diagnostic::warning(
                Some(level),
                "no in-water samples found; boundaries are not-a-time",
            ));
        }
        diagnostics.push(Diagnostic::BoundariesDetected {
            level,
            method: self.config.method.name().to_string(),
            start_ns,
            end_ns,
        });

        Ok(LevelOutcome {
            annotation: LevelAnnotation {
                level,
                start_ns,
                end_ns,
                split_value: boundaries.threshold,
                deep_is_below: boundaries.deep_is_below,
                method: self.config.method.name().to_string(),
            },
            diagnostics,
        })
    }

    fn sigma_band(
        &self,
        series: &TimeSeries<'_>,
        level: usize,
        sea: &SeaStatistics,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Boundaries {
        let band = sigma_band_threshold(series, sea.mean, sea.std, &self.config.threshold);
        diagnostics.push(Diagnostic::ThresholdComputed {
            level,
            threshold: band.threshold,
            halfwidth: band.halfwidth,
            side: band.side,
            deep_is_below: band.deep_is_below,
            warm_estimate: band.warm_estimate,
        });

        let search_below = match self.config.polarity {
            BoundaryPolarity::RespectThreshold => band.deep_is_below,
            BoundaryPolarity::AlwaysBelow => {
                if !band.deep_is_below {
                    diagnostics.push(Diagnostic::warning(
                        Some(level),
                        "in-water regime lies above the threshold but the boundary search tests below it",
                    ));
                }
                true
            }
        };
        let (start_ns, end_ns) = find_entry_exit(series, band.threshold, search_below);
        Boundaries {
            start_ns,
            end_ns,
            threshold: band.threshold,
            deep_is_below: band.deep_is_below,
        }
    }
}

#[cfg(feature = "rayon")]
fn can_use_parallel(ctx: &ExecutionContext<'_>) -> bool {
    ctx.cancel.is_none()
}

#[derive(Clone, Copy, Debug)]
struct SurfaceParams {
    hours: f64,
    smooth_window: usize,
    min_len: usize,
    tol_sigma: f64,
}

fn sustained_runs(mask: impl Iterator<Item = bool>, min_len: usize) -> (Option<Run>, Option<Run>) {
    let mask: Vec<bool> = mask.collect();
    (first_sustained(&mask, min_len), last_sustained(&mask, min_len))
}

/// Warm-to-cold entry in the early window and cold-to-warm exit in the late window.
///
/// A step change confirmed by a sustained cold run wins; otherwise the first
/// (resp. last) sustained cold run of the window is used. The threshold is the
/// midpoint between the sea mean and the median warm-segment mean.
fn surface_transitions(
    series: &TimeSeries<'_>,
    sea: &SeaStatistics,
    params: SurfaceParams,
) -> Boundaries {
    let (Some(t_min), Some(t_max)) = (series.t_min(), series.t_max()) else {
        return Boundaries {
            start_ns: None,
            end_ns: None,
            threshold: f64::NAN,
            deep_is_below: true,
        };
    };
    let smoothed = rolling_median_centered(series.values, params.smooth_window);
    let span = params.hours * SECONDS_PER_HOUR;
    let early_end_ns = add_seconds(t_min, span);
    let late_start_ns = add_seconds(t_max, -span);
    let early_len = series.time.partition_point(|t| *t <= early_end_ns);
    let late_start = series.time.partition_point(|t| *t < late_start_ns);

    let cold_limit = sea.mean + params.tol_sigma * sea.std;
    let min_len = params.min_len;
    let mut warm_means = Vec::new();

    let early = &smoothed[..early_len];
    let early_time = &series.time[..early_len];
    let early_cold: Vec<bool> = early.iter().map(|v| *v <= cold_limit).collect();
    let mut start_ns = None;
    let step = (early.len() > 2 * min_len)
        .then(|| best_step_change(early, min_len))
        .filter(|step| {
            step.right_mean < step.left_mean
                && (step.right_mean - sea.mean).abs() <= (step.left_mean - sea.mean).abs()
        });
    if let Some(step) = step {
        let cold_after = early_cold.iter().enumerate().map(|(i, c)| *c && i >= step.split);
        if let (Some(run), _) = sustained_runs(cold_after, min_len) {
            start_ns = Some(early_time[run.start]);
        }
        warm_means.push(step.left_mean);
    } else if let (Some(run), _) = sustained_runs(early_cold.iter().copied(), min_len) {
        start_ns = Some(early_time[run.start]);
        if run.start > 0 {
            warm_means.push(finite_mean(&early[..run.start]));
        }
    }

    let late = &smoothed[late_start..];
    let late_time = &series.time[late_start..];
    let late_cold: Vec<bool> = late.iter().map(|v| *v <= cold_limit).collect();
    let mut end_ns = None;
    let step = (late.len() > 2 * min_len)
        .then(|| best_step_change(late, min_len))
        .filter(|step| {
            step.left_mean < step.right_mean
                && (step.left_mean - sea.mean).abs() <= (step.right_mean - sea.mean).abs()
        });
    if let Some(step) = step {
        let cold_before = late_cold.iter().enumerate().map(|(i, c)| *c && i < step.split);
        if let (_, Some(run)) = sustained_runs(cold_before, min_len) {
            end_ns = Some(late_time[run.end]);
        }
        warm_means.push(step.right_mean);
    } else if let (_, Some(run)) = sustained_runs(late_cold.iter().copied(), min_len) {
        end_ns = Some(late_time[run.end]);
        if run.end + 1 < late.len() {
            warm_means.push(finite_mean(&late[run.end + 1..]));
        }
    }

    let threshold = if warm_means.is_empty() {
        sea.mean + (2.0 * sea.std).max(0.5)
    } else {
        0.5 * (sea.mean + nan_median(&warm_means))
    };
    Boundaries {
        start_ns,
        end_ns,
        threshold,
        deep_is_below: true,
    }
}

/// First sustained entry into and last sustained exit from the cold regime,
/// with the regime defined by a quantile of the raw series.
fn cold_entry_exit(
    series: &TimeSeries<'_>,
    q: f64,
    smooth_window: usize,
    min_len: usize,
) -> Boundaries {
    let threshold = quantile(series.values, q);
    let smoothed = rolling_median_centered(series.values, smooth_window);
    let (first, last) = sustained_runs(smoothed.iter().map(|v| *v <= threshold), min_len);
    Boundaries {
        start_ns: first.map(|run| series.time[run.start]),
        end_ns: last.map(|run| series.time[run.end]),
        threshold,
        deep_is_below: true,
    }
}

fn histogram_boundaries(series: &TimeSeries<'_>, bins: usize) -> Boundaries {
    let Some(threshold) = histogram_split(series.values, bins) else {
        return Boundaries {
            start_ns: None,
            end_ns: None,
            threshold: f64::NAN,
            deep_is_below: true,
        };
    };
    let deep_is_below = infer_deep_is_below(series.values, threshold);
    let (start_ns, end_ns) = find_entry_exit(series, threshold, deep_is_below);
    Boundaries {
        start_ns,
        end_ns,
        threshold,
        deep_is_below,
    }
}
