// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_core::{MtsError, add_seconds};

const SECONDS_PER_HOUR: f64 = 3_600.0;
const FALLBACK_START_FRACTION: f64 = 0.33;
const FALLBACK_END_FRACTION: f64 = 0.66;

pub const DEFAULT_BOTTOM_MARGIN_HOURS: f64 = 24.0;
pub const DEFAULT_INNER_FRACTION: f64 = 0.25;
pub const DEFAULT_DEPLOYMENT_MARGIN_HOURS: f64 = 2.0;

/// How to pick the part of a record that is almost surely at depth.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "strategy", rename_all = "snake_case", deny_unknown_fields)
)]
#[derive(Clone, Debug, PartialEq)]
pub enum BottomWindowStrategy {
    /// `[t_min + margin, t_max - margin]`.
    FixedHours { margin_hours: f64 },
    /// `[t_min + f * span, t_max - f * span]`.
    PercentSpan { inner_fraction: f64 },
    /// `[deployment + margin, recovery - margin]`; missing bounds default to the record ends.
    DeploymentBounds {
        deployment_ns: Option<i64>,
        recovery_ns: Option<i64>,
        margin_hours: f64,
    },
}

impl Default for BottomWindowStrategy {
    fn default() -> Self {
        Self::PercentSpan {
            inner_fraction: DEFAULT_INNER_FRACTION,
        }
    }
}

impl BottomWindowStrategy {
    pub fn fixed_hours(margin_hours: f64) -> Result<Self, MtsError> {
        let strategy = Self::FixedHours { margin_hours };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn percent_span(inner_fraction: f64) -> Result<Self, MtsError> {
        let strategy = Self::PercentSpan { inner_fraction };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn deployment_bounds(
        deployment_ns: Option<i64>,
        recovery_ns: Option<i64>,
        margin_hours: f64,
    ) -> Result<Self, MtsError> {
        let strategy = Self::DeploymentBounds {
            deployment_ns,
            recovery_ns,
            margin_hours,
        };
        strategy.validate()?;
        Ok(strategy)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FixedHours { .. } => "fixed_hours",
            Self::PercentSpan { .. } => "percent_span",
            Self::DeploymentBounds { .. } => "deployment_bounds",
        }
    }

    pub fn validate(&self) -> Result<(), MtsError> {
        match *self {
            Self::FixedHours { margin_hours } => validate_margin("FixedHours", margin_hours),
            Self::PercentSpan { inner_fraction } => {
                if !inner_fraction.is_finite() || !(0.0..0.5).contains(&inner_fraction) {
                    return Err(MtsError::invalid_input(format!(
                        "PercentSpan.inner_fraction must be finite and in [0.0, 0.5); got {inner_fraction}"
                    )));
                }
                Ok(())
            }
            Self::DeploymentBounds {
                deployment_ns,
                recovery_ns,
                margin_hours,
            } => {
                validate_margin("DeploymentBounds", margin_hours)?;
                if let (Some(deployment), Some(recovery)) = (deployment_ns, recovery_ns) {
                    if recovery < deployment {
                        return Err(MtsError::invalid_input(format!(
                            "DeploymentBounds requires deployment_ns <= recovery_ns; got deployment_ns={deployment}, recovery_ns={recovery}"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

fn validate_margin(strategy: &str, margin_hours: f64) -> Result<(), MtsError> {
    if !margin_hours.is_finite() || margin_hours < 0.0 {
        return Err(MtsError::invalid_input(format!(
            "{strategy}.margin_hours must be finite and >= 0.0; got {margin_hours}"
        )));
    }
    Ok(())
}

/// Inclusive in-water window used for baseline statistics.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BottomWindow {
    pub start_ns: i64,
    pub end_ns: i64,
    /// True when the strategy window was empty and the middle third was used.
    pub fallback: bool,
}

impl BottomWindow {
    pub fn contains(&self, t_ns: i64) -> bool {
        t_ns >= self.start_ns && t_ns <= self.end_ns
    }
}

fn fraction_of_span(t_min: i64, span_ns: i64, fraction: f64) -> i64 {
    t_min.saturating_add((span_ns as f64 * fraction).round() as i64)
}

/// Selects the steady in-water window of a record.
///
/// The strategy window is clipped to `[t_min, t_max]`; if that leaves it empty
/// or inverted the middle third of the record is used instead.
pub fn bottom_window(
    time: &[i64],
    strategy: &BottomWindowStrategy,
) -> Result<BottomWindow, MtsError> {
    strategy.validate()?;
    let (Some(&t_min), Some(&t_max)) = (time.first(), time.last()) else {
        return Err(MtsError::invalid_input(
            "bottom window requires a non-empty time axis",
        ));
    };
    let span_ns = t_max.saturating_sub(t_min);

    let (start, end) = match *strategy {
        BottomWindowStrategy::FixedHours { margin_hours } => {
            let margin = margin_hours * SECONDS_PER_HOUR;
            (add_seconds(t_min, margin), add_seconds(t_max, -margin))
        }
        BottomWindowStrategy::PercentSpan { inner_fraction } => {
            let pad = (span_ns as f64 * inner_fraction).round() as i64;
            (t_min.saturating_add(pad), t_max.saturating_sub(pad))
        }
        BottomWindowStrategy::DeploymentBounds {
            deployment_ns,
            recovery_ns,
            margin_hours,
        } => {
            let margin = margin_hours * SECONDS_PER_HOUR;
            (
                add_seconds(deployment_ns.unwrap_or(t_min), margin),
                add_seconds(recovery_ns.unwrap_or(t_max), -margin),
            )
        }
    };

    let start = start.max(t_min);
    let end = end.min(t_max);
    if end <= start {
        let start_ns = fraction_of_span(t_min, span_ns, FALLBACK_START_FRACTION);
        let end_ns = fraction_of_span(t_min, span_ns, FALLBACK_END_FRACTION)
            .max(start_ns.saturating_add(1))
            .min(t_max);
        return Ok(BottomWindow {
            start_ns,
            end_ns,
            fallback: true,
        });
    }

    Ok(BottomWindow {
        start_ns: start,
        end_ns: end,
        fallback: false,
    })
}
