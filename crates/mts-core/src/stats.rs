// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! NaN-aware reductions shared by the detectors.
//!
//! Missing samples are encoded as NaN and skipped by every reduction here. An
//! empty set of finite samples reduces to NaN (or `None` for the `Option` forms)
//! rather than an error: callers treat that as a per-level soft failure.

pub fn finite_values(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| v.is_finite()).collect()
}

pub fn finite_count(values: &[f64]) -> usize {
    values.iter().filter(|v| v.is_finite()).count()
}

pub fn finite_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Standard deviation of the finite samples with `ddof` delta degrees of freedom.
///
/// Returns NaN when there are not more than `ddof` finite samples.
pub fn finite_std(values: &[f64], ddof: usize) -> f64 {
    let count = finite_count(values);
    if count <= ddof {
        return f64::NAN;
    }
    let mean = finite_mean(values);
    let sum_sq = values
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| {
            let centered = v - mean;
            centered * centered
        })
        .sum::<f64>();
    (sum_sq / (count - ddof) as f64).sqrt()
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted = finite_values(values);
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

fn interpolate_sorted(sorted: &[f64], fraction: f64) -> f64 {
    if sorted.is_empty() || !fraction.is_finite() {
        return f64::NAN;
    }
    let fraction = fraction.clamp(0.0, 1.0);
    let position = fraction * (sorted.len() - 1) as f64;
    let lo = position.floor() as usize;
    let hi = position.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let weight = position - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * weight
}

/// Percentile with linear interpolation between order statistics, `q` in `[0, 100]`.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    interpolate_sorted(&sorted_finite(values), q / 100.0)
}

/// Quantile with linear interpolation between order statistics, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    interpolate_sorted(&sorted_finite(values), q)
}

pub fn median_of_finite(values: &[f64]) -> Option<f64> {
    let median = quantile(values, 0.5);
    median.is_finite().then_some(median)
}

pub fn nan_median(values: &[f64]) -> f64 {
    quantile(values, 0.5)
}

/// Centred rolling median over `window` samples, ignoring NaN, one finite sample minimum.
///
/// For even windows the extra sample is taken from the left.
pub fn rolling_median_centered(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 {
        return values.to_vec();
    }
    let n = values.len();
    let left = window / 2;
    let right = (window - 1) / 2;
    let mut scratch = Vec::with_capacity(window);
    let mut out = vec![f64::NAN; n];
    for (t, slot) in out.iter_mut().enumerate() {
        let start = t.saturating_sub(left);
        let end = t.saturating_add(right).saturating_add(1).min(n);
        scratch.clear();
        scratch.extend(values[start..end].iter().copied().filter(|v| v.is_finite()));
        if scratch.is_empty() {
            continue;
        }
        scratch.sort_by(|a, b| a.total_cmp(b));
        *slot = interpolate_sorted(&scratch, 0.5);
    }
    out
}
