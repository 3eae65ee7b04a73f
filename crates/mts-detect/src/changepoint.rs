// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_core::stats::finite_mean;

/// Single split of a piecewise-constant two-segment fit.
///
/// `split` is the first index of the right segment, so the left segment is
/// `[0, split)` and the right segment is `[split, n)`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepChange {
    pub split: usize,
    pub left_mean: f64,
    pub right_mean: f64,
    /// Total squared error of the fit; NaN when no admissible split existed.
    pub sse: f64,
    /// True when the series was too short (or too sparse) to split.
    pub degenerate: bool,
}

impl StepChange {
    fn degenerate(y: &[f64]) -> Self {
        let mean = finite_mean(y);
        Self {
            split: y.len() / 2,
            left_mean: mean,
            right_mean: mean,
            sse: f64::NAN,
            degenerate: true,
        }
    }

    pub fn step(&self) -> f64 {
        self.right_mean - self.left_mean
    }
}

struct PrefixSums {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
    count: Vec<usize>,
}

impl PrefixSums {
    fn new(y: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(y.len());
        let mut sum_sq = Vec::with_capacity(y.len());
        let mut count = Vec::with_capacity(y.len());
        let (mut s, mut q, mut c) = (0.0, 0.0, 0usize);
        for &value in y {
            if value.is_finite() {
                s += value;
                q += value * value;
                c += 1;
            }
            sum.push(s);
            sum_sq.push(q);
            count.push(c);
        }
        Self { sum, sum_sq, count }
    }
}

/// Least-squares single change point with at least `min_seg` finite samples per side.
///
/// Runs in O(n) using cumulative sums of values, squared values and finite
/// counts. NaN samples are excluded from the sums but keep their index
/// positions. `min_seg == 0` is treated as 1.
pub fn best_step_change(y: &[f64], min_seg: usize) -> StepChange {
    let min_seg = min_seg.max(1);
    let n = y.len();
    if n < 2 * min_seg + 1 {
        return StepChange::degenerate(y);
    }

    let prefix = PrefixSums::new(y);
    let total_sum = prefix.sum[n - 1];
    let total_sq = prefix.sum_sq[n - 1];
    let total_count = prefix.count[n - 1];

    let mut best: Option<StepChange> = None;
    for k in min_seg..=(n - min_seg) {
        let n1 = prefix.count[k - 1];
        let n2 = total_count - n1;
        if n1 < min_seg || n2 < min_seg {
            continue;
        }
        let s1 = prefix.sum[k - 1];
        let s2 = total_sum - s1;
        let q1 = prefix.sum_sq[k - 1];
        let q2 = total_sq - q1;
        let mu1 = s1 / n1 as f64;
        let mu2 = s2 / n2 as f64;
        let sse = (q1 - n1 as f64 * mu1 * mu1) + (q2 - n2 as f64 * mu2 * mu2);
        if best.is_none_or(|current| sse < current.sse) {
            best = Some(StepChange {
                split: k,
                left_mean: mu1,
                right_mean: mu2,
                sse,
                degenerate: false,
            });
        }
    }

    best.unwrap_or_else(|| StepChange::degenerate(y))
}
