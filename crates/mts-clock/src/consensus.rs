// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_core::{Diagnostic, ExecutionContext, MtsError, seconds_between};
use mts_detect::DeploymentAnnotations;
use std::collections::BTreeMap;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConsensusConfig {
    /// Histogram bin width used to group naive start offsets.
    pub bin_width_sec: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self { bin_width_sec: 60.0 }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), MtsError> {
        if !self.bin_width_sec.is_finite() || self.bin_width_sec <= 0.0 {
            return Err(MtsError::invalid_input(format!(
                "ConsensusConfig.bin_width_sec must be finite and > 0.0; got {}",
                self.bin_width_sec
            )));
        }
        Ok(())
    }
}

/// Timing offsets of every level relative to the consensus group.
///
/// All offset arrays are indexed by level and hold NaN where the level has no
/// boundary. A positive start offset means the level's detected entry is late
/// relative to the consensus reference.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ConsensusResult {
    pub start_offsets_seconds: Vec<f64>,
    pub end_offsets_seconds: Vec<f64>,
    pub avg_offsets_seconds: Vec<f64>,
    pub diff_offsets_seconds: Vec<f64>,
    pub drift_rates_per_day: Vec<f64>,
    pub consensus_indices: Vec<usize>,
    pub ref_start_ns: i64,
    pub ref_end_ns: Option<i64>,
    pub bin_lo_seconds: f64,
    pub bin_hi_seconds: f64,
    /// True when no member had a finite end and the end requirement was dropped.
    pub relaxed_end_requirement: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConsensusResult {
    pub fn n_levels(&self) -> usize {
        self.start_offsets_seconds.len()
    }

    pub fn is_member(&self, level: usize) -> bool {
        self.consensus_indices.binary_search(&level).is_ok()
    }

    /// Correction to add to the level's timestamps to line it up with the consensus clock.
    pub fn suggested_correction_seconds(&self, level: usize) -> f64 {
        self.avg_offsets_seconds
            .get(level)
            .map_or(f64::NAN, |offset| -offset)
    }
}

fn offsets_from(times: &[Option<i64>], reference: Option<i64>) -> Vec<f64> {
    times
        .iter()
        .map(|t| match (*t, reference) {
            (Some(t), Some(reference)) => seconds_between(reference, t),
            _ => f64::NAN,
        })
        .collect()
}

/// Histogram bin of `value` for bins of `width` anchored at `lo`.
fn bin_index(value: f64, lo: f64, width: f64) -> u64 {
    ((value - lo) / width).floor() as u64
}

/// First fullest bin over the finite `values`, as `(index, count)`.
///
/// Only occupied bins are stored, at most one per value.
fn modal_bin(values: &[f64], lo: f64, width: f64) -> Option<(u64, usize)> {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for &value in values.iter().filter(|v| v.is_finite()) {
        *counts.entry(bin_index(value, lo, width)).or_default() += 1;
    }
    counts
        .into_iter()
        .fold(None, |best, (bin, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((bin, count)),
        })
}

/// Groups levels by naive start offset and measures every level against the group.
#[derive(Clone, Debug)]
pub struct ConsensusResolver {
    config: ConsensusConfig,
}

impl ConsensusResolver {
    pub fn new(config: ConsensusConfig) -> Result<Self, MtsError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn resolve_annotations(
        &self,
        annotations: &DeploymentAnnotations,
        ctx: &ExecutionContext<'_>,
    ) -> Result<ConsensusResult, MtsError> {
        self.resolve(&annotations.start_times(), &annotations.end_times(), ctx)
    }

    pub fn resolve(
        &self,
        starts: &[Option<i64>],
        ends: &[Option<i64>],
        ctx: &ExecutionContext<'_>,
    ) -> Result<ConsensusResult, MtsError> {
        if starts.len() != ends.len() {
            return Err(MtsError::invalid_input(format!(
                "start/end length mismatch: {} start times, {} end times",
                starts.len(),
                ends.len()
            )));
        }
        ctx.check_cancelled()?;

        let naive_start = starts.iter().flatten().copied().min();
        let naive_end = ends.iter().flatten().copied().max();
        let Some(naive_start) = naive_start else {
            return Err(MtsError::no_consensus(
                "no finite start offsets to form consensus",
            ));
        };

        let naive_offsets = offsets_from(starts, Some(naive_start));
        let finite: Vec<f64> = naive_offsets
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        let lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let width = self.config.bin_width_sec;
        let (bin, _) = modal_bin(&finite, lo, width).ok_or_else(|| {
            MtsError::numerical_issue("no finite start offsets to bin")
        })?;
        let bin_lo = lo + bin as f64 * width;
        let bin_hi = bin_lo + width;
        tracing::debug!(?naive_end, bin_lo, bin_hi, "naive start offsets binned");

        let in_bin: Vec<usize> = naive_offsets
            .iter()
            .enumerate()
            .filter(|(_, off)| off.is_finite() && bin_index(**off, lo, width) == bin)
            .map(|(idx, _)| idx)
            .collect();
        let with_end: Vec<usize> = in_bin
            .iter()
            .copied()
            .filter(|idx| ends[*idx].is_some())
            .collect();
        let relaxed_end_requirement = with_end.is_empty();
        let consensus_indices = if relaxed_end_requirement {
            in_bin
        } else {
            with_end
        };

        let ref_start = consensus_indices
            .iter()
            .filter_map(|idx| starts[*idx])
            .min()
            .ok_or_else(|| {
                MtsError::no_consensus("consensus group holds no finite start time")
            })?;
        let ref_end = consensus_indices.iter().filter_map(|idx| ends[*idx]).max();

        let start_offsets = offsets_from(starts, Some(ref_start));
        let end_offsets = offsets_from(ends, ref_end);
        let avg_offsets: Vec<f64> = start_offsets
            .iter()
            .zip(&end_offsets)
            .map(|(s, e)| (s + e) / 2.0)
            .collect();
        let diff_offsets: Vec<f64> = start_offsets
            .iter()
            .zip(&end_offsets)
            .map(|(s, e)| s - e)
            .collect();
        let drift_rates: Vec<f64> = starts
            .iter()
            .zip(ends)
            .zip(start_offsets.iter().zip(&end_offsets))
            .map(|((start, end), (s_off, e_off))| match (start, end) {
                (Some(start), Some(end)) => {
                    let duration = seconds_between(*start, *end);
                    if duration > 0.0 && s_off.is_finite() && e_off.is_finite() {
                        (e_off - s_off) / duration * SECONDS_PER_DAY
                    } else {
                        f64::NAN
                    }
                }
                _ => f64::NAN,
            })
            .collect();

        let mut diagnostics = vec![Diagnostic::ConsensusFormed {
            members: consensus_indices.clone(),
            bin_lo_seconds: bin_lo,
            bin_hi_seconds: bin_hi,
            ref_start_ns: ref_start,
            ref_end_ns: ref_end,
            relaxed_end_requirement,
        }];
        if relaxed_end_requirement {
            diagnostics.push(Diagnostic::warning(
                None,
                "no consensus member has a finite end time; end requirement relaxed",
            ));
        }
        for (level, offset) in start_offsets.iter().enumerate() {
            if consensus_indices.binary_search(&level).is_err() {
                diagnostics.push(Diagnostic::info(
                    Some(level),
                    format!("level outside consensus group (start offset {offset:+.0}s)"),
                ));
            }
        }
        ctx.emit_all(&diagnostics);

        Ok(ConsensusResult {
            start_offsets_seconds: start_offsets,
            end_offsets_seconds: end_offsets,
            avg_offsets_seconds: avg_offsets,
            diff_offsets_seconds: diff_offsets,
            drift_rates_per_day: drift_rates,
            consensus_indices,
            ref_start_ns: ref_start,
            ref_end_ns: ref_end,
            bin_lo_seconds: bin_lo,
            bin_hi_seconds: bin_hi,
            relaxed_end_requirement,
            diagnostics,
        })
    }
}
