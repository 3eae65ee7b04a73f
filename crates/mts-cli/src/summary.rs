// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::analysis::AnalysisReport;
use chrono::DateTime;
use mts_core::MooringDataset;
use std::fmt::Write as _;

fn format_time(t_ns: Option<i64>) -> String {
    match t_ns {
        Some(t) => DateTime::from_timestamp_nanos(t)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "NaT".to_string(),
    }
}

fn meta_or_dash(value: Option<&String>) -> &str {
    value.map_or("-", String::as_str)
}

/// Consensus timing table: one row per level with offsets, drift and membership.
pub fn render_timing_summary(dataset: &MooringDataset, report: &AnalysisReport) -> String {
    let consensus = &report.consensus;
    let starts = report.annotations.start_times();
    let ends = report.annotations.end_times();

    let mut out = String::new();
    let members = consensus
        .consensus_indices
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(
        out,
        "Consensus group size: {} (levels {members})",
        consensus.consensus_indices.len()
    );
    let _ = writeln!(
        out,
        "Consensus-derived refs -> ref_start={}, ref_end={}",
        format_time(Some(consensus.ref_start_ns)),
        format_time(consensus.ref_end_ns)
    );
    if consensus.relaxed_end_requirement {
        out.push_str("(no member had an end time; end requirement relaxed)\n");
    }
    out.push('\n');

    for (i, level) in dataset.levels().iter().enumerate() {
        let tag = if consensus.is_member(i) { "REF" } else { "-" };
        let drift = consensus.drift_rates_per_day[i];
        let drift = if drift.is_finite() {
            format!("{drift:+.2} s/day")
        } else {
            "nan".to_string()
        };
        let _ = writeln!(
            out,
            "{i:02}: {:8}/{:6} | start={} ({:+8.0}s) | end={} ({:+8.0}s) | avg={:+8.0}s | diff={:+6.0}s | drift={drift} | {tag}",
            meta_or_dash(level.meta.instrument.as_ref()),
            meta_or_dash(level.meta.serial_number.as_ref()),
            format_time(starts.get(i).copied().flatten()),
            consensus.start_offsets_seconds[i],
            format_time(ends.get(i).copied().flatten()),
            consensus.end_offsets_seconds[i],
            consensus.avg_offsets_seconds[i],
            consensus.diff_offsets_seconds[i],
        );
    }
    out
}

/// Reference level proposal with the reason it was chosen.
pub fn render_reference(dataset: &MooringDataset, report: &AnalysisReport) -> String {
    let suggestion = &report.suggested_reference;
    let mut out = String::from("Suggested reference instrument for lag correlation:\n");
    if let Ok(level) = dataset.level(suggestion.index) {
        let depth = level
            .meta
            .nominal_depth_m
            .map_or_else(|| "unknown depth".to_string(), |d| format!("{d:.0}m"));
        let _ = writeln!(
            out,
            "  Index {}: {} #{} at {depth}",
            suggestion.index,
            meta_or_dash(level.meta.instrument.as_ref()),
            meta_or_dash(level.meta.serial_number.as_ref()),
        );
    }
    if let Some(offset) = suggestion.avg_offset_seconds {
        let _ = writeln!(out, "  Average timing offset: {offset:+.1}s");
    }
    let _ = writeln!(out, "  Reason: {}", suggestion.reason.as_str());
    if report.reference_index != suggestion.index {
        let _ = writeln!(
            out,
            "  Overridden: level {} was used as the reference",
            report.reference_index
        );
    }
    out
}

/// Lag correlation results with the `clock_offset` value to record per level.
pub fn render_lag_summary(dataset: &MooringDataset, report: &AnalysisReport) -> String {
    let mut out = String::from(
        "Lag Correlation Analysis Results:\n(Enter the summed value, no sign change, as the level's clock_offset)\n\n",
    );
    for level in &report.lag.levels {
        let serial = dataset
            .level(level.level)
            .ok()
            .and_then(|l| l.meta.serial_number.as_ref());
        let lag = level
            .best_lag
            .map_or_else(|| "nan".to_string(), |lag| lag.to_string());
        let _ = writeln!(
            out,
            "Level {} (#{}): max corr = {:.3} @lag {lag} --> clock_offset: {:.0}s",
            level.level + 1,
            meta_or_dash(serial),
            level.max_correlation,
            level.clock_offset_estimate_seconds,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{format_time, render_lag_summary, render_reference, render_timing_summary};
    use crate::analysis::{AnalysisConfig, run_analysis};
    use mts_core::{
        ExecutionContext, InstrumentLevel, InstrumentMeta, MooringDataset, NS_PER_SECOND, TimeAxis,
    };

    fn dataset() -> MooringDataset {
        let n = 600;
        let time = TimeAxis::uniform(1_700_000_000 * NS_PER_SECOND, 60 * NS_PER_SECOND, n)
            .expect("uniform axis");
        let levels = [0usize, 0, 2]
            .iter()
            .enumerate()
            .map(|(idx, delay)| {
                let values = (0..n)
                    .map(|i| if i >= 40 + delay && i < n - 40 + delay { 4.0 } else { 18.0 })
                    .collect();
                InstrumentLevel::new(values).with_meta(InstrumentMeta {
                    serial_number: Some(format!("{}", 4701 + idx)),
                    instrument: Some("microcat".to_string()),
                    nominal_depth_m: Some(100.0 + 50.0 * idx as f64),
                })
            })
            .collect();
        MooringDataset::new(time, levels).expect("dataset should be valid")
    }

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_time(Some(1_700_000_000 * NS_PER_SECOND)), "2023-11-14 22:13:20");
        assert_eq!(format_time(None), "NaT");
    }

    #[test]
    fn summaries_list_every_level() {
        let data = dataset();
        let mut config = AnalysisConfig::default();
        config.lag.sub_sample = 1;
        let report = run_analysis(&data, &config, &ExecutionContext::new())
            .expect("analysis should succeed");

        let timing = render_timing_summary(&data, &report);
        assert!(timing.starts_with("Consensus group size: 2 (levels 0, 1)\n"));
        assert!(timing.contains("00: microcat/4701   | start=2023-11-14 22:53:20 (      +0s)"));
        assert!(timing.contains("avg=    +120s"));
        assert!(timing.contains("drift=+0.00 s/day | -"));
        assert_eq!(timing.matches(" | REF").count(), 2);

        let reference = render_reference(&data, &report);
        assert!(reference.contains("Index 0: microcat #4701 at 100m"));
        assert!(reference.contains("Average timing offset: +0.0s"));
        assert!(reference.contains("Reason: smallest absolute average timing offset"));

        let lag = render_lag_summary(&data, &report);
        assert!(lag.contains("Level 1 (#4701): max corr = 1.000 @lag 0 --> clock_offset: 0s"));
        assert!(lag.contains("Level 3 (#4703): max corr = 1.000 @lag -2 --> clock_offset: -120s"));
    }
}
