// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! End-to-end mooring timing analysis used by the `mts` binary.

pub mod analysis;
pub mod dataset;
pub mod summary;

pub use analysis::{
    AnalysisConfig, AnalysisReport, ReferenceChoice, config_from_json, run_analysis, run_detection,
};
pub use dataset::{DatasetDocument, LevelDocument, dataset_from_json, parse_timestamp};
pub use summary::{render_lag_summary, render_reference, render_timing_summary};

pub fn crate_name() -> &'static str {
    "mts-cli"
}
