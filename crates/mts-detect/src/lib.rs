// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Deployment boundary detection: bottom windows, sea regimes, thresholds and crossings.

pub mod changepoint;
pub mod deployment;
pub mod regime;
pub mod runs;
pub mod threshold;
pub mod window;

pub use changepoint::{StepChange, best_step_change};
pub use deployment::{
    BoundaryPolarity, DeploymentAnnotations, DeploymentConfig, DeploymentDetector,
    DetectionMethod, LevelAnnotation, find_entry_exit, find_entry_exit_below,
    infer_deep_is_below,
};
pub use regime::{SeaStatistics, sea_values};
pub use runs::{Run, first_sustained, last_sustained, runs_of_true};
pub use threshold::{
    SigmaBandThreshold, ThresholdConfig, WarmSideMode, histogram_split, sigma_band_threshold,
};
pub use window::{BottomWindow, BottomWindowStrategy, bottom_window};

pub fn crate_name() -> &'static str {
    "mts-detect"
}
