// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Shared types for mooring deployment timing and clock offset analysis.

pub mod control;
pub mod diagnostics;
pub mod error;
pub mod execution_context;
pub mod stats;
pub mod time_series;

pub use control::CancelToken;
pub use diagnostics::{
    DIAGNOSTICS_SCHEMA_VERSION, Diagnostic, DiagnosticLog, DiagnosticSink, NoteLevel,
    ReferenceReason, RunMetadata, SeaSource, WarmSide,
};
pub use error::MtsError;
pub use execution_context::ExecutionContext;
pub use time_series::{
    InstrumentLevel, InstrumentMeta, MooringDataset, NS_PER_SECOND, TimeAxis, TimeSeries,
    add_seconds, seconds_between,
};

pub fn crate_name() -> &'static str {
    "mts-core"
}
