// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use std::sync::Mutex;

/// Schema version of serialized diagnostics and run metadata.
pub const DIAGNOSTICS_SCHEMA_VERSION: u32 = 1;

/// Resolved warm (surface) side of a regime threshold.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarmSide {
    /// Surface values sit above the in-water regime; deep is below the threshold.
    High,
    /// Surface values sit below the in-water regime; deep is above the threshold.
    Low,
}

/// Which sample set produced the in-water statistics.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeaSource {
    Window,
    InterquartileProxy,
    FullSeries,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceReason {
    SmallestAbsoluteOffset,
    FallbackNoFiniteOffsets,
}

impl ReferenceReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SmallestAbsoluteOffset => "smallest absolute average timing offset",
            Self::FallbackNoFiniteOffsets => "fallback - no finite offsets",
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteLevel {
    Info,
    Warning,
}

/// One audited decision made during an analysis run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    WindowSelected {
        level: usize,
        start_ns: i64,
        end_ns: i64,
        fallback: bool,
    },
    SeaStatistics {
        level: usize,
        mean: f64,
        std: f64,
        source: SeaSource,
        samples: usize,
    },
    ThresholdComputed {
        level: usize,
        threshold: f64,
        halfwidth: f64,
        side: WarmSide,
        deep_is_below: bool,
        warm_estimate: Option<f64>,
    },
    BoundariesDetected {
        level: usize,
        method: String,
        start_ns: Option<i64>,
        end_ns: Option<i64>,
    },
    ConsensusFormed {
        members: Vec<usize>,
        bin_lo_seconds: f64,
        bin_hi_seconds: f64,
        ref_start_ns: i64,
        ref_end_ns: Option<i64>,
        relaxed_end_requirement: bool,
    },
    ReferenceSuggested {
        index: usize,
        reason: ReferenceReason,
        avg_offset_seconds: Option<f64>,
    },
    LagResolved {
        level: usize,
        best_lag: Option<i64>,
        max_correlation: f64,
        clock_offset_estimate_seconds: f64,
    },
    Note {
        level: Option<usize>,
        severity: NoteLevel,
        message: String,
    },
}

impl Diagnostic {
    pub fn warning(level: Option<usize>, message: impl Into<String>) -> Self {
        Self::Note {
            level,
            severity: NoteLevel::Warning,
            message: message.into(),
        }
    }

    pub fn info(level: Option<usize>, message: impl Into<String>) -> Self {
        Self::Note {
            level,
            severity: NoteLevel::Info,
            message: message.into(),
        }
    }

    /// Instrument level the record refers to, if any.
    pub fn level(&self) -> Option<usize> {
        match self {
            Self::WindowSelected { level, .. }
            | Self::SeaStatistics { level, .. }
            | Self::ThresholdComputed { level, .. }
            | Self::BoundariesDetected { level, .. }
            | Self::LagResolved { level, .. } => Some(*level),
            Self::ReferenceSuggested { index, .. } => Some(*index),
            Self::Note { level, .. } => *level,
            Self::ConsensusFormed { .. } => None,
        }
    }

    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::Note {
                severity: NoteLevel::Warning,
                ..
            }
        )
    }

    /// Mirrors the record as a `tracing` event.
    pub fn trace(&self) {
        match self {
            Self::WindowSelected {
                level,
                start_ns,
                end_ns,
                fallback,
            } => tracing::debug!(
                level_index = *level,
                start_ns,
                end_ns,
                fallback,
                "bottom window selected"
            ),
            Self::SeaStatistics {
                level,
                mean,
                std,
                source,
                samples,
            } => tracing::debug!(
                level_index = *level,
                mean,
                std,
                ?source,
                samples,
                "sea statistics"
            ),
            Self::ThresholdComputed {
                level,
                threshold,
                halfwidth,
                side,
                deep_is_below,
                warm_estimate,
            } => tracing::debug!(
                level_index = *level,
                threshold,
                halfwidth,
                ?side,
                deep_is_below,
                ?warm_estimate,
                "regime threshold computed"
            ),
            Self::BoundariesDetected {
                level,
                method,
                start_ns,
                end_ns,
            } => tracing::debug!(
                level_index = *level,
                %method,
                ?start_ns,
                ?end_ns,
                "deployment boundaries"
            ),
            Self::ConsensusFormed {
                members,
                bin_lo_seconds,
                bin_hi_seconds,
                ref_start_ns,
                ref_end_ns,
                relaxed_end_requirement,
            } => tracing::debug!(
                ?members,
                bin_lo_seconds,
                bin_hi_seconds,
                ref_start_ns,
                ?ref_end_ns,
                relaxed_end_requirement,
                "consensus group formed"
            ),
            Self::ReferenceSuggested {
                index,
                reason,
                avg_offset_seconds,
            } => tracing::debug!(
                reference_index = *index,
                reason = reason.as_str(),
                ?avg_offset_seconds,
                "reference instrument suggested"
            ),
            Self::LagResolved {
                level,
                best_lag,
                max_correlation,
                clock_offset_estimate_seconds,
            } => tracing::debug!(
                level_index = *level,
                ?best_lag,
                max_correlation,
                clock_offset_estimate_seconds,
                "lag correlation resolved"
            ),
            Self::Note {
                level,
                severity: NoteLevel::Warning,
                message,
            } => tracing::warn!(level_index = ?level, "{message}"),
            Self::Note {
                level,
                severity: NoteLevel::Info,
                message,
            } => tracing::info!(level_index = ?level, "{message}"),
        }
    }
}

/// Observer notified of every decision as it is made.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, diagnostic: &Diagnostic);
}

/// Sink that keeps every record in memory, in arrival order.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    records: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        match self.records.lock() {
            Ok(records) => records.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn record(&self, diagnostic: &Diagnostic) {
        match self.records.lock() {
            Ok(mut records) => records.push(diagnostic.clone()),
            Err(poisoned) => poisoned.into_inner().push(diagnostic.clone()),
        }
    }
}

/// Metadata describing one analysis run.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunMetadata {
    pub schema_version: u32,
    pub engine_version: Option<String>,
    pub runtime_ms: Option<u64>,
    pub n_levels: usize,
    pub n_samples: usize,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            schema_version: DIAGNOSTICS_SCHEMA_VERSION,
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms: None,
            n_levels: 0,
            n_samples: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DIAGNOSTICS_SCHEMA_VERSION, Diagnostic, DiagnosticLog, DiagnosticSink, ReferenceReason,
        RunMetadata, SeaSource,
    };

    #[test]
    fn run_metadata_default_sets_schema_and_engine_version() {
        let meta = RunMetadata::default();
        assert_eq!(meta.schema_version, DIAGNOSTICS_SCHEMA_VERSION);
        assert_eq!(meta.engine_version, Some(env!("CARGO_PKG_VERSION").to_string()));
        assert!(meta.runtime_ms.is_none());
    }

    #[test]
    fn level_accessor_covers_level_scoped_records() {
        let sea = Diagnostic::SeaStatistics {
            level: 3,
            mean: 4.0,
            std: 0.1,
            source: SeaSource::Window,
            samples: 10,
        };
        assert_eq!(sea.level(), Some(3));

        let suggestion = Diagnostic::ReferenceSuggested {
            index: 1,
            reason: ReferenceReason::SmallestAbsoluteOffset,
            avg_offset_seconds: Some(-1.0),
        };
        assert_eq!(suggestion.level(), Some(1));

        let note = Diagnostic::warning(None, "consensus relaxed");
        assert_eq!(note.level(), None);
        assert!(note.is_warning());
        assert!(!Diagnostic::info(Some(0), "ok").is_warning());
    }

    #[test]
    fn diagnostic_log_collects_in_order() {
        let log = DiagnosticLog::new();
        assert!(log.is_empty());
        log.record(&Diagnostic::info(Some(0), "first"));
        log.record(&Diagnostic::info(Some(1), "second"));
        let records = log.snapshot();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level(), Some(0));
        assert_eq!(records[1].level(), Some(1));
    }

    #[test]
    fn reference_reason_strings_are_stable() {
        assert_eq!(
            ReferenceReason::FallbackNoFiniteOffsets.as_str(),
            "fallback - no finite offsets"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn diagnostics_serialize_with_kind_tag() {
        let record = Diagnostic::WindowSelected {
            level: 2,
            start_ns: 10,
            end_ns: 20,
            fallback: true,
        };
        let encoded = serde_json::to_value(&record).expect("diagnostic should serialize");
        assert_eq!(encoded["kind"], "window_selected");
        assert_eq!(encoded["fallback"], true);

        let decoded: Diagnostic =
            serde_json::from_value(encoded).expect("diagnostic should deserialize");
        assert_eq!(decoded, record);
    }
}
