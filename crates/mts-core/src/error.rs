// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use thiserror::Error;

/// Errors that abort an analysis run.
///
/// Per-level soft failures (empty windows, missing crossings, NaN correlations)
/// never surface here; they resolve to sentinel values and a diagnostic note.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MtsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("numerical issue: {0}")]
    NumericalIssue(String),
    #[error("no consensus: {0}")]
    NoConsensus(String),
    #[error("cancelled")]
    Cancelled,
}

impl MtsError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn numerical_issue(msg: impl Into<String>) -> Self {
        Self::NumericalIssue(msg.into())
    }

    pub fn no_consensus(msg: impl Into<String>) -> Self {
        Self::NoConsensus(msg.into())
    }

    pub fn cancelled() -> Self {
        Self::Cancelled
    }
}
