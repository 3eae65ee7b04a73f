// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::consensus::ConsensusResult;
use mts_core::{Diagnostic, ExecutionContext, ReferenceReason};

/// Level proposed as the correlation anchor.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceSuggestion {
    pub index: usize,
    pub reason: ReferenceReason,
    pub avg_offset_seconds: Option<f64>,
}

/// First level with the smallest finite `|avg_offset|`, or level 0 when none is finite.
pub fn suggest_from_offsets(avg_offsets: &[f64]) -> ReferenceSuggestion {
    let best = avg_offsets
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, offset)| offset.is_finite())
        .fold(None, |best: Option<(usize, f64)>, (idx, offset)| match best {
            Some((_, current)) if current.abs() <= offset.abs() => best,
            _ => Some((idx, offset)),
        });

    match best {
        Some((index, offset)) => ReferenceSuggestion {
            index,
            reason: ReferenceReason::SmallestAbsoluteOffset,
            avg_offset_seconds: Some(offset),
        },
        None => ReferenceSuggestion {
            index: 0,
            reason: ReferenceReason::FallbackNoFiniteOffsets,
            avg_offset_seconds: None,
        },
    }
}

/// Suggests the level whose boundaries agree best with the consensus group.
pub fn suggest_reference(
    result: &ConsensusResult,
    ctx: &ExecutionContext<'_>,
) -> ReferenceSuggestion {
    let suggestion = suggest_from_offsets(&result.avg_offsets_seconds);
    if suggestion.reason == ReferenceReason::FallbackNoFiniteOffsets {
        ctx.emit(&Diagnostic::warning(
            None,
            "no level has a finite average timing offset; falling back to level 0",
        ));
    }
    ctx.emit(&Diagnostic::ReferenceSuggested {
        index: suggestion.index,
        reason: suggestion.reason,
        avg_offset_seconds: suggestion.avg_offset_seconds,
    });
    suggestion
}
