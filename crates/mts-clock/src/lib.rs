// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

//! Clock offset estimation across the instruments of one mooring.

pub mod consensus;
pub mod lag;
pub mod reference;

pub use consensus::{ConsensusConfig, ConsensusResolver, ConsensusResult};
pub use lag::{
    LagCorrelationAnalyzer, LagCorrelationConfig, LagCorrelationResult, LevelLag, lag_correlation,
};
pub use reference::{ReferenceSuggestion, suggest_from_offsets, suggest_reference};

pub fn crate_name() -> &'static str {
    "mts-clock"
}

#[cfg(test)]
mod tests {
    use super::crate_name;

    #[test]
    fn crate_name_matches_expected() {
        assert_eq!(crate_name(), "mts-clock");
    }
}
