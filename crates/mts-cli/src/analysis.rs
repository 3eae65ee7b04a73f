// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use mts_clock::{
    ConsensusConfig, ConsensusResolver, ConsensusResult, LagCorrelationAnalyzer,
    LagCorrelationConfig, LagCorrelationResult, ReferenceSuggestion, suggest_reference,
};
use mts_core::{
    Diagnostic, DiagnosticLog, DiagnosticSink, ExecutionContext, MooringDataset, MtsError,
    RunMetadata,
};
use mts_detect::{DeploymentAnnotations, DeploymentConfig, DeploymentDetector};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Which level anchors the lag correlation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceChoice {
    /// The level with the smallest consensus average offset.
    #[default]
    Suggested,
    Fixed(usize),
}

/// Full configuration of one analysis run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub deployment: DeploymentConfig,
    pub consensus: ConsensusConfig,
    pub lag: LagCorrelationConfig,
    pub reference: ReferenceChoice,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), MtsError> {
        self.deployment.validate()?;
        self.consensus.validate()?;
        self.lag.validate()
    }
}

/// Parses an analysis configuration from JSON text; absent fields keep their defaults.
pub fn config_from_json(raw: &str) -> Result<AnalysisConfig, MtsError> {
    let config: AnalysisConfig = serde_json::from_str(raw)
        .map_err(|err| MtsError::invalid_input(format!("invalid analysis config JSON: {err}")))?;
    config.validate()?;
    Ok(config)
}

/// Everything an analysis run found. Nothing here has been applied to the data.
///
/// Output only: missing offsets and correlations encode as JSON `null`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub metadata: RunMetadata,
    pub config: AnalysisConfig,
    pub annotations: DeploymentAnnotations,
    pub consensus: ConsensusResult,
    pub suggested_reference: ReferenceSuggestion,
    pub reference_index: usize,
    pub lag: LagCorrelationResult,
    /// Every stage's records in emission order.
    pub diagnostics: Vec<Diagnostic>,
}

/// Forwards records to the run log and to the caller's sink.
struct TeeSink<'a> {
    log: &'a DiagnosticLog,
    outer: Option<&'a dyn DiagnosticSink>,
}

impl DiagnosticSink for TeeSink<'_> {
    fn record(&self, diagnostic: &Diagnostic) {
        self.log.record(diagnostic);
        if let Some(outer) = self.outer {
            outer.record(diagnostic);
        }
    }
}

/// Detection only: per-level deployment boundaries and their audit trail.
pub fn run_detection(
    dataset: &MooringDataset,
    config: &AnalysisConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<DeploymentAnnotations, MtsError> {
    DeploymentDetector::new(config.deployment.clone())?.detect(dataset, ctx)
}

/// Runs detection, consensus timing, reference selection and lag correlation.
pub fn run_analysis(
    dataset: &MooringDataset,
    config: &AnalysisConfig,
    ctx: &ExecutionContext<'_>,
) -> Result<AnalysisReport, MtsError> {
    let started = Instant::now();
    config.validate()?;

    let log = DiagnosticLog::new();
    let tee = TeeSink {
        log: &log,
        outer: ctx.sink,
    };
    let stage_ctx = ExecutionContext {
        sink: Some(&tee),
        ..*ctx
    };

    let annotations = run_detection(dataset, config, &stage_ctx)?;
    let consensus =
        ConsensusResolver::new(config.consensus)?.resolve_annotations(&annotations, &stage_ctx)?;
    let suggested_reference = suggest_reference(&consensus, &stage_ctx);

    let reference_index = match config.reference {
        ReferenceChoice::Suggested => suggested_reference.index,
        ReferenceChoice::Fixed(index) => {
            dataset.level(index)?;
            stage_ctx.emit(&Diagnostic::info(
                Some(index),
                format!(
                    "reference fixed by configuration (suggested level {})",
                    suggested_reference.index
                ),
            ));
            index
        }
    };
    let lag =
        LagCorrelationAnalyzer::new(config.lag)?.analyze(dataset, reference_index, &stage_ctx)?;

    let runtime_ms = u64::try_from(started.elapsed().as_millis()).ok();
    tracing::info!(
        levels = dataset.n_levels(),
        samples = dataset.n_samples(),
        consensus_members = consensus.consensus_indices.len(),
        reference_index,
        ?runtime_ms,
        "analysis finished"
    );

    Ok(AnalysisReport {
        metadata: RunMetadata {
            engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            runtime_ms,
            n_levels: dataset.n_levels(),
            n_samples: dataset.n_samples(),
            ..RunMetadata::default()
        },
        config: config.clone(),
        annotations,
        consensus,
        suggested_reference,
        reference_index,
        lag,
        diagnostics: log.snapshot(),
    })
}
