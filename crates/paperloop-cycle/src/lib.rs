//! The cycle controller: harvest, admit, fine-tune, score, and adapt.
//!
//! One [`CycleController`] owns one [`CycleState`] and one admission
//! memory. Cycles run to completion on the calling thread; `&mut self`
//! keeps two cycles from ever touching the same state at once.

use anyhow::{Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use paperloop_admit::AdmissionFilter;
use paperloop_core::config::PipelineConfig;
use paperloop_core::traits::{Embedder, Harvester, MetricsSink, Preprocessor, Scorer, Trainer};
use paperloop_core::types::{CycleMetrics, ProcessedDocument, SearchProposal};
use paperloop_search::HyperparameterSearch;

pub mod external;
pub mod sink;

/// Share of accepted documents, taken from the front, used for scoring.
pub const HOLDOUT_FRACTION: f64 = 0.1;

/// Perplexity baseline before any cycle has completed.
pub const INITIAL_PERPLEXITY: f64 = 1.0;

/// Memory carried from one cycle to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleState {
    pub previous_perplexity: f64,
    pub config: PipelineConfig,
}

impl CycleState {
    pub fn new(config: PipelineConfig) -> Self { Self { previous_perplexity: INITIAL_PERPLEXITY, config } }

    /// True when `metrics` regressed past the threshold scaled by the previous cycle.
    pub fn regression_detected(&self, metrics: &CycleMetrics) -> bool {
        metrics.perplexity > self.config.pipeline.perplexity_threshold * self.previous_perplexity
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating state directory {}", parent.display()))?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?).with_context(|| format!("writing cycle state to {}", path.display()))
    }

    /// Restore the carried fields from a saved state onto a freshly loaded config:
    /// the perplexity baseline and the (possibly searched) training section.
    pub fn resume(config: PipelineConfig, path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading cycle state from {}", path.display()))?;
        let saved: CycleState = serde_json::from_str(&raw)?;
        let mut config = config;
        config.training = saved.config.training;
        Ok(Self { previous_perplexity: saved.previous_perplexity, config })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InsufficientDocuments { found: usize, required: usize },
    NothingAdmitted { candidates: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub metrics: CycleMetrics,
    pub proposal: Option<SearchProposal>,
    pub admitted: usize,
    pub model: PathBuf,
    pub record: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Completed(CycleReport),
}

/// The external stages a cycle drives.
pub struct Collaborators {
    pub harvester: Box<dyn Harvester>,
    pub preprocessor: Box<dyn Preprocessor>,
    pub trainer: Box<dyn Trainer>,
    pub scorer: Box<dyn Scorer>,
    pub sink: Box<dyn MetricsSink>,
}

pub struct CycleController {
    state: CycleState,
    admission: AdmissionFilter,
    search: HyperparameterSearch,
    stages: Collaborators,
}

impl CycleController {
    pub fn new(config: PipelineConfig, embedder: Box<dyn Embedder>, stages: Collaborators) -> Self {
        Self::from_state(CycleState::new(config), embedder, stages)
    }

    pub fn from_state(state: CycleState, embedder: Box<dyn Embedder>, stages: Collaborators) -> Self {
        let admission = AdmissionFilter::new(embedder, &state.config.pipeline.keywords, state.config.admission.clone());
        let search = HyperparameterSearch::new(&state.config.search);
        Self { state, admission, search, stages }
    }

    pub fn state(&self) -> &CycleState { &self.state }
    pub fn admission(&self) -> &AdmissionFilter { &self.admission }

    /// Run one cycle. Failures are logged with their full cause chain and swallowed.
    pub fn run_cycle(&mut self) {
        match self.try_run_cycle() {
            Ok(CycleOutcome::Completed(_)) => info!("Cycle completed successfully."),
            Ok(CycleOutcome::Skipped(_)) => {}
            Err(e) => error!("Cycle failed: {e:?}"),
        }
    }

    pub fn try_run_cycle(&mut self) -> Result<CycleOutcome> {
        let settings = &self.state.config.pipeline;
        let documents = self.stages.harvester.harvest(&settings.keywords, settings.harvest_limit).context("harvesting documents")?;
        if documents.len() < settings.min_papers_threshold {
            warn!("Insufficient new documents ({} < {}); skipping cycle.", documents.len(), settings.min_papers_threshold);
            return Ok(CycleOutcome::Skipped(SkipReason::InsufficientDocuments { found: documents.len(), required: settings.min_papers_threshold }));
        }

        let processed = self.stages.preprocessor.process(&documents).context("preprocessing documents")?;
        let candidates = processed.len();
        let accepted = self.admission.filter(processed).context("admitting documents")?;
        if accepted.is_empty() {
            warn!("No documents admitted out of {candidates}; ending cycle.");
            return Ok(CycleOutcome::Skipped(SkipReason::NothingAdmitted { candidates }));
        }

        let model = self.stages.trainer.fine_tune(&accepted, &self.state.config).context("fine-tuning model")?;

        let held_out = held_out_texts(&accepted);
        let metrics = self.stages.scorer.score(&model, &held_out).context("scoring fine-tuned model")?;
        metrics.validate().context("scorer returned unusable metrics")?;
        info!(perplexity = metrics.perplexity, bleu = metrics.bleu, rouge = metrics.rouge, accuracy = metrics.accuracy, "Evaluation metrics");

        let proposal = if self.state.regression_detected(&metrics) {
            let proposal = self.search.propose(&metrics);
            self.state.config.apply_proposal(&proposal);
            info!("Config updated for next cycle based on metrics.");
            Some(proposal)
        } else {
            None
        };
        self.state.previous_perplexity = metrics.perplexity;

        let record = self.stages.sink.record(&metrics, Local::now()).context("recording cycle metrics")?;
        Ok(CycleOutcome::Completed(CycleReport { metrics, proposal, admitted: accepted.len(), model, record }))
    }
}

/// Chunks of the first `floor(len * HOLDOUT_FRACTION)` accepted documents, in order.
pub fn held_out_texts(accepted: &[ProcessedDocument]) -> Vec<String> {
    let n = (accepted.len() as f64 * HOLDOUT_FRACTION).floor() as usize;
    accepted[..n].iter().flat_map(|d| d.chunks.iter().cloned()).collect()
}
