//! Bounded random search over the training hyperparameters.
//!
//! ## Space
//!
//! | Parameter         | Range          | Sampling     |
//! |-------------------|----------------|--------------|
//! | `learning_rate`   | [1e-5, 1e-3]   | log-uniform  |
//! | `batch_size`      | [2, 8]         | uniform int  |
//! | `training_epochs` | [1, 5]         | uniform int  |
//!
//! ## Objective
//!
//! [`MetricsObjective`] scores every candidate as
//! `(1 - bleu) + (1 - rouge) + perplexity` of the cycle that triggered the
//! search. It does not look at the candidate, so all trials tie and the
//! first sampled point wins. Swap in a [`SurrogateObjective`] that predicts
//! retraining quality before relying on the proposals.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use paperloop_core::config::SearchConfig;
use paperloop_core::types::{CycleMetrics, SearchProposal};

/// Continuous parameter range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    /// If true, sample in log space
    pub log_scale: bool,
}

impl ParamRange {
    pub fn linear(min: f64, max: f64) -> Self { Self { min: min.min(max), max: max.max(min), log_scale: false } }

    pub fn log(min: f64, max: f64) -> Self { Self { min: min.min(max), max: max.max(min), log_scale: true } }

    /// Convert normalized [0, 1] value to actual parameter value.
    pub fn decode(&self, normalized: f64) -> f64 {
        let (lo, hi) = (self.min.min(self.max), self.max.max(self.min));
        let t = normalized.clamp(0.0, 1.0);
        let value = if self.log_scale {
            let log_min = lo.ln();
            let log_max = hi.ln();
            (log_min + t * (log_max - log_min)).exp()
        } else {
            lo + t * (hi - lo)
        };
        // exp/ln round-trips can land a hair outside the bounds
        value.clamp(lo, hi)
    }
}

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntRange {
    pub min: u32,
    pub max: u32,
}

impl IntRange {
    pub fn new(min: u32, max: u32) -> Self { Self { min: min.min(max), max: max.max(min) } }

    fn sample<R: Rng>(&self, rng: &mut R) -> u32 { rng.gen_range(self.min..=self.max) }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub learning_rate: ParamRange,
    pub batch_size: IntRange,
    pub training_epochs: IntRange,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            learning_rate: ParamRange::log(1e-5, 1e-3),
            batch_size: IntRange::new(2, 8),
            training_epochs: IntRange::new(1, 5),
        }
    }
}

impl SearchSpace {
    /// Draw one point, each dimension independently.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> SearchProposal {
        SearchProposal {
            learning_rate: self.learning_rate.decode(rng.gen::<f64>()),
            batch_size: self.batch_size.sample(rng),
            training_epochs: self.training_epochs.sample(rng),
        }
    }
}

/// Scalar the search minimizes for a candidate, given the observed metrics.
pub trait SurrogateObjective: Send + Sync {
    fn evaluate(&self, metrics: &CycleMetrics, candidate: &SearchProposal) -> f64;
}

/// `(1 - bleu) + (1 - rouge) + perplexity`; constant across candidates.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObjective;

impl SurrogateObjective for MetricsObjective {
    fn evaluate(&self, metrics: &CycleMetrics, _candidate: &SearchProposal) -> f64 {
        (1.0 - metrics.bleu) + (1.0 - metrics.rouge) + metrics.perplexity
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trial {
    pub proposal: SearchProposal,
    pub objective: f64,
}

/// Every trial of one run plus the winner.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub trials: Vec<Trial>,
    pub best: Trial,
}

pub struct HyperparameterSearch {
    space: SearchSpace,
    trials: usize,
    seed: Option<u64>,
    objective: Box<dyn SurrogateObjective>,
}

impl HyperparameterSearch {
    pub fn new(config: &SearchConfig) -> Self {
        Self { space: SearchSpace::default(), trials: config.trials.max(1), seed: config.seed, objective: Box::new(MetricsObjective) }
    }

    pub fn with_space(mut self, space: SearchSpace) -> Self { self.space = space; self }

    pub fn with_objective(mut self, objective: Box<dyn SurrogateObjective>) -> Self { self.objective = objective; self }

    pub fn space(&self) -> &SearchSpace { &self.space }

    /// Best point of a fresh search run.
    pub fn propose(&self, metrics: &CycleMetrics) -> SearchProposal {
        let report = self.run(metrics);
        info!(
            learning_rate = report.best.proposal.learning_rate,
            batch_size = report.best.proposal.batch_size,
            training_epochs = report.best.proposal.training_epochs,
            objective = report.best.objective,
            "Suggested config improvements"
        );
        report.best.proposal
    }

    /// Run `trials` independent samples and keep the lowest objective.
    /// Ties keep the earliest trial.
    pub fn run(&self, metrics: &CycleMetrics) -> SearchReport {
        let mut rng = match self.seed { Some(seed) => StdRng::seed_from_u64(seed), None => StdRng::from_entropy() };
        let trials: Vec<Trial> = (0..self.trials)
            .map(|i| {
                let proposal = self.space.sample(&mut rng);
                let objective = self.objective.evaluate(metrics, &proposal);
                debug!(trial = i, ?proposal, objective, "search trial");
                Trial { proposal, objective }
            })
            .collect();
        let mut best = trials[0];
        for t in &trials[1..] {
            if t.objective < best.objective { best = *t; }
        }
        SearchReport { trials, best }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_range_decodes_endpoints() {
        let r = ParamRange::log(1e-5, 1e-3);
        assert!((r.decode(0.0) - 1e-5).abs() < 1e-18);
        assert!((r.decode(1.0) - 1e-3).abs() < 1e-15);
        assert!((r.decode(0.5) - 1e-4).abs() < 1e-12, "geometric midpoint");
    }

    #[test]
    fn linear_range_decodes_midpoint() {
        assert!((ParamRange::linear(2.0, 4.0).decode(0.5) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn int_range_orders_bounds() {
        assert_eq!(IntRange::new(5, 1), IntRange { min: 1, max: 5 });
    }
}
