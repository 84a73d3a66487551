//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! and `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_PIPELINE__MIN_PAPERS_THRESHOLD=5`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::data_processor::ChunkingConfig;
use crate::error::Error;
use crate::types::SearchProposal;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Self::base().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.pipeline()?;
        Ok(config)
    }

    /// Load an explicit config file on top of the defaults, then `APP_*` overrides.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.is_file() {
            return Err(Error::NotFound(format!("config file {}", path.display())).into());
        }
        let figment = Self::base().merge(Toml::file(path)).merge(Env::prefixed("APP_").split("__"));
        let config = Self { figment };
        config.pipeline()?;
        Ok(config)
    }

    /// Defaults only, with an inline TOML document merged on top. Handy for tests.
    pub fn from_toml_str(toml: &str) -> anyhow::Result<Self> {
        let config = Self { figment: Self::base().merge(Toml::string(toml)) };
        config.pipeline()?;
        Ok(config)
    }

    fn base() -> Figment { Figment::from(Serialized::defaults(PipelineConfig::default())) }

    /// Typed pipeline configuration with paths expanded and values validated.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let mut config: PipelineConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to parse pipeline config: {}", e))?;
        config.paths = config.paths.expanded();
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub pipeline: PipelineSettings,
    pub training: TrainingConfig,
    pub paths: PathsConfig,
    pub admission: AdmissionConfig,
    pub search: SearchConfig,
    pub chunking: ChunkingConfig,
    pub commands: CommandsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub base_model: String,
    #[serde(alias = "arxiv_keywords")]
    pub keywords: Vec<String>,
    pub min_papers_threshold: usize,
    /// Regression-gate multiplier applied to the previous cycle's perplexity.
    pub perplexity_threshold: f64,
    pub harvest_limit: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            base_model: "gpt2".to_string(),
            keywords: vec!["large language models".to_string(), "LLM fine-tuning".to_string()],
            min_papers_threshold: 10,
            perplexity_threshold: 0.85,
            harvest_limit: 100,
        }
    }
}

/// Hyperparameters handed to the trainer. The only section a search proposal rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub batch_size: u32,
    pub training_epochs: u32,
}

impl Default for TrainingConfig {
    fn default() -> Self { Self { learning_rate: 1e-4, batch_size: 1, training_epochs: 1 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("./data"), model_dir: PathBuf::from("./models"), logs_dir: PathBuf::from("./logs") }
    }
}

impl PathsConfig {
    fn expanded(self) -> Self {
        let expand = |p: PathBuf| expand_path(p.to_string_lossy());
        Self { data_dir: expand(self.data_dir), model_dir: expand(self.model_dir), logs_dir: expand(self.logs_dir) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub min_chars: usize,
    /// Cosine similarity above which a document counts as a duplicate.
    pub duplicate_similarity: f32,
    pub min_keyword_density: f64,
}

impl Default for AdmissionConfig {
    fn default() -> Self { Self { min_chars: 300, duplicate_similarity: 0.95, min_keyword_density: 0.05 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub trials: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self { Self { trials: 20, seed: None } }
}

/// Argv prefixes of the subprocess trainer and scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub trainer: Vec<String>,
    pub scorer: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            trainer: vec!["python".to_string(), "scripts/train.py".to_string()],
            scorer: vec!["python".to_string(), "scripts/score.py".to_string()],
        }
    }
}

impl PipelineConfig {
    /// Overwrite the training hyperparameters with a search proposal. Nothing else changes.
    pub fn apply_proposal(&mut self, proposal: &SearchProposal) {
        self.training.learning_rate = proposal.learning_rate;
        self.training.batch_size = proposal.batch_size;
        self.training.training_epochs = proposal.training_epochs;
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));
        let p = &self.pipeline;
        if !p.perplexity_threshold.is_finite() || p.perplexity_threshold <= 0.0 {
            return invalid(format!("pipeline.perplexity_threshold must be > 0, got {}", p.perplexity_threshold));
        }
        if p.keywords.iter().all(|k| k.trim().is_empty()) {
            return invalid("pipeline.keywords must contain at least one keyword".to_string());
        }
        let t = &self.training;
        if !t.learning_rate.is_finite() || t.learning_rate <= 0.0 {
            return invalid(format!("training.learning_rate must be > 0, got {}", t.learning_rate));
        }
        if t.batch_size == 0 || t.training_epochs == 0 {
            return invalid("training.batch_size and training.training_epochs must be >= 1".to_string());
        }
        let a = &self.admission;
        if !a.duplicate_similarity.is_finite() || !a.min_keyword_density.is_finite() || a.min_keyword_density < 0.0 {
            return invalid("admission thresholds must be finite and non-negative".to_string());
        }
        if self.search.trials == 0 {
            return invalid("search.trials must be >= 1".to_string());
        }
        if self.chunking.max_tokens == 0 || !(0.0..1.0).contains(&self.chunking.overlap_percent) {
            return invalid("chunking.max_tokens must be >= 1 and overlap_percent in [0, 1)".to_string());
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
