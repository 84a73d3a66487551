//! Contracts of the external collaborators the cycle drives.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::types::{CycleMetrics, Document, ProcessedDocument};

pub trait Harvester: Send + Sync {
    fn harvest(&self, keywords: &[String], limit: usize) -> anyhow::Result<Vec<Document>>;
}

pub trait Preprocessor: Send + Sync {
    fn process(&self, documents: &[Document]) -> anyhow::Result<Vec<ProcessedDocument>>;
}

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Fine-tunes the base model and returns the location of the result.
pub trait Trainer: Send + Sync {
    fn fine_tune(&self, documents: &[ProcessedDocument], config: &PipelineConfig) -> anyhow::Result<PathBuf>;
}

pub trait Scorer: Send + Sync {
    fn score(&self, model: &Path, held_out: &[String]) -> anyhow::Result<CycleMetrics>;
}

/// Durable record of a completed cycle. Returns where the record was written.
pub trait MetricsSink: Send + Sync {
    fn record(&self, metrics: &CycleMetrics, timestamp: DateTime<Local>) -> anyhow::Result<PathBuf>;
}
