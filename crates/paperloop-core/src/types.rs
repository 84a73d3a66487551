//! Domain types passed between the pipeline stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Error, Result};

/// A unit of harvested content.
///
/// - `identifier`: stable document identity (file stem or remote entry id)
/// - `source_url`: where the document was published
/// - `raw_location`: local path of the downloaded raw content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub identifier: String,
    pub title: String,
    pub authors: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub source_url: String,
    pub raw_location: PathBuf,
    #[serde(rename = "abstract")]
    pub summary: String,
}

/// Descriptive fields of a [`Document`], carried along with its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub identifier: String,
    pub title: String,
    pub authors: Vec<String>,
    pub date: Option<DateTime<Utc>>,
    pub source_url: String,
    #[serde(rename = "abstract")]
    pub summary: String,
}

impl From<&Document> for DocumentMetadata {
    fn from(doc: &Document) -> Self {
        Self {
            identifier: doc.identifier.clone(),
            title: doc.title.clone(),
            authors: doc.authors.clone(),
            date: doc.date,
            source_url: doc.source_url.clone(),
            summary: doc.summary.clone(),
        }
    }
}

/// A document after text extraction and chunking. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub metadata: DocumentMetadata,
    pub chunks: Vec<String>,
}

impl ProcessedDocument {
    pub fn new(metadata: DocumentMetadata, chunks: Vec<String>) -> Self { Self { metadata, chunks } }

    /// All chunks joined with a single space.
    pub fn text(&self) -> String { self.chunks.join(" ") }

    /// Total character count over all chunks (separators not included).
    pub fn char_len(&self) -> usize { self.chunks.iter().map(|c| c.chars().count()).sum() }
}

/// Quality scores for one completed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub perplexity: f64,
    pub bleu: f64,
    pub rouge: f64,
    pub accuracy: f64,
}

impl CycleMetrics {
    /// Check that `perplexity` is a finite non-negative number and the other
    /// scores lie in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !self.perplexity.is_finite() || self.perplexity < 0.0 {
            return Err(Error::InvalidMetrics(format!("perplexity must be finite and >= 0, got {}", self.perplexity)));
        }
        for (name, value) in [("bleu", self.bleu), ("rouge", self.rouge), ("accuracy", self.accuracy)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidMetrics(format!("{name} must be in [0, 1], got {value}")));
            }
        }
        Ok(())
    }
}

/// Best hyperparameters found by one search run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchProposal {
    pub learning_rate: f64,
    pub batch_size: u32,
    pub training_epochs: u32,
}

/// Flatten the chunks of `documents` into training texts.
///
/// Fails with [`Error::NoTrainingData`] when the concatenated text is empty.
pub fn training_texts(documents: &[ProcessedDocument]) -> Result<Vec<String>> {
    let texts: Vec<String> = documents.iter().flat_map(|d| d.chunks.iter().cloned()).collect();
    if texts.iter().all(|t| t.is_empty()) { return Err(Error::NoTrainingData); }
    Ok(texts)
}
