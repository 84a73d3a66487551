//! Content admission: decides which processed documents reach training.
//!
//! Each candidate goes through three rejecting checks, in order, stopping at
//! the first that fires:
//!
//! 1. length: total chunk characters below `min_chars`
//! 2. duplication: cosine similarity above `duplicate_similarity` against any
//!    fingerprint admitted earlier (in this call or a previous one)
//! 3. relevance: keyword occurrences per word below `min_keyword_density`
//!
//! The fingerprint list only grows, and only by accepted documents, so the
//! outcome depends on input order.

use anyhow::{ensure, Result};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

use paperloop_core::config::AdmissionConfig;
use paperloop_core::traits::Embedder;
use paperloop_core::types::ProcessedDocument;
use paperloop_embed::cosine_similarity;

/// Embedding fingerprints of every admitted document, in admission order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AdmissionState {
    fingerprints: Vec<Vec<f32>>,
}

impl AdmissionState {
    pub fn len(&self) -> usize { self.fingerprints.len() }
    pub fn is_empty(&self) -> bool { self.fingerprints.is_empty() }
    pub fn fingerprints(&self) -> &[Vec<f32>] { &self.fingerprints }

    /// First stored fingerprint whose similarity to `embedding` exceeds `threshold`.
    fn find_duplicate(&self, embedding: &[f32], threshold: f32) -> Result<Option<f32>> {
        for fp in &self.fingerprints {
            ensure!(fp.len() == embedding.len(), "embedding dim {} does not match stored fingerprint dim {}", embedding.len(), fp.len());
            let sim = cosine_similarity(fp, embedding);
            if sim > threshold { return Ok(Some(sim)); }
        }
        Ok(None)
    }

    fn record(&mut self, embedding: Vec<f32>) { self.fingerprints.push(embedding); }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    TooShort { chars: usize },
    Duplicate { similarity: f32 },
    Irrelevant { density: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort { chars } => write!(f, "insufficient length ({chars} chars)"),
            Rejection::Duplicate { similarity } => write!(f, "duplication (similarity {similarity:.3})"),
            Rejection::Irrelevant { density } => write!(f, "low relevance (keyword density {density:.4})"),
        }
    }
}

enum Verdict {
    Accept(Vec<f32>),
    Reject(Rejection),
}

pub struct AdmissionFilter {
    embedder: Box<dyn Embedder>,
    keywords: Vec<String>,
    config: AdmissionConfig,
    state: AdmissionState,
}

impl AdmissionFilter {
    pub fn new(embedder: Box<dyn Embedder>, keywords: &[String], config: AdmissionConfig) -> Self {
        let keywords: BTreeSet<String> = keywords.iter().map(|k| k.to_lowercase()).filter(|k| !k.is_empty()).collect();
        Self { embedder, keywords: keywords.into_iter().collect(), config, state: AdmissionState::default() }
    }

    pub fn state(&self) -> &AdmissionState { &self.state }
    pub fn fingerprint_count(&self) -> usize { self.state.len() }
    pub fn keywords(&self) -> &[String] { &self.keywords }

    /// Admit documents in input order; accepted ones are returned in the same relative order.
    pub fn filter(&mut self, documents: Vec<ProcessedDocument>) -> Result<Vec<ProcessedDocument>> {
        let total = documents.len();
        let mut accepted = Vec::new();
        for doc in documents {
            match self.admit(&doc)? {
                None => accepted.push(doc),
                Some(reason) => warn!(title = %doc.metadata.title, "Discarded document due to {reason}"),
            }
        }
        info!("Admitted {} out of {} documents ({} fingerprints held)", accepted.len(), total, self.state.len());
        Ok(accepted)
    }

    /// Judge one document and remember its fingerprint if accepted.
    pub fn admit(&mut self, doc: &ProcessedDocument) -> Result<Option<Rejection>> {
        Ok(match self.evaluate(doc)? {
            Verdict::Accept(embedding) => {
                self.state.record(embedding);
                None
            }
            Verdict::Reject(reason) => Some(reason),
        })
    }

    /// Why `doc` would be rejected right now, without recording anything.
    pub fn check(&self, doc: &ProcessedDocument) -> Result<Option<Rejection>> {
        Ok(match self.evaluate(doc)? { Verdict::Accept(_) => None, Verdict::Reject(r) => Some(r) })
    }

    fn evaluate(&self, doc: &ProcessedDocument) -> Result<Verdict> {
        let chars = doc.char_len();
        if chars < self.config.min_chars { return Ok(Verdict::Reject(Rejection::TooShort { chars })); }

        let text = doc.text();
        let embedding = self.embedder.embed(&text)?;
        if let Some(similarity) = self.state.find_duplicate(&embedding, self.config.duplicate_similarity)? {
            return Ok(Verdict::Reject(Rejection::Duplicate { similarity }));
        }

        let density = keyword_density(&text, &self.keywords);
        if density < self.config.min_keyword_density { return Ok(Verdict::Reject(Rejection::Irrelevant { density })); }

        Ok(Verdict::Accept(embedding))
    }
}

/// Case-insensitive, non-overlapping keyword occurrences divided by the
/// whitespace word count. `keywords` must already be lower-case. Zero words
/// yields `0.0`.
pub fn keyword_density(text: &str, keywords: &[String]) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 { return 0.0; }
    let lower = text.to_lowercase();
    let hits: usize = keywords.iter().filter(|k| !k.is_empty()).map(|k| lower.matches(k.as_str()).count()).sum();
    hits as f64 / words as f64
}
