use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::traits::Preprocessor;
use crate::types::{Document, DocumentMetadata, ProcessedDocument};

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.*?\]").expect("valid citation regex"));
static FIGURE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Figure \d+.*?\n").expect("valid figure regex"));
static EQUATION_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"Equation \d+.*?\n").expect("valid equation regex"));
static BIBLIOGRAPHY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)References.*$").expect("valid bibliography regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 512, overlap_percent: 0.0 }
    }
}

/// Reads the raw text of each harvested document, strips citation and
/// figure noise, and packs paragraphs into chunks of at most
/// `max_tokens` estimated tokens.
#[derive(Default)]
pub struct TextPreprocessor {
    chunking_config: ChunkingConfig,
}

impl TextPreprocessor {
    pub fn new(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn process_document(&self, doc: &Document) -> Result<ProcessedDocument> {
        let content = self.read_file_content(&doc.raw_location)?;
        let cleaned = clean_text(&content);
        Ok(ProcessedDocument::new(DocumentMetadata::from(doc), self.chunk_content(&cleaned)))
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    pub fn chunk_content(&self, content: &str) -> Vec<String> {
        let max_tokens = self.chunking_config.max_tokens.max(1);
        let mut chunks = Vec::new();
        let mut current = String::new();
        for paragraph in content.split("\n\n") {
            let paragraph = paragraph.trim(); if paragraph.is_empty() { continue; }
            if count_tokens(paragraph) > max_tokens {
                if !current.is_empty() { chunks.push(std::mem::take(&mut current)); }
                chunks.extend(self.split_paragraph_with_overlap(paragraph));
                continue;
            }
            if !current.is_empty() && count_tokens(&current) + count_tokens(paragraph) > max_tokens {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() { current.push_str("\n\n"); }
            current.push_str(paragraph);
        }
        if !current.is_empty() { chunks.push(current); }
        chunks
    }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = ((self.chunking_config.max_tokens as f32 * 0.75) as usize).max(1);
        let overlap_words = ((words_per_chunk as f32 * self.chunking_config.overlap_percent) as usize).min(words_per_chunk - 1);
        let mut chunks = Vec::new(); let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }
}

impl Preprocessor for TextPreprocessor {
    fn process(&self, documents: &[Document]) -> Result<Vec<ProcessedDocument>> {
        let mut processed = Vec::with_capacity(documents.len());
        for doc in documents {
            match self.process_document(doc) {
                Ok(p) => processed.push(p),
                Err(e) => warn!(title = %doc.title, error = %e, "failed to preprocess document"),
            }
        }
        info!("Preprocessed {} of {} documents", processed.len(), documents.len());
        Ok(processed)
    }
}

/// Drop bracketed citations, figure and equation caption lines, and
/// everything from the bibliography onward.
pub fn clean_text(text: &str) -> String {
    let text = CITATION.replace_all(text, "");
    let text = FIGURE_LINE.replace_all(&text, "");
    let text = EQUATION_LINE.replace_all(&text, "");
    BIBLIOGRAPHY.replace(&text, "").into_owned()
}

/// Rough token estimate: one token per 0.75 words.
fn count_tokens(text: &str) -> usize { let word_count = text.split_whitespace().count(); (word_count as f32 / 0.75) as usize }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_strips_noise() {
        let raw = "Intro [12] text.\nFigure 3: a plot\nBody.\nEquation 1 here\nMore.\nReferences\n[1] Someone";
        assert_eq!(clean_text(raw), "Intro  text.\nBody.\nMore.\n");
    }

    #[test]
    fn small_paragraphs_pack_into_one_chunk() {
        let p = TextPreprocessor::default();
        let chunks = p.chunk_content("alpha bravo\n\ncharlie delta\n\n\n\necho");
        assert_eq!(chunks, vec!["alpha bravo\n\ncharlie delta\n\necho".to_string()]);
    }

    #[test]
    fn long_paragraph_is_split_by_word_budget() {
        let p = TextPreprocessor::new(ChunkingConfig { max_tokens: 4, overlap_percent: 0.0 });
        // 4 tokens -> 3 words per chunk
        let chunks = p.chunk_content("a b c d e f g");
        assert_eq!(chunks, vec!["a b c", "d e f", "g"]);
    }

    #[test]
    fn overlap_repeats_trailing_words() {
        let p = TextPreprocessor::new(ChunkingConfig { max_tokens: 8, overlap_percent: 0.5 });
        // 6 words per chunk, 3 overlap
        let chunks = p.chunk_content("w1 w2 w3 w4 w5 w6 w7 w8 w9");
        assert_eq!(chunks, vec!["w1 w2 w3 w4 w5 w6", "w4 w5 w6 w7 w8 w9"]);
    }
}
