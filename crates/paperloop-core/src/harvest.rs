//! Local-corpus harvester.
//!
//! Treats every `.txt` file under a directory as a downloaded document. An
//! optional `<stem>.json` sidecar next to it carries the descriptive fields
//! (`title`, `authors`, `date`, `url`, `abstract`); without one the file stem
//! is used as the title.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::traits::Harvester;
use crate::types::Document;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Sidecar {
    title: Option<String>,
    authors: Vec<String>,
    date: Option<DateTime<Utc>>,
    url: Option<String>,
    #[serde(rename = "abstract")]
    summary: String,
}

pub struct DirectoryHarvester {
    root: PathBuf,
}

impl DirectoryHarvester {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    fn load_document(&self, path: &Path) -> Result<(Document, String)> {
        let identifier = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let sidecar_path = path.with_extension("json");
        let sidecar: Sidecar = if sidecar_path.is_file() {
            serde_json::from_str(&fs::read_to_string(&sidecar_path)?)?
        } else {
            Sidecar::default()
        };
        let text = String::from_utf8_lossy(&fs::read(path)?).to_string();
        let doc = Document {
            title: sidecar.title.unwrap_or_else(|| identifier.clone()),
            authors: sidecar.authors,
            date: sidecar.date,
            source_url: sidecar.url.unwrap_or_else(|| format!("file://{}", path.display())),
            raw_location: path.to_path_buf(),
            summary: sidecar.summary,
            identifier,
        };
        Ok((doc, text))
    }

    fn list_txt_files(&self) -> Vec<PathBuf> {
        let mut txt_files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path(); if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
        }
        txt_files.sort(); txt_files
    }
}

impl Harvester for DirectoryHarvester {
    fn harvest(&self, keywords: &[String], limit: usize) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(crate::error::Error::NotFound(format!("data directory {}", self.root.display())).into());
        }
        let needles: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).filter(|k| !k.is_empty()).collect();
        let mut documents = Vec::new();
        for path in self.list_txt_files() {
            let (doc, text) = match self.load_document(&path) {
                Ok(loaded) => loaded,
                Err(e) => { warn!(path = %path.display(), error = %e, "failed to read document"); continue; }
            };
            let haystack = format!("{}\n{}\n{}", doc.title, doc.summary, text).to_lowercase();
            if needles.iter().any(|k| haystack.contains(k.as_str())) {
                documents.push(doc);
            } else {
                debug!(path = %path.display(), "no keyword match");
            }
        }
        // Newest first; undated documents last, in path order.
        documents.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.raw_location.cmp(&b.raw_location)));
        documents.truncate(limit);
        info!("Harvested {} documents from {}", documents.len(), self.root.display());
        Ok(documents)
    }
}
