use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use paperloop_admit::{AdmissionFilter, Rejection};
use paperloop_core::config::AdmissionConfig;
use paperloop_core::traits::Embedder;
use paperloop_core::types::{DocumentMetadata, ProcessedDocument};

/// Returns a fresh one-hot vector on every call, so nothing is ever a duplicate.
struct OrthogonalEmbedder { next: AtomicUsize }

impl Embedder for OrthogonalEmbedder {
    fn dim(&self) -> usize { 64 }
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0; 64];
        v[self.next.fetch_add(1, Ordering::SeqCst) % 64] = 1.0;
        Ok(v)
    }
}

/// Looks vectors up by exact text.
struct TableEmbedder { table: HashMap<String, Vec<f32>> }

impl Embedder for TableEmbedder {
    fn dim(&self) -> usize { 3 }
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.table.get(text).cloned().ok_or_else(|| anyhow::anyhow!("no vector for text"))
    }
}

fn doc(title: &str, chunks: &[&str]) -> ProcessedDocument {
    let metadata = DocumentMetadata {
        identifier: title.to_string(),
        title: title.to_string(),
        authors: vec![],
        date: None,
        source_url: String::new(),
        summary: String::new(),
    };
    ProcessedDocument::new(metadata, chunks.iter().map(|c| c.to_string()).collect())
}

fn orthogonal_filter(keywords: &[&str]) -> AdmissionFilter {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
    AdmissionFilter::new(Box::new(OrthogonalEmbedder { next: AtomicUsize::new(0) }), &keywords, AdmissionConfig::default())
}

/// `n` words of filler that never contain a keyword, 8 chars each.
fn filler(n: usize) -> Vec<&'static str> { vec!["abcdefgh"; n] }

#[test]
fn length_boundary_299_rejected_300_not() {
    let mut f = orthogonal_filter(&["llm"]);
    let short = format!("{}llm", "llm ".repeat(74));
    let exact = format!("{}llm!", "llm ".repeat(74));
    assert_eq!(short.chars().count(), 299);
    assert_eq!(exact.chars().count(), 300);

    assert_eq!(f.check(&doc("short", &[&short])).unwrap(), Some(Rejection::TooShort { chars: 299 }));
    assert_eq!(f.check(&doc("exact", &[&exact])).unwrap(), None);

    let accepted = f.filter(vec![doc("short", &[&short]), doc("exact", &[&exact])]).unwrap();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].metadata.title, "exact");
}

#[test]
fn length_sums_all_chunks() {
    let mut f = orthogonal_filter(&["llm"]);
    let half = "llm ".repeat(38); // 152 chars
    let accepted = f.filter(vec![doc("split", &[&half, &half])]).unwrap();
    assert_eq!(accepted.len(), 1, "two 152-char chunks add up to 304");
}

#[test]
fn relevance_boundary_exact_density_is_accepted() {
    let mut f = orthogonal_filter(&["Transformer"]);
    let mut words = vec!["transformer", "transformer"];
    words.extend(filler(38));
    let at_threshold = words.join(" ");
    let mut words = vec!["transformer"];
    words.extend(filler(39));
    let below = words.join(" ");
    assert!(at_threshold.chars().count() >= 300 && below.chars().count() >= 300);

    assert_eq!(f.check(&doc("at", &[&at_threshold])).unwrap(), None, "2/40 == 0.05 passes");
    assert!(matches!(f.check(&doc("below", &[&below])).unwrap(), Some(Rejection::Irrelevant { .. })));
}

fn near_duplicates() -> (String, String, TableEmbedder) {
    let a = format!("llm {}", filler(40).join(" "));
    let b = format!("llm llm {}", filler(39).join(" "));
    let mut table = HashMap::new();
    table.insert(a.clone(), vec![1.0, 0.0, 0.0]);
    // cos(a, b) = 0.97
    table.insert(b.clone(), vec![0.97, (1.0f32 - 0.97 * 0.97).sqrt(), 0.0]);
    (a, b, TableEmbedder { table })
}

fn table_filter(embedder: TableEmbedder) -> AdmissionFilter {
    let config = AdmissionConfig { min_keyword_density: 0.0, ..AdmissionConfig::default() };
    AdmissionFilter::new(Box::new(embedder), &["llm".to_string()], config)
}

#[test]
fn dedup_is_order_sensitive() {
    let (a, b, embedder) = near_duplicates();
    let mut f = table_filter(embedder);
    let out = f.filter(vec![doc("A", &[&a]), doc("B", &[&b])]).unwrap();
    let titles: Vec<&str> = out.iter().map(|d| d.metadata.title.as_str()).collect();
    assert_eq!(titles, vec!["A"]);

    let (a, b, embedder) = near_duplicates();
    let mut f = table_filter(embedder);
    let out = f.filter(vec![doc("B", &[&b]), doc("A", &[&a])]).unwrap();
    let titles: Vec<&str> = out.iter().map(|d| d.metadata.title.as_str()).collect();
    assert_eq!(titles, vec!["B"]);
}

#[test]
fn fingerprints_carry_across_calls_and_only_grow_on_accept() {
    let (a, b, embedder) = near_duplicates();
    let mut f = table_filter(embedder);
    assert_eq!(f.filter(vec![doc("A", &[&a])]).unwrap().len(), 1);
    assert_eq!(f.fingerprint_count(), 1);

    let out = f.filter(vec![doc("B", &[&b]), doc("tiny", &["llm"])]).unwrap();
    assert!(out.is_empty(), "B duplicates A from the previous call");
    assert_eq!(f.fingerprint_count(), 1, "rejections record nothing");
    assert_eq!(f.state().fingerprints()[0], vec![1.0, 0.0, 0.0]);
}

#[test]
fn accepted_documents_keep_input_order() {
    let mut f = orthogonal_filter(&["llm"]);
    let text = "llm ".repeat(80);
    let docs = vec![doc("one", &[&text]), doc("two", &["llm"]), doc("three", &[&text])];
    let titles: Vec<String> = f.filter(docs).unwrap().into_iter().map(|d| d.metadata.title).collect();
    assert_eq!(titles, vec!["one".to_string(), "three".to_string()]);
    assert_eq!(f.fingerprint_count(), 2);
}

#[test]
fn short_documents_are_never_embedded() {
    // The table embedder errors on unknown text; a too-short document must not reach it.
    let (_, _, embedder) = near_duplicates();
    let mut f = table_filter(embedder);
    assert!(f.filter(vec![doc("tiny", &["llm"])]).unwrap().is_empty());
}

#[test]
fn embedder_failure_propagates() {
    let (_, _, embedder) = near_duplicates();
    let mut f = table_filter(embedder);
    let unknown = "llm ".repeat(100);
    assert!(f.filter(vec![doc("unknown", &[&unknown])]).is_err());
}

#[test]
fn admit_records_only_accepted_documents() {
    let mut f = orthogonal_filter(&["llm"]);
    let good = "llm ".repeat(80);
    assert_eq!(f.admit(&doc("short", &["llm"])).unwrap(), Some(Rejection::TooShort { chars: 3 }));
    assert_eq!(f.fingerprint_count(), 0);
    assert_eq!(f.admit(&doc("good", &[&good])).unwrap(), None);
    assert_eq!(f.fingerprint_count(), 1);
}

#[test]
fn keywords_are_lowercased_and_deduplicated() {
    let f = orthogonal_filter(&["LLM", "llm", "", "Fine-Tuning"]);
    assert_eq!(f.keywords(), &["fine-tuning".to_string(), "llm".to_string()]);
}
