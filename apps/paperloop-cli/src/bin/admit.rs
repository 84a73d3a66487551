use std::env;
use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use paperloop_admit::AdmissionFilter;
use paperloop_cli::{flag_value, init_tracing, load_pipeline_config};
use paperloop_core::data_processor::TextPreprocessor;
use paperloop_core::harvest::DirectoryHarvester;
use paperloop_core::traits::{Harvester, Preprocessor};
use paperloop_embed::get_default_embedder;

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = None;
    let mut data_dir = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => { config_path = Some(PathBuf::from(flag_value(&args, i, "--config"))); i += 1; }
            a if !a.starts_with('-') => data_dir = Some(PathBuf::from(a)),
            other => { eprintln!("Unknown argument: {other}\nUsage: paperloop-admit [--config PATH] [DATA_DIR]"); std::process::exit(2); }
        }
        i += 1;
    }

    let config = load_pipeline_config(config_path.as_deref())?;
    let data_dir = data_dir.unwrap_or_else(|| config.paths.data_dir.clone());
    println!("Admission dry run\n=================");
    println!("Data directory: {}", data_dir.display());

    let documents = DirectoryHarvester::new(&data_dir).harvest(&config.pipeline.keywords, config.pipeline.harvest_limit)?;
    let processed = TextPreprocessor::new(config.chunking.clone()).process(&documents)?;
    let mut filter = AdmissionFilter::new(get_default_embedder()?, &config.pipeline.keywords, config.admission.clone());

    let pb = ProgressBar::new(processed.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?.progress_chars("#>-"));
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for doc in &processed {
        match filter.admit(doc)? {
            None => accepted.push(doc.metadata.title.clone()),
            Some(reason) => rejected.push((doc.metadata.title.clone(), reason)),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    for title in &accepted { println!("  + {title}"); }
    for (title, reason) in &rejected { println!("  - {title}: {reason}"); }
    println!("\nHarvested {} | processed {} | admitted {} | rejected {}", documents.len(), processed.len(), accepted.len(), rejected.len());
    Ok(())
}
