//! Trainer and scorer that shell out to user-supplied commands.
//!
//! Both take an argv prefix from `[commands]` and append their own flags:
//!
//! ```text
//! <trainer...> --dataset <jsonl> --output <dir> --base-model <name>
//!              --learning-rate <f> --batch-size <n> --epochs <n>
//! <scorer...>  --model <dir> --texts <jsonl>
//! ```
//!
//! Datasets are JSON lines of `{"text": "..."}`. The scorer must print one
//! JSON object with `perplexity`, `bleu`, `rouge` and `accuracy` on stdout.

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::json;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::{debug, info};

use paperloop_core::config::PipelineConfig;
use paperloop_core::error::Error;
use paperloop_core::traits::{Scorer, Trainer};
use paperloop_core::types::{training_texts, CycleMetrics, ProcessedDocument};

fn write_jsonl<W: Write>(out: W, texts: &[String]) -> Result<()> {
    let mut out = BufWriter::new(out);
    for text in texts {
        serde_json::to_writer(&mut out, &json!({ "text": text }))?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn split_argv(argv: &[String], role: &str) -> Result<(String, Vec<String>), Error> {
    match argv.split_first() {
        Some((program, rest)) if !program.trim().is_empty() => Ok((program.clone(), rest.to_vec())),
        _ => Err(Error::InvalidConfig(format!("commands.{role} must name a program"))),
    }
}

fn run(program: &str, args: &[String]) -> Result<Output> {
    debug!(program, ?args, "spawning");
    let output = Command::new(program).args(args).output().map_err(|e| Error::External { command: program.to_string(), detail: e.to_string() })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::External { command: program.to_string(), detail: format!("{}: {}", output.status, stderr.trim()) }.into());
    }
    Ok(output)
}

pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    model_dir: PathBuf,
}

impl CommandTrainer {
    pub fn new(argv: &[String], model_dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let (program, args) = split_argv(argv, "trainer")?;
        Ok(Self { program, args, model_dir: model_dir.into() })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, Error> {
        Self::new(&config.commands.trainer, &config.paths.model_dir)
    }
}

impl Trainer for CommandTrainer {
    fn fine_tune(&self, documents: &[ProcessedDocument], config: &PipelineConfig) -> Result<PathBuf> {
        let texts = training_texts(documents)?;
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        fs::create_dir_all(&self.model_dir).with_context(|| format!("creating {}", self.model_dir.display()))?;

        let dataset = self.model_dir.join(format!("dataset_{stamp}.jsonl"));
        write_jsonl(fs::File::create(&dataset)?, &texts).with_context(|| format!("writing {}", dataset.display()))?;
        let output_dir = self.model_dir.join(format!("fine_tuned_{stamp}"));

        let t = &config.training;
        let mut args = self.args.clone();
        args.extend([
            "--dataset".to_string(),
            dataset.display().to_string(),
            "--output".to_string(),
            output_dir.display().to_string(),
            "--base-model".to_string(),
            config.pipeline.base_model.clone(),
            "--learning-rate".to_string(),
            t.learning_rate.to_string(),
            "--batch-size".to_string(),
            t.batch_size.to_string(),
            "--epochs".to_string(),
            t.training_epochs.to_string(),
        ]);
        info!(texts = texts.len(), learning_rate = t.learning_rate, batch_size = t.batch_size, epochs = t.training_epochs, "Starting fine-tuning");
        run(&self.program, &args)?;
        info!("Model fine-tuned and saved to {}", output_dir.display());
        Ok(output_dir)
    }
}

pub struct CommandScorer {
    program: String,
    args: Vec<String>,
}

impl CommandScorer {
    pub fn new(argv: &[String]) -> Result<Self, Error> {
        let (program, args) = split_argv(argv, "scorer")?;
        Ok(Self { program, args })
    }
}

impl Scorer for CommandScorer {
    fn score(&self, model: &Path, held_out: &[String]) -> Result<CycleMetrics> {
        if held_out.is_empty() { return Err(Error::NoEvaluationData.into()); }
        let texts = tempfile::Builder::new().prefix("held_out_").suffix(".jsonl").tempfile()?;
        write_jsonl(texts.as_file(), held_out)?;

        let mut args = self.args.clone();
        args.extend(["--model".to_string(), model.display().to_string(), "--texts".to_string(), texts.path().display().to_string()]);
        let output = run(&self.program, &args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let metrics: CycleMetrics = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::InvalidMetrics(format!("scorer output is not a metrics object: {e}")))?;
        Ok(metrics)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use paperloop_core::types::DocumentMetadata;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into(), "stage".into()]
    }

    fn doc(text: &str) -> ProcessedDocument {
        let metadata = DocumentMetadata { identifier: "d".into(), title: "d".into(), authors: vec![], date: None, source_url: String::new(), summary: String::new() };
        ProcessedDocument::new(metadata, vec![text.to_string()])
    }

    #[test]
    fn trainer_passes_dataset_and_hyperparameters() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("argv.txt");
        // $2 is the dataset, $4 the output dir
        let script = format!("echo \"$@\" > {} && test -s \"$2\" && mkdir -p \"$4\"", log.display());
        let trainer = CommandTrainer::new(&sh(&script), dir.path().join("models")).unwrap();
        let config = PipelineConfig::default();

        let out = trainer.fine_tune(&[doc("hello world")], &config).unwrap();
        assert!(out.is_dir());
        assert!(out.file_name().unwrap().to_string_lossy().starts_with("fine_tuned_"));
        let argv = fs::read_to_string(&log).unwrap();
        assert!(argv.contains("--base-model gpt2"));
        assert!(argv.contains("--learning-rate 0.0001 --batch-size 1 --epochs 1"));
    }

    #[test]
    fn trainer_rejects_empty_text_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = CommandTrainer::new(&sh("exit 1"), dir.path()).unwrap();
        let err = trainer.fine_tune(&[doc("")], &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoTrainingData)));
    }

    #[test]
    fn failing_command_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = CommandTrainer::new(&sh("echo out of memory >&2; exit 3"), dir.path()).unwrap();
        let err = trainer.fine_tune(&[doc("text")], &PipelineConfig::default()).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::External { detail, .. }) => assert!(detail.contains("out of memory"), "{detail}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn scorer_parses_stdout_metrics() {
        let scorer = CommandScorer::new(&sh(r#"test -s "$4" && echo '{"perplexity": 1.7, "bleu": 0.3, "rouge": 0.4, "accuracy": 0.8}'"#)).unwrap();
        let m = scorer.score(Path::new("model"), &["held out".to_string()]).unwrap();
        assert_eq!(m, CycleMetrics { perplexity: 1.7, bleu: 0.3, rouge: 0.4, accuracy: 0.8 });
    }

    #[test]
    fn scorer_needs_held_out_texts() {
        let scorer = CommandScorer::new(&sh("exit 0")).unwrap();
        let err = scorer.score(Path::new("model"), &[]).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoEvaluationData)));
    }

    #[test]
    fn scorer_rejects_garbage_output() {
        let scorer = CommandScorer::new(&sh("echo not json")).unwrap();
        let err = scorer.score(Path::new("model"), &["x".to_string()]).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::InvalidMetrics(_))));
    }

    #[test]
    fn empty_argv_is_a_config_error() {
        assert!(matches!(CommandScorer::new(&[]), Err(Error::InvalidConfig(_))));
    }
}
