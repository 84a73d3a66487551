use std::env;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use paperloop_cli::{flag_value, init_tracing, load_pipeline_config, save_state};
use paperloop_core::data_processor::TextPreprocessor;
use paperloop_core::harvest::DirectoryHarvester;
use paperloop_cycle::external::{CommandScorer, CommandTrainer};
use paperloop_cycle::sink::JsonMetricsSink;
use paperloop_cycle::{Collaborators, CycleController, CycleOutcome, CycleState, SkipReason};
use paperloop_embed::get_default_embedder;
use tracing::error;

const USAGE: &str = "Usage: paperloop [--config PATH] [--cycles N] [--interval-secs S] [--state PATH]";

struct Args {
    config: Option<PathBuf>,
    cycles: u64,
    interval: Duration,
    state: Option<PathBuf>,
}

fn parse_number(args: &[String], i: usize, flag: &str) -> u64 {
    flag_value(args, i, flag).parse().unwrap_or_else(|_| {
        eprintln!("Error: {flag} requires a non-negative number");
        std::process::exit(2)
    })
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut parsed = Args { config: None, cycles: 1, interval: Duration::from_secs(3600), state: None };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => { parsed.config = Some(PathBuf::from(flag_value(&args, i, "--config"))); i += 1; }
            "--cycles" | "-n" => { parsed.cycles = parse_number(&args, i, "--cycles"); i += 1; }
            "--interval-secs" => { parsed.interval = Duration::from_secs(parse_number(&args, i, "--interval-secs")); i += 1; }
            "--state" => { parsed.state = Some(PathBuf::from(flag_value(&args, i, "--state"))); i += 1; }
            "--help" | "-h" => { println!("{USAGE}"); std::process::exit(0); }
            other => { eprintln!("Unknown argument: {other}\n{USAGE}"); std::process::exit(2); }
        }
        i += 1;
    }
    parsed
}

fn print_outcome(n: u64, outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Skipped(SkipReason::InsufficientDocuments { found, required }) => {
            println!("Cycle {n}: skipped, {found} documents harvested (need {required})");
        }
        CycleOutcome::Skipped(SkipReason::NothingAdmitted { candidates }) => {
            println!("Cycle {n}: skipped, none of {candidates} documents admitted");
        }
        CycleOutcome::Completed(report) => {
            let m = &report.metrics;
            println!("Cycle {n}: trained on {} documents -> {}", report.admitted, report.model.display());
            println!("  perplexity {:.4}  bleu {:.4}  rouge {:.4}  accuracy {:.4}", m.perplexity, m.bleu, m.rouge, m.accuracy);
            if let Some(p) = &report.proposal {
                println!("  regression: next cycle uses lr {:.2e}, batch {}, epochs {}", p.learning_rate, p.batch_size, p.training_epochs);
            }
            println!("  metrics written to {}", report.record.display());
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = parse_args();
    let config = load_pipeline_config(args.config.as_deref())?;

    let state = match &args.state {
        Some(path) if path.is_file() => CycleState::resume(config.clone(), path)?,
        _ => CycleState::new(config.clone()),
    };
    let stages = Collaborators {
        harvester: Box::new(DirectoryHarvester::new(&config.paths.data_dir)),
        preprocessor: Box::new(TextPreprocessor::new(config.chunking.clone())),
        trainer: Box::new(CommandTrainer::from_config(&config)?),
        scorer: Box::new(CommandScorer::new(&config.commands.scorer)?),
        sink: Box::new(JsonMetricsSink::new(&config.paths.logs_dir)),
    };
    let mut controller = CycleController::from_state(state, get_default_embedder()?, stages);

    let mut n = 0u64;
    loop {
        n += 1;
        // failures end this cycle only; the loop keeps going
        match controller.try_run_cycle() {
            Ok(outcome) => print_outcome(n, &outcome),
            Err(e) => {
                error!("Cycle failed: {e:?}");
                println!("Cycle {n}: failed ({e})");
            }
        }
        if let Some(path) = &args.state {
            save_state(controller.state(), path);
        }
        if args.cycles != 0 && n >= args.cycles { break; }
        thread::sleep(args.interval);
    }
    Ok(())
}
