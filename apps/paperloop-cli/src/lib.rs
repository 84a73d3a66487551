//! Shared startup for the `paperloop` binaries.

use std::path::Path;

use paperloop_core::config::{Config, PipelineConfig};
use paperloop_cycle::CycleState;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise everything at `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

/// An explicit `--config` file, or the `config.toml` + `RUST_ENV` layering.
pub fn load_pipeline_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(p) => Config::from_file(p),
        None => Config::load(),
    }
    .map_err(|e| {
        eprintln!("Error loading config: {e}");
        e
    })?;
    config.pipeline()
}

/// Value following a flag, or exit with a usage error.
pub fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(v) => v.as_str(),
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(2);
        }
    }
}

/// Persist `state`; a failed write is logged and the scheduler keeps running.
pub fn save_state(state: &CycleState, path: &Path) -> bool {
    match state.save(path) {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to save cycle state: {e:?}");
            false
        }
    }
}
