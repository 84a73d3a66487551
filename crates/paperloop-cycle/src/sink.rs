use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use paperloop_core::traits::MetricsSink;
use paperloop_core::types::CycleMetrics;

/// Writes each cycle's metrics to `<logs_dir>/cycle_<YYYYmmdd_HHMMSS>.json`.
pub struct JsonMetricsSink {
    logs_dir: PathBuf,
}

impl JsonMetricsSink {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self { Self { logs_dir: logs_dir.into() } }

    pub fn record_path(&self, timestamp: DateTime<Local>) -> PathBuf {
        self.logs_dir.join(format!("cycle_{}.json", timestamp.format("%Y%m%d_%H%M%S")))
    }
}

impl MetricsSink for JsonMetricsSink {
    fn record(&self, metrics: &CycleMetrics, timestamp: DateTime<Local>) -> Result<PathBuf> {
        fs::create_dir_all(&self.logs_dir).with_context(|| format!("creating {}", self.logs_dir.display()))?;
        let path = self.record_path(timestamp);
        fs::write(&path, serde_json::to_string_pretty(metrics)?).with_context(|| format!("writing {}", path.display()))?;
        info!("Metrics logged to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn writes_pretty_json_named_by_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonMetricsSink::new(dir.path().join("logs"));
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let metrics = CycleMetrics { perplexity: 1.25, bleu: 0.5, rouge: 0.25, accuracy: 0.75 };

        let path = sink.record(&metrics, ts).unwrap();
        assert_eq!(path.file_name().unwrap(), "cycle_20240309_140507.json");
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains('\n'), "pretty printed");
        let back: CycleMetrics = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, metrics);
    }
}
