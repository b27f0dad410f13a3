//! Result types written by the `train` and `test` subcommands.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tabnet::{EvaluationReport, TrainingSummary};

/// Results of evaluating a saved model on one labelled file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Path to the model file.
    pub model: String,
    /// Path to the evaluated CSV file.
    pub input: String,
    /// Rows dropped while encoding the input.
    pub rejected_records: usize,
    /// Metrics over the accepted rows.
    pub report: EvaluationReport,
}

/// Results of a training run, with the optional held-out evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResult {
    pub model: String,
    pub train_file: String,
    pub records: usize,
    pub rejected_records: usize,
    pub summary: TrainingSummary,
    #[serde(default)]
    pub evaluation: Option<EvaluationResult>,
}

/// Write `value` as pretty-printed JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote results");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabnet::evaluation::RegressionReport;

    #[test]
    fn test_evaluation_result_serde_roundtrip() {
        let result = EvaluationResult {
            model: "model.bin".to_string(),
            input: "test.csv".to_string(),
            rejected_records: 2,
            report: EvaluationReport::Regression(RegressionReport {
                records: 10,
                r_squared: 0.75,
                loss: 0.25,
            }),
        };

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("out/results.json");
        write_json(&path, &result).unwrap();

        let loaded: EvaluationResult =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.rejected_records, 2);
        assert_eq!(loaded.report, result.report);
    }

    #[test]
    fn test_train_result_without_evaluation() {
        let json = r#"{
            "model": "m.bin",
            "train_file": "train.csv",
            "records": 100,
            "rejected_records": 0,
            "summary": {"epochs": 1, "batches": 7, "final_epoch": null, "elapsed_secs": 0.5}
        }"#;
        let result: TrainResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.summary.batches, 7);
        assert!(result.evaluation.is_none());
    }
}
