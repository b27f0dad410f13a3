//! CSV writers for per-record predictions and attention masks.

use csv::Writer;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Writes one prediction row per evaluated record.
///
/// Classification rows are `label,predicted,probability`, regression rows
/// are `label,prediction`.
pub struct PredictionWriter {
    writer: Writer<File>,
    path: PathBuf,
    rows: usize,
}

impl PredictionWriter {
    /// Create the file and write the classification header.
    pub fn classification(path: &Path) -> csv::Result<Self> {
        Self::create(path, &["label", "predicted", "probability"])
    }

    /// Create the file and write the regression header.
    pub fn regression(path: &Path) -> csv::Result<Self> {
        Self::create(path, &["label", "prediction"])
    }

    fn create(path: &Path, header: &[&str]) -> csv::Result<Self> {
        let mut writer = Writer::from_path(path)?;
        writer.write_record(header)?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            rows: 0,
        })
    }

    pub fn write_class(&mut self, label: &str, predicted: &str, probability: f64) -> csv::Result<()> {
        let probability = format!("{probability:.5}");
        self.writer
            .write_record([label, predicted, probability.as_str()])?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_value(&mut self, label: f64, prediction: f64) -> csv::Result<()> {
        self.writer
            .write_record([format!("{label:.5}"), format!("{prediction:.5}")])?;
        self.rows += 1;
        Ok(())
    }

    /// Flush the file and return its path.
    pub fn finish(mut self) -> csv::Result<PathBuf> {
        self.writer.flush()?;
        tracing::info!(rows = self.rows, path = %self.path.display(), "Wrote predictions");
        Ok(self.path)
    }
}

/// Writes `line,step,<feature columns...>` rows, one per decision step that
/// produced a mask, for every evaluated record.
pub struct AttentionWriter {
    writer: Writer<File>,
    path: PathBuf,
    num_features: usize,
    rows: usize,
}

impl AttentionWriter {
    /// Create the file and write the header with `feature_names` in model
    /// input order.
    pub fn create(path: &Path, feature_names: &[&str]) -> csv::Result<Self> {
        let mut writer = Writer::from_path(path)?;
        let mut header = vec!["line", "step"];
        header.extend_from_slice(feature_names);
        writer.write_record(&header)?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            num_features: feature_names.len(),
            rows: 0,
        })
    }

    /// Write the masks of one record. `masks[step]` holds one weight per
    /// feature column.
    pub fn write_record(&mut self, line: u64, masks: &[Vec<f32>]) -> csv::Result<()> {
        for (step, mask) in masks.iter().enumerate() {
            debug_assert_eq!(mask.len(), self.num_features);
            let mut row = Vec::with_capacity(mask.len() + 2);
            row.push(line.to_string());
            row.push(step.to_string());
            row.extend(mask.iter().map(|w| format!("{w:.5}")));
            self.writer.write_record(&row)?;
            self.rows += 1;
        }
        Ok(())
    }

    pub fn finish(mut self) -> csv::Result<PathBuf> {
        self.writer.flush()?;
        tracing::info!(rows = self.rows, path = %self.path.display(), "Wrote attention masks");
        Ok(self.path)
    }
}
