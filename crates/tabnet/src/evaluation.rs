//! Evaluation metrics and output files for predictions on labelled data.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tabular::{AttentionWriter, DataRecord, Metadata, PredictionWriter, TargetKind};

use crate::inference::Prediction;

/// Confusion counts and scores of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl Counts {
    fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub records: usize,
    pub accuracy: f64,
    pub macro_f1: f64,
    pub micro_f1: f64,
    /// Mean cross-entropy of the true class.
    pub loss: f64,
    /// Every class seen as a label or a prediction, sorted by name.
    pub classes: Vec<ClassMetrics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub records: usize,
    pub r_squared: f64,
    /// Mean squared error on the standardized target scale.
    pub loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum EvaluationReport {
    Classification(ClassificationReport),
    Regression(RegressionReport),
}

impl EvaluationReport {
    pub fn loss(&self) -> f64 {
        match self {
            Self::Classification(report) => report.loss,
            Self::Regression(report) => report.loss,
        }
    }

    /// Log the report, one event per class for classification.
    pub fn log(&self) {
        match self {
            Self::Classification(report) => {
                for class in &report.classes {
                    tracing::info!(
                        class = %class.class,
                        tp = class.true_positives,
                        fp = class.false_positives,
                        tn = class.true_negatives,
                        fn_ = class.false_negatives,
                        "Class {}: precision {:.3} recall {:.3} f1 {:.3}",
                        class.class,
                        class.precision,
                        class.recall,
                        class.f1
                    );
                }
                tracing::info!(
                    records = report.records,
                    accuracy = report.accuracy,
                    macro_f1 = report.macro_f1,
                    micro_f1 = report.micro_f1,
                    loss = report.loss,
                    "Macro F1: {:.3} - Micro F1: {:.3} - Loss {:.5}",
                    report.macro_f1,
                    report.micro_f1,
                    report.loss
                );
            }
            Self::Regression(report) => {
                tracing::info!(
                    records = report.records,
                    r_squared = report.r_squared,
                    loss = report.loss,
                    "R-squared: {:.3} - Loss {:.5}",
                    report.r_squared,
                    report.loss
                );
            }
        }
    }
}

/// Index and value of the largest entry. Ties go to the lowest index.
pub fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best })
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Score `predictions` against the targets of `records` (same order).
pub fn evaluate(
    metadata: &Metadata,
    records: &[&DataRecord],
    predictions: &[Prediction],
) -> anyhow::Result<EvaluationReport> {
    anyhow::ensure!(
        records.len() == predictions.len(),
        "{} records but {} predictions",
        records.len(),
        predictions.len()
    );
    anyhow::ensure!(!records.is_empty(), "nothing to evaluate");

    Ok(match metadata.target_kind() {
        TargetKind::Categorical => {
            EvaluationReport::Classification(evaluate_classification(metadata, records, predictions))
        }
        TargetKind::Continuous => EvaluationReport::Regression(evaluate_regression(records, predictions)),
    })
}

fn class_label(metadata: &Metadata, class: usize) -> String {
    metadata
        .class_name(class)
        .map(str::to_string)
        .unwrap_or_else(|| class.to_string())
}

fn evaluate_classification(
    metadata: &Metadata,
    records: &[&DataRecord],
    predictions: &[Prediction],
) -> ClassificationReport {
    let mut counts: BTreeMap<String, Counts> = BTreeMap::new();
    let mut loss = 0.0;
    let mut correct = 0usize;

    for (record, prediction) in records.iter().zip(predictions) {
        let label = record.target_class();
        let (predicted, _) = argmax(&prediction.output);
        let probabilities = softmax(&prediction.output);
        loss -= probabilities
            .get(label)
            .copied()
            .unwrap_or(0.0)
            .max(f64::MIN_POSITIVE)
            .ln();

        let label_name = class_label(metadata, label);
        let predicted_name = class_label(metadata, predicted);
        if label == predicted {
            correct += 1;
            counts.entry(label_name).or_default().tp += 1;
        } else {
            counts.entry(label_name).or_default().fn_ += 1;
            counts.entry(predicted_name).or_default().fp += 1;
        }
    }

    let n = records.len();
    let classes: Vec<ClassMetrics> = counts
        .iter()
        .map(|(class, c)| ClassMetrics {
            class: class.clone(),
            true_positives: c.tp,
            false_positives: c.fp,
            true_negatives: n - c.tp - c.fp - c.fn_,
            false_negatives: c.fn_,
            precision: c.precision(),
            recall: c.recall(),
            f1: c.f1(),
        })
        .collect();

    let macro_f1 = classes.iter().map(|c| c.f1).sum::<f64>() / classes.len().max(1) as f64;
    let micro = counts.values().fold(Counts::default(), |acc, c| Counts {
        tp: acc.tp + c.tp,
        fp: acc.fp + c.fp,
        fn_: acc.fn_ + c.fn_,
    });

    ClassificationReport {
        records: n,
        accuracy: ratio(correct, n),
        macro_f1,
        micro_f1: micro.f1(),
        loss: loss / n as f64,
        classes,
    }
}

fn evaluate_regression(records: &[&DataRecord], predictions: &[Prediction]) -> RegressionReport {
    let n = records.len() as f64;
    let estimated: Vec<f64> = predictions
        .iter()
        .map(|p| p.output.first().copied().unwrap_or(0.0) as f64)
        .collect();
    let mean = records.iter().map(|r| r.target).sum::<f64>() / n;

    let (ss_res, ss_tot) = records
        .iter()
        .zip(&estimated)
        .fold((0.0, 0.0), |(res, tot), (record, &estimate)| {
            (
                res + (record.target - estimate).powi(2),
                tot + (record.target - mean).powi(2),
            )
        });

    RegressionReport {
        records: records.len(),
        r_squared: if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot },
        loss: ss_res / n,
    }
}

/// Write one prediction row per record: `label,predicted,probability` for
/// classification, `label,prediction` on the original target scale for
/// regression.
pub fn write_predictions(
    path: &Path,
    metadata: &Metadata,
    records: &[&DataRecord],
    predictions: &[Prediction],
) -> anyhow::Result<()> {
    let result = match metadata.target_kind() {
        TargetKind::Categorical => {
            PredictionWriter::classification(path).and_then(|mut writer| {
                for (record, prediction) in records.iter().zip(predictions) {
                    let (predicted, _) = argmax(&prediction.output);
                    let probability = softmax(&prediction.output)[predicted];
                    writer.write_class(
                        &class_label(metadata, record.target_class()),
                        &class_label(metadata, predicted),
                        probability,
                    )?;
                }
                writer.finish()
            })
        }
        TargetKind::Continuous => PredictionWriter::regression(path).and_then(|mut writer| {
            for (record, prediction) in records.iter().zip(predictions) {
                let estimate = prediction.output.first().copied().unwrap_or(0.0) as f64;
                writer.write_value(
                    metadata.destandardize_target(record.target),
                    metadata.destandardize_target(estimate),
                )?;
            }
            writer.finish()
        }),
    };
    result
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Failed to write predictions to {}: {e}", path.display()))
}

/// Write the per-step attention masks of every prediction.
pub fn write_attention(path: &Path, metadata: &Metadata, predictions: &[Prediction]) -> anyhow::Result<()> {
    AttentionWriter::create(path, &metadata.feature_names())
        .and_then(|mut writer| {
            for prediction in predictions {
                writer.write_record(prediction.line, &prediction.masks)?;
            }
            writer.finish()
        })
        .map(|_| ())
        .map_err(|e| anyhow::anyhow!("Failed to write attention map to {}: {e}", path.display()))
}
