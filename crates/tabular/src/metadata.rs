//! Column registry and record encoder.
//!
//! A [`Metadata`] is built once from a training header, grows its categorical
//! value and target label maps during the training pass, and is then frozen.
//! Every later file is encoded against the frozen maps and standardized with
//! the training statistics, so train and test rows map to identical tensors.

use crate::dataset::Dataset;
use crate::error::{DataError, RecordError, RecordErrorKind};
use crate::types::{Column, ColumnKind, DataRecord, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Bidirectional name ↔ dense index map. Indices are handed out in
/// first-seen order starting at 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameMap {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `name`, assigning the next free index if it is new.
    pub fn get_or_insert(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.names.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        idx
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Running sums collected during the training pass.
#[derive(Debug, Clone, Default, PartialEq)]
struct StatsAccumulator {
    sums: Vec<f64>,
    target_sum: f64,
    count: usize,
}

/// Column registry, feature index maps and categorical value maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    columns: Vec<Column>,
    /// Column name → dense continuous index.
    continuous_index: HashMap<String, usize>,
    /// Column name → dense categorical index.
    categorical_index: HashMap<String, usize>,
    /// Dense continuous index → header position.
    continuous_columns: Vec<usize>,
    /// Dense categorical index → header position.
    categorical_columns: Vec<usize>,
    /// Per dense categorical column: raw value → global embedding index.
    categorical_values: Vec<HashMap<String, usize>>,
    num_categorical_values: usize,
    target_column: usize,
    target_kind: TargetKind,
    /// Class labels. Present only for categorical targets.
    target_names: Option<NameMap>,
    statistics_finalized: bool,
    frozen: bool,
    #[serde(skip)]
    accumulator: StatsAccumulator,
}

impl Metadata {
    /// Build the registry from a header row.
    ///
    /// The target is located by name. Every other column is categorical when
    /// listed in `categorical_columns` and continuous otherwise. A target that
    /// is listed as categorical becomes a classification target.
    pub fn build<S: AsRef<str>>(
        header: &[&str],
        target_column_name: &str,
        categorical_columns: &[S],
    ) -> Result<Self, DataError> {
        let mut seen = HashSet::new();
        for name in header {
            if !seen.insert(*name) {
                return Err(DataError::DuplicateColumn(name.to_string()));
            }
        }

        let categorical: HashSet<&str> = categorical_columns.iter().map(|s| s.as_ref()).collect();
        for name in &categorical {
            if !seen.contains(name) {
                return Err(DataError::ColumnNotFound(name.to_string()));
            }
        }

        let target_column = header
            .iter()
            .position(|name| *name == target_column_name)
            .ok_or_else(|| DataError::ColumnNotFound(target_column_name.to_string()))?;

        let mut columns = Vec::with_capacity(header.len());
        let mut continuous_index = HashMap::new();
        let mut categorical_index = HashMap::new();
        let mut continuous_columns = Vec::new();
        let mut categorical_columns = Vec::new();

        for (position, name) in header.iter().enumerate() {
            let kind = if categorical.contains(name) {
                ColumnKind::Categorical
            } else {
                ColumnKind::Continuous
            };
            columns.push(Column::new(*name, kind));
            if position == target_column {
                continue;
            }
            match kind {
                ColumnKind::Continuous => {
                    continuous_index.insert(name.to_string(), continuous_columns.len());
                    continuous_columns.push(position);
                }
                ColumnKind::Categorical => {
                    categorical_index.insert(name.to_string(), categorical_columns.len());
                    categorical_columns.push(position);
                }
            }
        }

        let target_kind = TargetKind::from(columns[target_column].kind);
        let target_names = target_kind.is_categorical().then(NameMap::new);

        tracing::debug!(
            columns = columns.len(),
            continuous = continuous_columns.len(),
            categorical = categorical_columns.len(),
            target = target_column_name,
            target_kind = %target_kind,
            "Built metadata from header"
        );

        Ok(Self {
            accumulator: StatsAccumulator {
                sums: vec![0.0; continuous_columns.len()],
                ..Default::default()
            },
            categorical_values: vec![HashMap::new(); categorical_columns.len()],
            columns,
            continuous_index,
            categorical_index,
            continuous_columns,
            categorical_columns,
            num_categorical_values: 0,
            target_column,
            target_kind,
            target_names,
            statistics_finalized: false,
            frozen: false,
        })
    }

    /// Encode one raw row.
    ///
    /// During a training pass (on unfrozen metadata) unseen categories and
    /// target labels receive the next free index and continuous values feed
    /// the statistics accumulator. Otherwise every lookup must hit an existing
    /// entry. All fallible parsing happens before any state changes, so a
    /// rejected row leaves the metadata untouched.
    pub fn encode_record(
        &mut self,
        fields: &[&str],
        line: u64,
        is_training_pass: bool,
    ) -> Result<DataRecord, RecordError> {
        if !is_training_pass || self.frozen {
            return self.encode_frozen(fields, line);
        }

        self.check_field_count(fields, line)?;
        let continuous = self.parse_continuous(fields, line)?;
        let raw_target = fields[self.target_column];

        let target = match self.target_kind {
            TargetKind::Continuous => parse_number(raw_target).ok_or_else(|| {
                RecordError::new(
                    line,
                    RecordErrorKind::TargetParse {
                        value: raw_target.to_string(),
                    },
                )
            })?,
            TargetKind::Categorical => {
                let names = self.target_names.get_or_insert_with(NameMap::new);
                names.get_or_insert(raw_target) as f64
            }
        };

        let mut categorical = Vec::with_capacity(self.categorical_columns.len());
        for (dense, &position) in self.categorical_columns.iter().enumerate() {
            let values = &mut self.categorical_values[dense];
            let next = self.num_categorical_values;
            let index = *values.entry(fields[position].to_string()).or_insert(next);
            if index == next {
                self.num_categorical_values += 1;
            }
            categorical.push(index);
        }

        for (sum, value) in self.accumulator.sums.iter_mut().zip(&continuous) {
            *sum += value;
        }
        if self.target_kind == TargetKind::Continuous {
            self.accumulator.target_sum += target;
        }
        self.accumulator.count += 1;

        Ok(DataRecord {
            line,
            continuous,
            categorical,
            target,
        })
    }

    /// Encode one raw row against the existing maps without modifying them.
    pub fn encode_frozen(&self, fields: &[&str], line: u64) -> Result<DataRecord, RecordError> {
        self.check_field_count(fields, line)?;
        let continuous = self.parse_continuous(fields, line)?;

        let mut categorical = Vec::with_capacity(self.categorical_columns.len());
        for (dense, &position) in self.categorical_columns.iter().enumerate() {
            let value = fields[position];
            let index = self.categorical_values[dense].get(value).copied().ok_or_else(|| {
                RecordError::new(
                    line,
                    RecordErrorKind::UnknownCategory {
                        column: self.columns[position].name.clone(),
                        value: value.to_string(),
                    },
                )
            })?;
            categorical.push(index);
        }

        let raw_target = fields[self.target_column];
        let target = match (&self.target_kind, &self.target_names) {
            (TargetKind::Categorical, Some(names)) => names.index_of(raw_target).map(|i| i as f64),
            (TargetKind::Categorical, None) => None,
            (TargetKind::Continuous, _) => parse_number(raw_target),
        };
        let target = target.ok_or_else(|| {
            let value = raw_target.to_string();
            let kind = match self.target_kind {
                TargetKind::Categorical => RecordErrorKind::UnknownTarget { value },
                TargetKind::Continuous => RecordErrorKind::TargetParse { value },
            };
            RecordError::new(line, kind)
        })?;

        Ok(DataRecord {
            line,
            continuous,
            categorical,
            target,
        })
    }

    fn check_field_count(&self, fields: &[&str], line: u64) -> Result<(), RecordError> {
        if fields.len() != self.columns.len() {
            return Err(RecordError::new(
                line,
                RecordErrorKind::FieldCount {
                    expected: self.columns.len(),
                    found: fields.len(),
                },
            ));
        }
        Ok(())
    }

    fn parse_continuous(&self, fields: &[&str], line: u64) -> Result<Vec<f64>, RecordError> {
        self.continuous_columns
            .iter()
            .map(|&position| {
                parse_number(fields[position]).ok_or_else(|| {
                    RecordError::new(
                        line,
                        RecordErrorKind::FeatureParse {
                            column: self.columns[position].name.clone(),
                            value: fields[position].to_string(),
                        },
                    )
                })
            })
            .collect()
    }

    /// Turn the accumulated sums into per-column mean and standard deviation.
    ///
    /// Means come from the training-pass sums; the standard deviation takes a
    /// second sweep over `dataset`, which must hold exactly the records encoded
    /// in the training pass. A column with zero spread keeps `stddev = 1`.
    pub fn finalize_statistics(&mut self, dataset: &Dataset) -> Result<(), DataError> {
        let count = self.accumulator.count;
        if count == 0 {
            return Err(DataError::EmptyDataset);
        }
        if count != dataset.len() {
            return Err(DataError::StatisticsMismatch {
                accumulated: count,
                dataset: dataset.len(),
            });
        }

        let n = count as f64;
        let means: Vec<f64> = self.accumulator.sums.iter().map(|s| s / n).collect();
        let target_mean = self.accumulator.target_sum / n;

        let mut squares = vec![0.0; means.len()];
        let mut target_square = 0.0;
        for record in dataset.iter() {
            for ((sq, value), mean) in squares.iter_mut().zip(&record.continuous).zip(&means) {
                *sq += (value - mean).powi(2);
            }
            target_square += (record.target - target_mean).powi(2);
        }

        for (dense, &position) in self.continuous_columns.iter().enumerate() {
            let column = &mut self.columns[position];
            column.average = means[dense];
            column.stddev = nonzero_stddev((squares[dense] / n).sqrt());
        }
        if self.target_kind == TargetKind::Continuous {
            let column = &mut self.columns[self.target_column];
            column.average = target_mean;
            column.stddev = nonzero_stddev((target_square / n).sqrt());
        }

        self.statistics_finalized = true;
        tracing::debug!(records = count, "Finalized column statistics");
        Ok(())
    }

    /// Rewrite every continuous feature (and a continuous target) of `dataset`
    /// as `(x - mean) / stddev` using the stored training statistics.
    pub fn standardize(&self, dataset: &mut Dataset) -> Result<(), DataError> {
        if !self.statistics_finalized {
            return Err(DataError::StatisticsNotFinalized);
        }
        let feature_columns: Vec<&Column> = self
            .continuous_columns
            .iter()
            .map(|&position| &self.columns[position])
            .collect();
        let target = (self.target_kind == TargetKind::Continuous)
            .then(|| &self.columns[self.target_column]);

        dataset.standardize_records(|record| {
            for (value, column) in record.continuous.iter_mut().zip(&feature_columns) {
                *value = column.standardize(*value);
            }
            if let Some(column) = target {
                record.target = column.standardize(record.target);
            }
        })
    }

    /// Mark the metadata read-only. Later encodes never add categories or
    /// labels, whatever pass the caller asks for.
    pub fn freeze(&mut self) {
        self.frozen = true;
        self.accumulator = StatsAccumulator::default();
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn statistics_finalized(&self) -> bool {
        self.statistics_finalized
    }

    /// Fail unless `header` names the trained columns in the trained order.
    pub fn check_header(&self, header: &[&str]) -> Result<(), DataError> {
        let matches = header.len() == self.columns.len()
            && header.iter().zip(&self.columns).all(|(h, c)| *h == c.name);
        if matches {
            return Ok(());
        }
        Err(DataError::SchemaMismatch {
            expected: self.header().join(","),
            found: header.join(","),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn target_column(&self) -> &Column {
        &self.columns[self.target_column]
    }

    pub fn target_column_index(&self) -> usize {
        self.target_column
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn target_names(&self) -> Option<&NameMap> {
        self.target_names.as_ref()
    }

    /// Number of target classes; `0` for a continuous target.
    pub fn num_classes(&self) -> usize {
        self.target_names.as_ref().map_or(0, NameMap::len)
    }

    pub fn class_name(&self, class: usize) -> Option<&str> {
        self.target_names.as_ref().and_then(|names| names.name_of(class))
    }

    pub fn num_continuous(&self) -> usize {
        self.continuous_columns.len()
    }

    pub fn num_categorical(&self) -> usize {
        self.categorical_columns.len()
    }

    /// Size of the global categorical embedding table.
    pub fn num_categorical_values(&self) -> usize {
        self.num_categorical_values
    }

    pub fn continuous_index(&self, column: &str) -> Option<usize> {
        self.continuous_index.get(column).copied()
    }

    pub fn categorical_index(&self, column: &str) -> Option<usize> {
        self.categorical_index.get(column).copied()
    }

    /// Global embedding index of `value` in categorical column `column`.
    pub fn categorical_value_index(&self, column: &str, value: &str) -> Option<usize> {
        let dense = self.categorical_index(column)?;
        self.categorical_values[dense].get(value).copied()
    }

    /// Feature column names in model input order: continuous columns, then
    /// categorical columns, each in header order.
    pub fn feature_names(&self) -> Vec<&str> {
        self.continuous_columns
            .iter()
            .chain(&self.categorical_columns)
            .map(|&position| self.columns[position].name.as_str())
            .collect()
    }

    /// Map a standardized target back to the raw scale.
    pub fn destandardize_target(&self, value: f64) -> f64 {
        match self.target_kind {
            TargetKind::Continuous => self.target_column().destandardize(value),
            TargetKind::Categorical => value,
        }
    }

    /// Render a target value for output: the class label for categorical
    /// targets, the raw-scale number otherwise.
    pub fn format_target(&self, value: f64) -> String {
        match self.target_kind {
            TargetKind::Categorical => self
                .class_name(value as usize)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}", value as usize)),
            TargetKind::Continuous => format!("{:.5}", self.destandardize_target(value)),
        }
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn nonzero_stddev(stddev: f64) -> f64 {
    if stddev > f64::EPSILON {
        stddev
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<&'static str> {
        vec!["age", "colour", "size", "label"]
    }

    fn build() -> Metadata {
        Metadata::build(&header(), "label", &["colour", "label"]).unwrap()
    }

    #[test]
    fn test_build_assigns_dense_indices() {
        let meta = build();
        assert_eq!(meta.num_continuous(), 2);
        assert_eq!(meta.num_categorical(), 1);
        assert_eq!(meta.continuous_index("age"), Some(0));
        assert_eq!(meta.continuous_index("size"), Some(1));
        assert_eq!(meta.categorical_index("colour"), Some(0));
        assert_eq!(meta.continuous_index("label"), None);
        assert_eq!(meta.target_kind(), TargetKind::Categorical);
        assert_eq!(meta.feature_names(), vec!["age", "size", "colour"]);
    }

    #[test]
    fn test_build_missing_target() {
        let err = Metadata::build(&header(), "price", &["colour"]).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(name) if name == "price"));
    }

    #[test]
    fn test_build_unknown_categorical_column() {
        let err = Metadata::build(&header(), "label", &["shape"]).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(_)));
    }

    #[test]
    fn test_build_duplicate_column() {
        let err = Metadata::build(&["a", "a", "y"], "y", &[] as &[&str]).unwrap_err();
        assert!(matches!(err, DataError::DuplicateColumn(_)));
    }

    #[test]
    fn test_training_pass_assigns_categories_in_first_seen_order() {
        let mut meta = build();
        let a = meta.encode_record(&["1", "red", "2", "yes"], 2, true).unwrap();
        let b = meta.encode_record(&["3", "blue", "4", "no"], 3, true).unwrap();
        let c = meta.encode_record(&["5", "red", "6", "yes"], 4, true).unwrap();

        assert_eq!(a.categorical, vec![0]);
        assert_eq!(b.categorical, vec![1]);
        assert_eq!(c.categorical, vec![0]);
        assert_eq!(a.target, 0.0);
        assert_eq!(b.target, 1.0);
        assert_eq!(meta.num_categorical_values(), 2);
        assert_eq!(meta.num_classes(), 2);
        assert_eq!(meta.class_name(1), Some("no"));
        assert_eq!(meta.categorical_value_index("colour", "blue"), Some(1));
    }

    #[test]
    fn test_evaluation_pass_rejects_unknown_category() {
        let mut meta = build();
        meta.encode_record(&["1", "red", "2", "yes"], 2, true).unwrap();

        let err = meta.encode_record(&["1", "green", "2", "yes"], 7, false).unwrap_err();
        assert_eq!(err.line, 7);
        assert_eq!(
            err.kind,
            RecordErrorKind::UnknownCategory {
                column: "colour".into(),
                value: "green".into()
            }
        );
        assert_eq!(meta.num_categorical_values(), 1);
    }

    #[test]
    fn test_evaluation_pass_rejects_unknown_target() {
        let mut meta = build();
        meta.encode_record(&["1", "red", "2", "yes"], 2, true).unwrap();
        let err = meta.encode_frozen(&["1", "red", "2", "maybe"], 3).unwrap_err();
        assert!(matches!(err.kind, RecordErrorKind::UnknownTarget { .. }));
    }

    #[test]
    fn test_frozen_metadata_ignores_training_flag() {
        let mut meta = build();
        meta.encode_record(&["1", "red", "2", "yes"], 2, true).unwrap();
        meta.freeze();

        let err = meta.encode_record(&["1", "green", "2", "yes"], 3, true).unwrap_err();
        assert!(matches!(err.kind, RecordErrorKind::UnknownCategory { .. }));
        assert_eq!(meta.num_categorical_values(), 1);
    }

    #[test]
    fn test_rejected_row_does_not_allocate_categories() {
        let mut meta = build();
        let err = meta.encode_record(&["oops", "red", "2", "yes"], 2, true).unwrap_err();
        assert!(matches!(err.kind, RecordErrorKind::FeatureParse { ref column, .. } if column == "age"));
        assert_eq!(meta.num_categorical_values(), 0);
        assert_eq!(meta.num_classes(), 0);
    }

    #[test]
    fn test_field_count_mismatch() {
        let mut meta = build();
        let err = meta.encode_record(&["1", "red", "yes"], 5, true).unwrap_err();
        assert_eq!(
            err.kind,
            RecordErrorKind::FieldCount {
                expected: 4,
                found: 3
            }
        );
    }

    #[test]
    fn test_non_finite_feature_rejected() {
        let mut meta = build();
        let err = meta.encode_record(&["NaN", "red", "2", "yes"], 2, true).unwrap_err();
        assert!(matches!(err.kind, RecordErrorKind::FeatureParse { .. }));
    }

    #[test]
    fn test_continuous_target_parse_error() {
        let mut meta = Metadata::build(&["x", "y"], "y", &[] as &[&str]).unwrap();
        assert_eq!(meta.target_kind(), TargetKind::Continuous);
        let err = meta.encode_record(&["1.0", "n/a"], 2, true).unwrap_err();
        assert!(matches!(err.kind, RecordErrorKind::TargetParse { .. }));
    }

    #[test]
    fn test_check_header() {
        let meta = build();
        assert!(meta.check_header(&header()).is_ok());
        let err = meta.check_header(&["age", "size", "colour", "label"]).unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_serde_roundtrip_preserves_maps() {
        let mut meta = build();
        meta.encode_record(&["1", "red", "2", "yes"], 2, true).unwrap();
        meta.encode_record(&["1", "blue", "2", "no"], 3, true).unwrap();
        meta.freeze();

        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
        assert_eq!(back.categorical_value_index("colour", "blue"), Some(1));
    }

    #[test]
    fn test_name_map() {
        let mut names = NameMap::new();
        assert!(names.is_empty());
        assert_eq!(names.get_or_insert("a"), 0);
        assert_eq!(names.get_or_insert("b"), 1);
        assert_eq!(names.get_or_insert("a"), 0);
        assert_eq!(names.index_of("b"), Some(1));
        assert_eq!(names.name_of(0), Some("a"));
        assert_eq!(names.name_of(2), None);
        assert_eq!(names.len(), 2);
    }
}
