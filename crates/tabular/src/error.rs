//! Error types for loading and encoding tabular data.
//!
//! [`DataError`] aborts the whole operation. [`RecordError`] drops a single
//! row and is collected alongside the surviving records.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors: the file, its header, or the dataset as a whole is unusable.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV from {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: header row is empty")]
    EmptyHeader { path: PathBuf },
    #[error("column not found in header: {0}")]
    ColumnNotFound(String),
    #[error("duplicate column in header: {0}")]
    DuplicateColumn(String),
    #[error("header does not match the trained columns: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },
    #[error("{path}: no usable records ({rejected} rejected)")]
    NoRecords { path: PathBuf, rejected: usize },
    #[error("cannot compute statistics over an empty dataset")]
    EmptyDataset,
    #[error("statistics were accumulated over {accumulated} records but the dataset holds {dataset}")]
    StatisticsMismatch { accumulated: usize, dataset: usize },
    #[error("column statistics have not been finalized")]
    StatisticsNotFinalized,
    #[error("dataset is already standardized")]
    AlreadyStandardized,
    #[error("split sizes sum to {requested} but the dataset holds {available} records")]
    SplitTooLarge { requested: usize, available: usize },
}

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordErrorKind {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("column {column}: cannot parse {value:?} as a number")]
    FeatureParse { column: String, value: String },
    #[error("column {column}: unknown category {value:?}")]
    UnknownCategory { column: String, value: String },
    #[error("unknown target label {value:?}")]
    UnknownTarget { value: String },
    #[error("cannot parse target {value:?} as a number")]
    TargetParse { value: String },
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// A rejected row and its line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct RecordError {
    pub line: u64,
    pub kind: RecordErrorKind,
}

impl RecordError {
    pub fn new(line: u64, kind: RecordErrorKind) -> Self {
        Self { line, kind }
    }
}
