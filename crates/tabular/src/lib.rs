//! CSV ingestion and encoding for tabular learning.
//!
//! Turns raw CSV rows into fixed-shape numeric records: a [`Metadata`]
//! registry classifies columns, assigns dense feature indices and global
//! categorical embedding indices, and standardizes continuous values with
//! training-set statistics. Records live in a [`Dataset`] that provides
//! ordered or seeded-random batching and disjoint random splits.

pub mod dataset;
pub mod error;
pub mod metadata;
pub mod reader;
pub mod types;
pub mod writer;

pub use dataset::{Dataset, DatasetOrder};
pub use error::{DataError, RecordError, RecordErrorKind};
pub use metadata::{Metadata, NameMap};
pub use reader::{CsvLoader, LoadedData};
pub use types::{Column, ColumnKind, DataRecord, TargetKind};
pub use writer::{AttentionWriter, PredictionWriter};
