//! Column descriptors and encoded records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a column's raw values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Parsed as a float and standardized.
    Continuous,
    /// Mapped to a global embedding index.
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// Kind of prediction target. Selects the training objective and the
/// evaluation metrics once, when the metadata is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Class labels, encoded as class indices.
    Categorical,
    /// Real values, encoded as standardized floats.
    Continuous,
}

impl TargetKind {
    pub fn is_categorical(self) -> bool {
        matches!(self, Self::Categorical)
    }
}

impl From<ColumnKind> for TargetKind {
    fn from(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Continuous => Self::Continuous,
            ColumnKind::Categorical => Self::Categorical,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Categorical => write!(f, "categorical"),
            Self::Continuous => write!(f, "continuous"),
        }
    }
}

/// One column of the input header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Header name.
    pub name: String,
    pub kind: ColumnKind,
    /// Training-set mean. Only meaningful for continuous columns.
    pub average: f64,
    /// Training-set population standard deviation. Only meaningful for
    /// continuous columns.
    pub stddev: f64,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            average: 0.0,
            stddev: 1.0,
        }
    }

    /// Map a raw value onto the standardized scale.
    pub fn standardize(&self, value: f64) -> f64 {
        (value - self.average) / self.stddev
    }

    /// Map a standardized value back onto the raw scale.
    pub fn destandardize(&self, value: f64) -> f64 {
        value * self.stddev + self.average
    }
}

/// A single encoded row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    /// Physical line in the source file (header is line 1).
    pub line: u64,
    /// One value per continuous column, in dense index order.
    pub continuous: Vec<f64>,
    /// One global embedding index per categorical column, in dense index order.
    pub categorical: Vec<usize>,
    /// Class index for categorical targets, standardized value otherwise.
    pub target: f64,
}

impl DataRecord {
    /// Class index of a categorical target.
    pub fn target_class(&self) -> usize {
        self.target as usize
    }
}
