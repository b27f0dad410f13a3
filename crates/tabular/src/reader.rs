//! Loads CSV files into encoded, standardized datasets.

use crate::dataset::Dataset;
use crate::error::{DataError, RecordError, RecordErrorKind};
use crate::metadata::Metadata;
use crate::types::DataRecord;
use std::fs::File;
use std::path::Path;

/// Output of a CSV load: the encoded dataset, the metadata it was encoded
/// with, and every row that had to be dropped.
#[derive(Debug)]
pub struct LoadedData {
    pub metadata: Metadata,
    pub dataset: Dataset,
    /// Rejected rows. Non-empty means a warning, not a failure.
    pub errors: Vec<RecordError>,
}

/// Static methods for reading tabular data from CSV files.
pub struct CsvLoader;

impl CsvLoader {
    /// Load a training file, building fresh metadata from its header.
    ///
    /// Rows are encoded in the training pass, statistics are finalized over
    /// the accepted rows, the dataset is standardized and the metadata is
    /// frozen before it is returned.
    pub fn load_training<S: AsRef<str>>(
        path: &Path,
        target_column: &str,
        categorical_columns: &[S],
        seed: u64,
    ) -> Result<LoadedData, DataError> {
        let mut reader = open(path)?;
        let header = read_header(&mut reader, path)?;
        let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
        let mut metadata = Metadata::build(&header_refs, target_column, categorical_columns)?;

        let (records, errors) = encode_rows(&mut reader, path, |fields, line| {
            metadata.encode_record(fields, line, true)
        })?;
        if records.is_empty() {
            return Err(DataError::NoRecords {
                path: path.to_path_buf(),
                rejected: errors.len(),
            });
        }

        let mut dataset = Dataset::new(records, seed);
        metadata.finalize_statistics(&dataset)?;
        metadata.standardize(&mut dataset)?;
        metadata.freeze();

        log_load(path, &dataset, &errors);
        Ok(LoadedData {
            metadata,
            dataset,
            errors,
        })
    }

    /// Load an evaluation file against metadata from a training run.
    ///
    /// The header must match the trained columns exactly. Rows with unseen
    /// categories or labels are dropped and reported.
    pub fn load_with_metadata(
        path: &Path,
        metadata: &Metadata,
        seed: u64,
    ) -> Result<LoadedData, DataError> {
        let mut reader = open(path)?;
        let header = read_header(&mut reader, path)?;
        let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
        metadata.check_header(&header_refs)?;

        let (records, errors) =
            encode_rows(&mut reader, path, |fields, line| metadata.encode_frozen(fields, line))?;
        if records.is_empty() {
            return Err(DataError::NoRecords {
                path: path.to_path_buf(),
                rejected: errors.len(),
            });
        }

        let mut dataset = Dataset::new(records, seed);
        metadata.standardize(&mut dataset)?;

        log_load(path, &dataset, &errors);
        Ok(LoadedData {
            metadata: metadata.clone(),
            dataset,
            errors,
        })
    }
}

fn open(path: &Path) -> Result<csv::Reader<File>, DataError> {
    let file = File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn read_header(reader: &mut csv::Reader<File>, path: &Path) -> Result<Vec<String>, DataError> {
    let header = reader.headers().map_err(|source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    if header.is_empty() || header.iter().all(str::is_empty) {
        return Err(DataError::EmptyHeader {
            path: path.to_path_buf(),
        });
    }
    Ok(header.iter().map(str::to_string).collect())
}

fn encode_rows<F>(
    reader: &mut csv::Reader<File>,
    path: &Path,
    mut encode: F,
) -> Result<(Vec<DataRecord>, Vec<RecordError>), DataError>
where
    F: FnMut(&[&str], u64) -> Result<DataRecord, RecordError>,
{
    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut row = csv::StringRecord::new();
    // Header occupies line 1.
    let mut line = 1u64;

    loop {
        match reader.read_record(&mut row) {
            Ok(false) => break,
            Ok(true) => {
                line = row.position().map_or(line + 1, |p| p.line());
                let fields: Vec<&str> = row.iter().collect();
                match encode(&fields, line) {
                    Ok(record) => records.push(record),
                    Err(err) => errors.push(err),
                }
            }
            Err(err) => {
                if let csv::ErrorKind::Io(_) = err.kind() {
                    return Err(DataError::Csv {
                        path: path.to_path_buf(),
                        source: err,
                    });
                }
                line = err.position().map_or(line + 1, |p| p.line());
                errors.push(RecordError::new(line, RecordErrorKind::Malformed(err.to_string())));
            }
        }
    }

    Ok((records, errors))
}

fn log_load(path: &Path, dataset: &Dataset, errors: &[RecordError]) {
    tracing::info!(
        path = %path.display(),
        records = dataset.len(),
        rejected = errors.len(),
        "Loaded CSV data"
    );
    for err in errors {
        tracing::warn!(path = %path.display(), "Dropped row: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_training_collects_record_errors() {
        let file = csv_file("a,b,y\n1,2,x\nbad,3,y\n4,5,x\n1,2\n");
        let loaded = CsvLoader::load_training(file.path(), "y", &["y"], 1).unwrap();

        assert_eq!(loaded.dataset.len(), 2);
        assert_eq!(loaded.errors.len(), 2);
        assert_eq!(loaded.errors[0].line, 3);
        assert!(matches!(loaded.errors[0].kind, RecordErrorKind::FeatureParse { .. }));
        assert_eq!(loaded.errors[1].line, 5);
        assert!(matches!(loaded.errors[1].kind, RecordErrorKind::FieldCount { .. }));
        assert!(loaded.metadata.is_frozen());
        assert!(loaded.dataset.is_standardized());
        assert_eq!(loaded.metadata.target_kind(), TargetKind::Categorical);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CsvLoader::load_training(Path::new("/nonexistent/file.csv"), "y", &["y"], 1)
            .unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[test]
    fn test_load_empty_file() {
        let file = csv_file("");
        let err = CsvLoader::load_training(file.path(), "y", &[] as &[&str], 1).unwrap_err();
        assert!(matches!(err, DataError::EmptyHeader { .. }));
    }

    #[test]
    fn test_load_missing_target_column() {
        let file = csv_file("a,b\n1,2\n");
        let err = CsvLoader::load_training(file.path(), "y", &[] as &[&str], 1).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(_)));
    }

    #[test]
    fn test_load_no_usable_records() {
        let file = csv_file("a,y\nfoo,1\nbar,2\n");
        let err = CsvLoader::load_training(file.path(), "y", &[] as &[&str], 1).unwrap_err();
        assert!(matches!(err, DataError::NoRecords { rejected: 2, .. }));
    }

    #[test]
    fn test_load_with_metadata_rejects_other_schema() {
        let train = csv_file("a,b,y\n1,2,x\n3,4,z\n");
        let loaded = CsvLoader::load_training(train.path(), "y", &["y"], 1).unwrap();

        let test = csv_file("b,a,y\n1,2,x\n");
        let err = CsvLoader::load_with_metadata(test.path(), &loaded.metadata, 1).unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch { .. }));
    }
}
