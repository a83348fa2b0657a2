//! CSV feature-table loading for the command-line interface.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use taiga_forest::{Mode, Targets};

/// Errors from loading a CSV feature table.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the header does not contain the requested target column.
    #[error("target column \"{column}\" not found in {path}")]
    MissingTargetColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The requested target column name.
        column: String,
    },

    /// Returned when no columns remain after extracting the target.
    #[error("no feature columns in {path} besides target \"{column}\"")]
    NoFeatureColumns {
        /// Path to the CSV file.
        path: PathBuf,
        /// The requested target column name.
        column: String,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty table (no data rows) in {path}")]
    EmptyTable {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a cell value is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column \"{column}\", raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Name of the offending column.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when a classification target cell is not an integer.
    #[error("unparseable class label in {path}: row {row_index}, raw value \"{raw}\"")]
    BadLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw string value that failed to parse.
        raw: String,
    },
}

/// A loaded feature table with its target column extracted.
#[derive(Debug)]
pub struct Table {
    /// Header names of the feature columns, in column order.
    pub feature_names: Vec<String>,
    /// Row-major feature matrix.
    pub features: Vec<Vec<f64>>,
    /// The target column, parsed according to the mode.
    pub targets: Targets,
}

/// Reads a feature table plus one target column from a CSV file.
///
/// Expected CSV format:
/// - Header row required; one column must match the target name
/// - Every non-target column is a numeric feature
/// - Classification targets must parse as integers, regression targets
///   as finite floats
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`DatasetError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`DatasetError::CsvParse`] | Malformed CSV record |
/// | [`DatasetError::MissingTargetColumn`] | Header lacks the target column |
/// | [`DatasetError::NoFeatureColumns`] | Only the target column, no features |
/// | [`DatasetError::EmptyTable`] | Zero data rows after header |
/// | [`DatasetError::InconsistentRowLength`] | Row has different column count than header |
/// | [`DatasetError::NonFiniteValue`] | Feature or regression cell is NaN, Inf, or unparseable |
/// | [`DatasetError::BadLabel`] | Classification cell is not an integer |
pub struct TableReader {
    path: PathBuf,
    target: String,
    mode: Mode,
}

impl TableReader {
    /// Create a new reader for the given CSV path, target column, and mode.
    pub fn new(path: &Path, target: &str, mode: Mode) -> Self {
        Self {
            path: path.to_path_buf(),
            target: target.to_string(),
            mode,
        }
    }

    /// Read and validate the CSV file, returning a [`Table`].
    #[instrument(skip(self), fields(path = %self.path.display(), target = %self.target))]
    pub fn read(&self) -> Result<Table, DatasetError> {
        // 1. Open file (FileNotFound on failure)
        let file = std::fs::File::open(&self.path).map_err(|e| DatasetError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // 2. Build CSV reader with headers.
        // flexible(true) allows rows with varying column counts so that our own
        // InconsistentRowLength check fires instead of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        // 3. Read header, locate the target column, collect feature names
        let header = rdr.headers().map_err(|e| DatasetError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        })?;
        let expected_cols = header.len();
        debug!(expected_cols, "read CSV header");

        let Some(target_col) = header.iter().position(|name| name == self.target) else {
            return Err(DatasetError::MissingTargetColumn {
                path: self.path.clone(),
                column: self.target.clone(),
            });
        };
        if expected_cols < 2 {
            return Err(DatasetError::NoFeatureColumns {
                path: self.path.clone(),
                column: self.target.clone(),
            });
        }

        let feature_names: Vec<String> = header
            .iter()
            .enumerate()
            .filter(|&(col, _)| col != target_col)
            .map(|(_, name)| name.to_string())
            .collect();

        // 4. Iterate rows with validation
        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut values = Vec::new();

        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DatasetError::CsvParse {
                path: self.path.clone(),
                offset: e.position().map_or(0, |p| p.byte()),
                source: e,
            })?;

            if record.len() != expected_cols {
                return Err(DatasetError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let mut row = Vec::with_capacity(feature_names.len());
            for (col, raw) in record.iter().enumerate() {
                if col == target_col {
                    match self.mode {
                        Mode::Classification => {
                            let label: i64 =
                                raw.parse().map_err(|_| DatasetError::BadLabel {
                                    path: self.path.clone(),
                                    row_index,
                                    raw: raw.to_string(),
                                })?;
                            labels.push(label);
                        }
                        Mode::Regression => {
                            let value = self.parse_finite(raw, row_index, &self.target)?;
                            values.push(value);
                        }
                    }
                } else {
                    let name = if col < target_col {
                        &feature_names[col]
                    } else {
                        &feature_names[col - 1]
                    };
                    row.push(self.parse_finite(raw, row_index, name)?);
                }
            }
            features.push(row);
        }

        // 5. Check for empty table
        if features.is_empty() {
            return Err(DatasetError::EmptyTable {
                path: self.path.clone(),
            });
        }

        let targets = match self.mode {
            Mode::Classification => Targets::Labels(labels),
            Mode::Regression => Targets::Values(values),
        };
        info!(
            n_samples = features.len(),
            n_features = feature_names.len(),
            "feature table loaded"
        );

        Ok(Table {
            feature_names,
            features,
            targets,
        })
    }

    fn parse_finite(&self, raw: &str, row_index: usize, column: &str) -> Result<f64, DatasetError> {
        let value: f64 = raw.parse().map_err(|_| DatasetError::NonFiniteValue {
            path: self.path.clone(),
            row_index,
            column: column.to_string(),
            raw: raw.to_string(),
        })?;
        if !value.is_finite() {
            return Err(DatasetError::NonFiniteValue {
                path: self.path.clone(),
                row_index,
                column: column.to_string(),
                raw: raw.to_string(),
            });
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_classification_table() {
        let csv = "x,y,label\n1.0,2.0,0\n3.0,4.0,1\n5.0,6.0,0\n";
        let f = write_csv(csv);
        let table = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap();
        assert_eq!(table.feature_names, &["x", "y"]);
        assert_eq!(table.features.len(), 3);
        assert_eq!(table.features[1], vec![3.0, 4.0]);
        assert_eq!(table.targets, Targets::Labels(vec![0, 1, 0]));
    }

    #[test]
    fn target_column_in_the_middle() {
        let csv = "x,label,y\n1.0,7,2.0\n3.0,8,4.0\n";
        let f = write_csv(csv);
        let table = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap();
        assert_eq!(table.feature_names, &["x", "y"]);
        assert_eq!(table.features[0], vec![1.0, 2.0]);
        assert_eq!(table.targets, Targets::Labels(vec![7, 8]));
    }

    #[test]
    fn read_regression_table() {
        let csv = "x,y,value\n1.0,2.0,0.5\n3.0,4.0,-1.5\n";
        let f = write_csv(csv);
        let table = TableReader::new(f.path(), "value", Mode::Regression)
            .read()
            .unwrap();
        assert_eq!(table.targets, Targets::Values(vec![0.5, -1.5]));
    }

    #[test]
    fn missing_target_column_error() {
        let csv = "x,y\n1.0,2.0\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap_err();
        assert!(matches!(err, DatasetError::MissingTargetColumn { .. }));
    }

    #[test]
    fn no_feature_columns_error() {
        let csv = "label\n0\n1\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap_err();
        assert!(matches!(err, DatasetError::NoFeatureColumns { .. }));
    }

    #[test]
    fn empty_table_error() {
        let csv = "x,label\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap_err();
        assert!(matches!(err, DatasetError::EmptyTable { .. }));
    }

    #[test]
    fn inconsistent_row_length_error() {
        let csv = "x,y,label\n1.0,2.0,0\n3.0,1\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap_err();
        assert!(matches!(
            err,
            DatasetError::InconsistentRowLength { row_index: 1, .. }
        ));
    }

    #[test]
    fn non_finite_feature_error() {
        let csv = "x,label\nNaN,0\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap_err();
        assert!(matches!(err, DatasetError::NonFiniteValue { .. }));
    }

    #[test]
    fn float_label_error() {
        let csv = "x,label\n1.0,1.5\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "label", Mode::Classification)
            .read()
            .unwrap_err();
        assert!(matches!(err, DatasetError::BadLabel { .. }));
    }

    #[test]
    fn non_finite_regression_target_error() {
        let csv = "x,value\n1.0,inf\n";
        let f = write_csv(csv);
        let err = TableReader::new(f.path(), "value", Mode::Regression)
            .read()
            .unwrap_err();
        assert!(matches!(err, DatasetError::NonFiniteValue { .. }));
    }
}
