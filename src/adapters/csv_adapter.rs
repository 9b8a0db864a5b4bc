//! CSV persistence for price tables and prepared datasets.

use crate::domain::error::StockfitError;
use crate::domain::ml::dataset::Dataset;
use crate::domain::table::{Column, DATE_COLUMN, PriceTable};
use crate::ports::table_store::TableStore;
use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Stores tables as `{base_path}/{name}.csv`.
///
/// Layout: a `Date` column (`YYYY-MM-DD`) followed by the table columns in
/// order. Missing values are empty fields; floats use the shortest
/// representation that reads back exactly.
pub struct CsvTableStore {
    base_path: PathBuf,
}

impl CsvTableStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.csv"))
    }

    pub fn write_table_at(path: &Path, table: &PriceTable) -> Result<(), StockfitError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::Writer::from_path(path)?;

        let mut header = vec![DATE_COLUMN];
        header.extend(table.column_names());
        wtr.write_record(&header)?;

        for (row, date) in table.dates().iter().enumerate() {
            let mut record = Vec::with_capacity(header.len());
            record.push(date.format(DATE_FORMAT).to_string());
            for column in table.columns() {
                record.push(column.values[row].map(|v| v.to_string()).unwrap_or_default());
            }
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        debug!(path = %path.display(), rows = table.row_count(), "wrote table");
        Ok(())
    }

    pub fn read_table_at(path: &Path, ticker: &str) -> Result<PriceTable, StockfitError> {
        let mut rdr = csv::Reader::from_path(path).map_err(|e| with_path(path, e))?;
        let headers = rdr.headers().map_err(|e| with_path(path, e))?.clone();
        if headers.get(0) != Some(DATE_COLUMN) {
            return Err(StockfitError::Csv {
                reason: format!("{}: first column must be {DATE_COLUMN}", path.display()),
            });
        }

        let mut dates = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len() - 1];
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| with_path(path, e))?;
            let raw_date = record.get(0).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT).map_err(|e| {
                StockfitError::Csv {
                    reason: format!("{} row {}: invalid date {raw_date:?}: {e}", path.display(), line + 1),
                }
            })?;
            dates.push(date);
            for (j, column) in values.iter_mut().enumerate() {
                let name = &headers[j + 1];
                column.push(parse_cell(record.get(j + 1).unwrap_or_default(), name, path, line)?);
            }
        }

        let columns = headers
            .iter()
            .skip(1)
            .zip(values)
            .map(|(name, values)| Column::new(name, values))
            .collect();
        PriceTable::new(ticker, dates, columns)
    }

    /// Read a prepared split file. Every column except the target, the
    /// `Date` column and `drop_columns` becomes a feature; rows keep file
    /// order and any missing cell is rejected.
    pub fn load_dataset(path: &Path, target: &str, drop_columns: &[&str]) -> Result<Dataset, StockfitError> {
        let mut rdr = csv::Reader::from_path(path).map_err(|e| with_path(path, e))?;
        let headers = rdr.headers().map_err(|e| with_path(path, e))?.clone();

        let target_idx = headers.iter().position(|h| h == target).ok_or_else(|| {
            StockfitError::shape(format!("{} has no target column {target}", path.display()))
        })?;
        let feature_idx: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != target_idx && *h != DATE_COLUMN && !drop_columns.contains(h))
            .map(|(i, _)| i)
            .collect();

        let mut flat = Vec::new();
        let mut target_values = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| with_path(path, e))?;
            let cell = |i: usize| -> Result<f64, StockfitError> {
                match parse_cell(record.get(i).unwrap_or_default(), &headers[i], path, line)? {
                    Some(v) if v.is_finite() => Ok(v),
                    Some(v) => Err(StockfitError::shape(format!(
                        "{} row {}: non-finite {} value {v}",
                        path.display(),
                        line + 1,
                        &headers[i]
                    ))),
                    None => Err(StockfitError::shape(format!(
                        "{} row {}: missing {} value",
                        path.display(),
                        line + 1,
                        &headers[i]
                    ))),
                }
            };
            for &i in &feature_idx {
                flat.push(cell(i)?);
            }
            target_values.push(cell(target_idx)?);
        }

        let features = Array2::from_shape_vec((target_values.len(), feature_idx.len()), flat)
            .map_err(|e| StockfitError::shape(e.to_string()))?;
        debug!(
            path = %path.display(),
            rows = target_values.len(),
            features = feature_idx.len(),
            "loaded dataset"
        );
        Dataset::new(
            feature_idx.iter().map(|&i| headers[i].to_string()).collect(),
            features,
            Array1::from(target_values),
        )
    }
}

fn with_path(path: &Path, err: csv::Error) -> StockfitError {
    StockfitError::Csv {
        reason: format!("{}: {err}", path.display()),
    }
}

fn parse_cell(raw: &str, column: &str, path: &Path, line: usize) -> Result<Option<f64>, StockfitError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|e| StockfitError::Csv {
        reason: format!(
            "{} row {}: invalid {column} value {raw:?}: {e}",
            path.display(),
            line + 1
        ),
    })
}

impl TableStore for CsvTableStore {
    fn write_table(&self, name: &str, table: &PriceTable) -> Result<PathBuf, StockfitError> {
        let path = self.csv_path(name);
        Self::write_table_at(&path, table)?;
        Ok(path)
    }

    fn read_table(&self, name: &str, ticker: &str) -> Result<PriceTable, StockfitError> {
        Self::read_table_at(&self.csv_path(name), ticker)
    }
}
