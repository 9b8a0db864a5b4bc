//! Progress and result reporting port.

use crate::domain::ml::metrics::Evaluation;
use chrono::NaiveDate;
use std::path::Path;

/// Receives the user-facing lines emitted while the pipelines run.
pub trait ReportPort {
    fn series_loaded(&self, ticker: &str, shape: (usize, usize), first: NaiveDate, last: NaiveDate);

    fn indicators_added(&self, ticker: &str, columns: &[&str]);

    fn table_saved(&self, path: &Path);

    fn merged_table_saved(&self, suffix: &str, path: &Path);

    fn evaluation(&self, family: &str, evaluation: &Evaluation);
}
