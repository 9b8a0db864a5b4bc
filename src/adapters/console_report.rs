//! Stdout reporter for the pipeline progress and validation lines.

use crate::domain::ml::metrics::Evaluation;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use std::path::Path;

/// Renders every report line as text. [`ConsoleReporter`] prints them;
/// the line builders are public so other sinks can reuse the wording.
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn shape_line(ticker: &str, shape: (usize, usize)) -> String {
        format!("Shape del DataFrame para {ticker}: ({}, {})", shape.0, shape.1)
    }

    pub fn date_range_line(ticker: &str, first: NaiveDate, last: NaiveDate) -> String {
        format!("Rango de fechas para {ticker}: {first} a {last}")
    }

    pub fn indicators_line(ticker: &str, columns: &[&str]) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| format!("'{c}'")).collect();
        format!("Indicadores calculados para {ticker}: [{}]", quoted.join(", "))
    }

    pub fn saved_line(path: &Path) -> String {
        format!("Datos guardados en {}", path.display())
    }

    pub fn merged_saved_line(suffix: &str, path: &Path) -> String {
        format!("Datos con {suffix} guardados en {}", path.display())
    }

    /// Heading plus the RMSE and R² lines, two decimals each.
    pub fn evaluation_lines(family: &str, evaluation: &Evaluation) -> [String; 3] {
        [
            format!("\n{family} (Validación):"),
            format!("RMSE: {:.2}", evaluation.rmse),
            format!("R²: {:.2}", evaluation.r2),
        ]
    }
}

impl ReportPort for ConsoleReporter {
    fn series_loaded(&self, ticker: &str, shape: (usize, usize), first: NaiveDate, last: NaiveDate) {
        println!("{}", Self::shape_line(ticker, shape));
        println!("{}", Self::date_range_line(ticker, first, last));
    }

    fn indicators_added(&self, ticker: &str, columns: &[&str]) {
        println!("{}", Self::indicators_line(ticker, columns));
    }

    fn table_saved(&self, path: &Path) {
        println!("{}", Self::saved_line(path));
    }

    fn merged_table_saved(&self, suffix: &str, path: &Path) {
        println!("{}", Self::merged_saved_line(suffix, path));
    }

    fn evaluation(&self, family: &str, evaluation: &Evaluation) {
        for line in Self::evaluation_lines(family, evaluation) {
            println!("{line}");
        }
    }
}
