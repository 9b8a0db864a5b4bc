#![allow(dead_code)]

use chrono::NaiveDate;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use stockfit::adapters::console_report::ConsoleReporter;
use stockfit::domain::error::StockfitError;
use stockfit::domain::ingest::HistoryRequest;
use stockfit::domain::ml::dataset::{Dataset, TrainValidSplit};
use stockfit::domain::ml::metrics::Evaluation;
use stockfit::domain::table::PriceTable;
pub use stockfit::domain::ohlcv::OhlcvBar;
use stockfit::ports::market_data_port::MarketDataPort;
use stockfit::ports::report_port::ReportPort;

/// In-memory provider keyed by ticker. Records every request it receives.
pub struct MockProvider {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
    pub requests: RefCell<Vec<HistoryRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    pub fn requested_tickers(&self) -> Vec<String> {
        self.requests.borrow().iter().map(|r| r.ticker.clone()).collect()
    }
}

impl MarketDataPort for MockProvider {
    fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<OhlcvBar>, StockfitError> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(reason) = self.errors.get(&request.ticker) {
            return Err(StockfitError::Provider {
                ticker: request.ticker.clone(),
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(&request.ticker).cloned().unwrap_or_default())
    }
}

/// Collects the console lines instead of printing them.
#[derive(Default)]
pub struct RecordingReporter {
    pub lines: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    fn push(&self, line: String) {
        self.lines.borrow_mut().push(line);
    }
}

impl ReportPort for RecordingReporter {
    fn series_loaded(&self, ticker: &str, shape: (usize, usize), first: NaiveDate, last: NaiveDate) {
        self.push(ConsoleReporter::shape_line(ticker, shape));
        self.push(ConsoleReporter::date_range_line(ticker, first, last));
    }

    fn indicators_added(&self, ticker: &str, columns: &[&str]) {
        self.push(ConsoleReporter::indicators_line(ticker, columns));
    }

    fn table_saved(&self, path: &Path) {
        self.push(ConsoleReporter::saved_line(path));
    }

    fn merged_table_saved(&self, suffix: &str, path: &Path) {
        self.push(ConsoleReporter::merged_saved_line(suffix, path));
    }

    fn evaluation(&self, family: &str, evaluation: &Evaluation) {
        for line in ConsoleReporter::evaluation_lines(family, evaluation) {
            self.push(line);
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Value of `column` on `date`, `None` when either is absent or the cell is
/// missing.
pub fn cell(table: &PriceTable, column: &str, date: NaiveDate) -> Option<f64> {
    let row = table.row_index(date)?;
    table.column(column).and_then(|c| c.values[row])
}

/// `count` daily bars from `start`, with a gently oscillating close.
pub fn generate_bars(start: NaiveDate, count: usize, start_price: f64) -> Vec<OhlcvBar> {
    (0..count)
        .map(|i| {
            let close = start_price + i as f64 * 0.5 + (i as f64 * 0.7).sin() * 3.0;
            OhlcvBar {
                date: start + chrono::Duration::days(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.5,
                close,
                volume: 1_000 + (i as i64 % 7) * 100,
            }
        })
        .collect()
}

/// `y = 3 * x1 + 0.5 * x2`, with `x3` as an unused noise feature. Validation
/// features stay inside the training range.
pub fn synthetic_split(n_train: usize, n_valid: usize, seed: u64) -> TrainValidSplit {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut make = |n: usize, lo: f64, hi: f64| {
        let x = Array2::from_shape_fn((n, 3), |_| rng.gen_range(lo..hi));
        let y: Array1<f64> = x.rows().into_iter().map(|r| 3.0 * r[0] + 0.5 * r[1]).collect();
        Dataset::new(vec!["x1".into(), "x2".into(), "x3".into()], x, y).unwrap()
    };
    let train = make(n_train, 0.0, 10.0);
    let valid = make(n_valid, 0.5, 9.5);
    TrainValidSplit::new(train, valid).unwrap()
}

/// Write `data` as a CSV with the feature columns followed by `target`.
pub fn write_dataset_csv(path: &Path, data: &Dataset, target: &str) {
    let mut wtr = csv::Writer::from_path(path).unwrap();
    let mut header = data.feature_names.clone();
    header.push(target.to_string());
    wtr.write_record(&header).unwrap();
    for (row, y) in data.features.rows().into_iter().zip(data.target.iter()) {
        let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        record.push(y.to_string());
        wtr.write_record(&record).unwrap();
    }
    wtr.flush().unwrap();
}
