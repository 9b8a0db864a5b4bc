//! Ingestion pipeline: fetch, cut off, derive indicators, merge a benchmark
//! and persist.

use crate::domain::error::StockfitError;
use crate::domain::indicator::standard_set;
use crate::domain::merge::{DEFAULT_SUFFIX, merge_benchmark};
use crate::domain::ohlcv::PriceSeries;
use crate::domain::table::{BASE_COLUMNS, PriceTable};
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::report_port::ReportPort;
use crate::ports::table_store::TableStore;
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const VALID_PERIODS: [&str; 11] = [
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

/// How far back to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryWindow {
    Period(String),
    Range { start: NaiveDate, end: NaiveDate },
}

impl HistoryWindow {
    pub fn period(value: &str) -> Result<Self, String> {
        if VALID_PERIODS.contains(&value) {
            Ok(HistoryWindow::Period(value.to_string()))
        } else {
            Err(format!(
                "unknown period '{}' (expected one of {})",
                value,
                VALID_PERIODS.join(", ")
            ))
        }
    }

    pub fn range(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start >= end {
            return Err(format!("start {} must be before end {}", start, end));
        }
        Ok(HistoryWindow::Range { start, end })
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        HistoryWindow::Period("max".to_string())
    }
}

/// Bar spacing accepted by the provider.
///
/// Tables are indexed by trading date, so only daily or coarser bars are
/// supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    #[default]
    Day1,
    Day5,
    Week1,
    Month1,
    Month3,
}

/// Provider intervals finer than a day.
const INTRADAY: [&str; 8] = ["1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h"];

impl Interval {
    pub const ALL: [Interval; 5] = [
        Interval::Day1,
        Interval::Day5,
        Interval::Week1,
        Interval::Month1,
        Interval::Month3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Day1 => "1d",
            Interval::Day5 => "5d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
            Interval::Month3 => "3mo",
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if INTRADAY.contains(&s) {
            return Err(format!(
                "intraday interval '{s}' is not supported; tables hold one row per date"
            ));
        }
        Interval::ALL
            .iter()
            .copied()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| format!("unknown interval '{}'", s))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRequest {
    pub ticker: String,
    pub window: HistoryWindow,
    pub interval: Interval,
    pub auto_adjust: bool,
    pub prepost: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkMerge {
    pub ticker: String,
    pub suffix: String,
    /// Keep indicator columns in the merged output.
    pub with_indicators: bool,
}

impl BenchmarkMerge {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            suffix: DEFAULT_SUFFIX.to_string(),
            with_indicators: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    pub tickers: Vec<String>,
    pub window: HistoryWindow,
    pub interval: Interval,
    /// Inclusive cutoff.
    pub end_date: NaiveDate,
    pub save: bool,
    /// Drop rows still inside an indicator warm-up window.
    pub drop_warmup: bool,
    pub benchmark: Option<BenchmarkMerge>,
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// One table per ticker, in request order.
    pub tables: Vec<PriceTable>,
    /// Benchmark-merged tables, one per non-benchmark ticker.
    pub merged: Vec<PriceTable>,
    pub written: Vec<PathBuf>,
}

impl IngestOutcome {
    pub fn table(&self, ticker: &str) -> Option<&PriceTable> {
        self.tables.iter().find(|t| t.ticker == ticker)
    }

    pub fn merged_table(&self, ticker: &str) -> Option<&PriceTable> {
        self.merged.iter().find(|t| t.ticker == ticker)
    }
}

/// Tickers in fetch order: the configured ones, then the benchmark if it was
/// not listed.
fn fetch_order(request: &IngestRequest) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::with_capacity(request.tickers.len() + 1);
    for ticker in &request.tickers {
        if !tickers.contains(ticker) {
            tickers.push(ticker.clone());
        }
    }
    if let Some(bench) = &request.benchmark {
        if !tickers.contains(&bench.ticker) {
            tickers.push(bench.ticker.clone());
        }
    }
    tickers
}

fn load_series(
    provider: &dyn MarketDataPort,
    request: &IngestRequest,
    ticker: &str,
) -> Result<PriceSeries, StockfitError> {
    let history = HistoryRequest {
        ticker: ticker.to_string(),
        window: request.window.clone(),
        interval: request.interval,
        auto_adjust: true,
        prepost: false,
    };
    let bars = provider.fetch_history(&history)?;
    if bars.is_empty() {
        return Err(StockfitError::EmptySeries {
            ticker: ticker.to_string(),
        });
    }
    debug!(ticker, bars = bars.len(), "provider returned bars");

    let series = PriceSeries::new(ticker, bars).truncate_to(request.end_date);
    if series.is_empty() {
        return Err(StockfitError::EmptySeries {
            ticker: ticker.to_string(),
        });
    }
    Ok(series)
}

/// Base table plus the standard indicator stages, in column order.
pub fn build_table(series: &PriceSeries) -> Result<PriceTable, StockfitError> {
    let mut table = PriceTable::from_series(series);
    for indicator in standard_set() {
        table = table.with_indicator(&indicator)?;
    }
    Ok(table)
}

/// Run the ingestion pipeline.
///
/// Every ticker is fetched and built before any benchmark merge starts; a
/// failure for any ticker aborts the run. With `drop_warmup`, the benchmark
/// columns are joined from the benchmark's full table, so its own warm-up
/// rows still supply prices.
pub fn ingest(
    provider: &dyn MarketDataPort,
    store: &dyn TableStore,
    report: &dyn ReportPort,
    request: &IngestRequest,
) -> Result<IngestOutcome, StockfitError> {
    let mut outcome = IngestOutcome::default();
    let mut benchmark_full: Option<PriceTable> = None;

    for ticker in fetch_order(request) {
        let series = load_series(provider, request, &ticker)?;
        let base = PriceTable::from_series(&series);
        if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
            info!(ticker = %ticker, rows = series.len(), %first, %last, "series loaded");
            report.series_loaded(&ticker, base.shape(), first, last);
        }

        let full = build_table(&series)?;
        let table = if request.drop_warmup {
            let kept = full.drop_incomplete_rows();
            if kept.row_count() == 0 {
                warn!(ticker = %ticker, rows = full.row_count(), "no row survives the warm-up window");
                return Err(StockfitError::EmptySeries { ticker });
            }
            debug!(ticker = %ticker, rows = kept.row_count(), "warm-up rows dropped");
            kept
        } else {
            full.clone()
        };

        if request.save {
            let path = store.write_table(&format!("{ticker}_data"), &table)?;
            info!(ticker = %ticker, path = %path.display(), "table saved");
            report.table_saved(&path);
            outcome.written.push(path);
        }
        report.indicators_added(&ticker, &table.derived_column_names());

        if request.benchmark.as_ref().is_some_and(|b| b.ticker == ticker) {
            benchmark_full = Some(full);
        }
        outcome.tables.push(table);
    }

    if let Some(bench) = &request.benchmark {
        let benchmark = benchmark_full.ok_or_else(|| StockfitError::EmptySeries {
            ticker: bench.ticker.clone(),
        })?;
        merge_all(&mut outcome, store, report, bench, &benchmark, request.save)?;
    }

    Ok(outcome)
}

fn merge_all(
    outcome: &mut IngestOutcome,
    store: &dyn TableStore,
    report: &dyn ReportPort,
    bench: &BenchmarkMerge,
    benchmark: &PriceTable,
    save: bool,
) -> Result<(), StockfitError> {
    for table in outcome.tables.iter().filter(|t| t.ticker != bench.ticker) {
        let left = if bench.with_indicators {
            table.clone()
        } else {
            table.select(&BASE_COLUMNS)?
        };
        let merged = merge_benchmark(&left, benchmark, &bench.suffix)?;
        debug!(ticker = %merged.ticker, columns = merged.columns().len(), "benchmark merged");

        if save {
            let name = format!("{}_with_{}", merged.ticker, bench.suffix);
            let path = store.write_table(&name, &merged)?;
            info!(ticker = %merged.ticker, path = %path.display(), "merged table saved");
            report.merged_table_saved(&bench.suffix, &path);
            outcome.written.push(path);
        }
        outcome.merged.push(merged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_validation() {
        assert_eq!(
            HistoryWindow::period("5y").unwrap(),
            HistoryWindow::Period("5y".into())
        );
        assert!(HistoryWindow::period("7y").is_err());
        assert_eq!(HistoryWindow::default(), HistoryWindow::Period("max".into()));
    }

    #[test]
    fn range_must_be_ordered() {
        let a = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(HistoryWindow::range(a, b).is_ok());
        assert!(HistoryWindow::range(b, a).is_err());
    }

    #[test]
    fn interval_parses_every_variant() {
        for interval in Interval::ALL {
            assert_eq!(interval.as_str().parse::<Interval>().unwrap(), interval);
        }
        assert!("2h".parse::<Interval>().unwrap_err().starts_with("unknown"));
        assert_eq!(Interval::default().to_string(), "1d");
    }

    #[test]
    fn intraday_intervals_are_rejected() {
        for raw in ["1m", "5m", "60m", "90m", "1h"] {
            let err = raw.parse::<Interval>().unwrap_err();
            assert!(err.contains("intraday"), "{raw}: {err}");
        }
    }

    #[test]
    fn fetch_order_appends_unlisted_benchmark() {
        let request = IngestRequest {
            tickers: vec!["AAPL".into(), "MSFT".into(), "AAPL".into()],
            window: HistoryWindow::default(),
            interval: Interval::Day1,
            end_date: NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
            save: false,
            drop_warmup: false,
            benchmark: Some(BenchmarkMerge::new("^GSPC")),
        };
        assert_eq!(fetch_order(&request), vec!["AAPL", "MSFT", "^GSPC"]);
    }
}
