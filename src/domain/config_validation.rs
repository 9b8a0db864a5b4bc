//! Configuration validation.
//!
//! Reads and checks the `[ingest]`, `[provider]` and `[train]` sections
//! before any work starts, producing typed settings.

use crate::domain::error::StockfitError;
use crate::domain::ingest::{BenchmarkMerge, HistoryWindow, IngestRequest, Interval};
use crate::domain::merge::DEFAULT_SUFFIX;
use crate::domain::ml::DEFAULT_SEED;
use crate::domain::ml::family::ModelFamily;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::path::PathBuf;

pub const DEFAULT_TICKERS: [&str; 3] = ["^GSPC", "AAPL", "MSFT"];
pub const DEFAULT_BENCHMARK: &str = "^GSPC";
pub const DEFAULT_END_DATE: &str = "2025-02-28";
pub const DEFAULT_OUTPUT_DIR: &str = "./data/raw";
pub const DEFAULT_TARGET: &str = "Close";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSettings {
    pub request: IngestRequest,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainSettings {
    pub train_path: PathBuf,
    pub valid_path: PathBuf,
    pub target: String,
    pub drop_columns: Vec<String>,
    /// Families to train, in report order.
    pub families: Vec<ModelFamily>,
    pub seed: u64,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> StockfitError {
    StockfitError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn missing(section: &str, key: &str) -> StockfitError {
    StockfitError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_date(value: &str, section: &str, field: &str) -> Result<NaiveDate, StockfitError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| invalid(section, field, format!("invalid {field} format, expected YYYY-MM-DD")))
}

fn positive_int(config: &dyn ConfigPort, section: &str, key: &str, default: i64) -> Result<i64, StockfitError> {
    let value = config.get_int(section, key, default);
    if value < 1 {
        return Err(invalid(section, key, format!("{key} must be at least 1")));
    }
    Ok(value)
}

pub fn validate_ingest_config(config: &dyn ConfigPort) -> Result<IngestSettings, StockfitError> {
    let mut tickers = config.get_list("ingest", "tickers");
    if tickers.is_empty() {
        if config.get_string("ingest", "tickers").is_some() {
            return Err(invalid("ingest", "tickers", "tickers must list at least one symbol"));
        }
        tickers = DEFAULT_TICKERS.iter().map(|t| t.to_string()).collect();
    }

    let window = validate_window(config)?;
    let interval = match non_empty(config, "ingest", "interval") {
        Some(raw) => raw
            .parse::<Interval>()
            .map_err(|reason| invalid("ingest", "interval", reason))?,
        None => Interval::default(),
    };
    let end_date = parse_date(
        &non_empty(config, "ingest", "end_date").unwrap_or_else(|| DEFAULT_END_DATE.to_string()),
        "ingest",
        "end_date",
    )?;

    let benchmark = match config.get_string("ingest", "benchmark") {
        // an explicitly empty value turns the merge off
        Some(raw) if raw.trim().is_empty() => None,
        Some(raw) => Some(raw.trim().to_string()),
        None => Some(DEFAULT_BENCHMARK.to_string()),
    };
    let benchmark = match benchmark {
        Some(ticker) => {
            let suffix = non_empty(config, "ingest", "suffix").unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
            if !suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid(
                    "ingest",
                    "suffix",
                    "suffix may only contain letters, digits and underscores",
                ));
            }
            Some(BenchmarkMerge {
                ticker,
                suffix,
                with_indicators: config.get_bool("ingest", "merge_with_indicators", true),
            })
        }
        None => None,
    };

    let output_dir = non_empty(config, "ingest", "output_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    Ok(IngestSettings {
        request: IngestRequest {
            tickers,
            window,
            interval,
            end_date,
            save: config.get_bool("ingest", "save", true),
            drop_warmup: config.get_bool("ingest", "drop_warmup", false),
            benchmark,
        },
        output_dir,
    })
}

fn validate_window(config: &dyn ConfigPort) -> Result<HistoryWindow, StockfitError> {
    let start = non_empty(config, "ingest", "start");
    let end = non_empty(config, "ingest", "end");
    match (start, end) {
        (Some(start), Some(end)) => {
            if config.get_string("ingest", "period").is_some() {
                return Err(invalid("ingest", "period", "set either period or start/end, not both"));
            }
            let start = parse_date(&start, "ingest", "start")?;
            let end = parse_date(&end, "ingest", "end")?;
            HistoryWindow::range(start, end).map_err(|reason| invalid("ingest", "start", reason))
        }
        (Some(_), None) => Err(missing("ingest", "end")),
        (None, Some(_)) => Err(missing("ingest", "start")),
        (None, None) => match non_empty(config, "ingest", "period") {
            Some(period) => HistoryWindow::period(&period).map_err(|reason| invalid("ingest", "period", reason)),
            None => Ok(HistoryWindow::default()),
        },
    }
}

pub fn validate_provider_config(config: &dyn ConfigPort) -> Result<ProviderSettings, StockfitError> {
    let base_url = non_empty(config, "provider", "base_url");
    if let Some(url) = &base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("provider", "base_url", "base_url must be an http(s) URL"));
        }
    }

    let max_retries = config.get_int("provider", "max_retries", 4);
    if !(0..=10).contains(&max_retries) {
        return Err(invalid("provider", "max_retries", "max_retries must be between 0 and 10"));
    }

    Ok(ProviderSettings {
        base_url,
        timeout_secs: positive_int(config, "provider", "timeout_secs", 30)? as u64,
        max_retries: max_retries as u32,
        retry_base_ms: positive_int(config, "provider", "retry_base_ms", 200)? as u64,
    })
}

pub fn validate_train_config(config: &dyn ConfigPort) -> Result<TrainSettings, StockfitError> {
    let train_path = non_empty(config, "train", "train_path").ok_or_else(|| missing("train", "train_path"))?;
    let valid_path = non_empty(config, "train", "valid_path").ok_or_else(|| missing("train", "valid_path"))?;
    let target = non_empty(config, "train", "target").unwrap_or_else(|| DEFAULT_TARGET.to_string());

    let drop_columns = config.get_list("train", "drop_columns");
    if drop_columns.contains(&target) {
        return Err(invalid("train", "drop_columns", format!("cannot drop the target column {target}")));
    }

    let families = match non_empty(config, "train", "family") {
        None => ModelFamily::ALL.to_vec(),
        Some(raw) if raw.eq_ignore_ascii_case("all") => ModelFamily::ALL.to_vec(),
        Some(_) => config
            .get_list("train", "family")
            .iter()
            .map(|f| f.parse::<ModelFamily>())
            .collect::<Result<Vec<_>, _>>()?,
    };

    let seed = config.get_int("train", "seed", DEFAULT_SEED as i64);
    if seed < 0 {
        return Err(invalid("train", "seed", "seed must be non-negative"));
    }

    Ok(TrainSettings {
        train_path: PathBuf::from(train_path),
        valid_path: PathBuf::from(valid_path),
        target,
        drop_columns,
        families,
        seed: seed as u64,
    })
}
