//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use crate::adapters::console_report::ConsoleReporter;
use crate::adapters::csv_adapter::CsvTableStore;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::retry::{Backoff, RetryConfig};
use crate::adapters::yahoo_adapter::{DEFAULT_BASE_URL, YahooAdapter};
use crate::domain::config_validation::{
    IngestSettings, ProviderSettings, TrainSettings, validate_ingest_config, validate_provider_config,
    validate_train_config,
};
use crate::domain::error::StockfitError;
use crate::domain::ingest::ingest;
use crate::domain::ml::dataset::TrainValidSplit;
use crate::domain::ml::family::ModelFamily;
use crate::domain::ml::train::train_families;
use crate::ports::config_port::ConfigPort;

#[derive(Parser, Debug)]
#[command(name = "stockfit", about = "Stock price ingestion and regression model fitting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download price history, compute indicators and save the tables
    Ingest {
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Replaces the configured tickers; repeat for several
        #[arg(long)]
        ticker: Vec<String>,
        /// Inclusive cutoff date (YYYY-MM-DD)
        #[arg(long)]
        end_date: Option<NaiveDate>,
        /// Keep the tables in memory only
        #[arg(long)]
        no_save: bool,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Fit model families on prepared train/validation files
    Train {
        #[arg(short, long)]
        config: PathBuf,
        /// One family key, a comma-separated list, or `all`
        #[arg(long)]
        family: Option<String>,
    },
    /// Validate a configuration file without running anything
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Ingest {
            config,
            ticker,
            end_date,
            no_save,
            output,
        } => run_ingest(
            config.as_deref(),
            &IngestOverrides {
                tickers: ticker,
                end_date,
                no_save,
                output,
            },
        ),
        Command::Train { config, family } => run_train(&config, family.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn report_error(err: &StockfitError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| report_error(&e))
}

/// Command-line values that take precedence over the `[ingest]` section.
#[derive(Debug, Clone, Default)]
pub struct IngestOverrides {
    pub tickers: Vec<String>,
    pub end_date: Option<NaiveDate>,
    pub no_save: bool,
    pub output: Option<PathBuf>,
}

impl IngestOverrides {
    pub fn apply(&self, settings: &mut IngestSettings) {
        if !self.tickers.is_empty() {
            settings.request.tickers = self.tickers.clone();
        }
        if let Some(end_date) = self.end_date {
            settings.request.end_date = end_date;
        }
        if self.no_save {
            settings.request.save = false;
        }
        if let Some(output) = &self.output {
            settings.output_dir = output.clone();
        }
    }
}

pub fn retry_config(settings: &ProviderSettings) -> RetryConfig {
    RetryConfig {
        enabled: settings.max_retries > 0,
        max_retries: settings.max_retries,
        backoff: Backoff {
            base: Duration::from_millis(settings.retry_base_ms),
            ..Backoff::default()
        },
        ..RetryConfig::default()
    }
}

pub fn build_provider(settings: &ProviderSettings) -> Result<YahooAdapter, StockfitError> {
    YahooAdapter::new(
        settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL),
        Duration::from_secs(settings.timeout_secs),
        retry_config(settings),
    )
}

fn run_ingest(config_path: Option<&Path>, overrides: &IngestOverrides) -> ExitCode {
    let adapter = match config_path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            match load_config(path) {
                Ok(a) => a,
                Err(code) => return code,
            }
        }
        None => match FileConfigAdapter::from_string("") {
            Ok(a) => a,
            Err(e) => return report_error(&e),
        },
    };

    let mut settings = match validate_ingest_config(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    overrides.apply(&mut settings);
    let provider_settings = match validate_provider_config(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    let provider = match build_provider(&provider_settings) {
        Ok(p) => p,
        Err(e) => return report_error(&e),
    };
    let store = CsvTableStore::new(&settings.output_dir);

    info!(
        tickers = %settings.request.tickers.join(","),
        end_date = %settings.request.end_date,
        "starting ingestion"
    );
    match ingest(&provider, &store, &ConsoleReporter, &settings.request) {
        Ok(outcome) => {
            info!(
                tables = outcome.tables.len(),
                merged = outcome.merged.len(),
                files = outcome.written.len(),
                "ingestion complete"
            );
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

/// Families named on the command line, or `None` to keep the configured ones.
pub fn parse_family_override(raw: Option<&str>) -> Result<Option<Vec<ModelFamily>>, StockfitError> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    if raw.eq_ignore_ascii_case("all") {
        return Ok(Some(ModelFamily::ALL.to_vec()));
    }
    raw.split(',')
        .map(|f| f.parse::<ModelFamily>())
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

pub fn load_split(settings: &TrainSettings) -> Result<TrainValidSplit, StockfitError> {
    let drop: Vec<&str> = settings.drop_columns.iter().map(String::as_str).collect();
    let train = CsvTableStore::load_dataset(&settings.train_path, &settings.target, &drop)?;
    let valid = CsvTableStore::load_dataset(&settings.valid_path, &settings.target, &drop)?;
    info!(
        train = train.n_samples(),
        valid = valid.n_samples(),
        features = train.n_features(),
        target = %settings.target,
        "datasets loaded"
    );
    TrainValidSplit::new(train, valid)
}

fn run_train(config_path: &Path, family: Option<&str>) -> ExitCode {
    info!(path = %config_path.display(), "loading config");
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let mut settings = match validate_train_config(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    match parse_family_override(family) {
        Ok(Some(families)) => settings.families = families,
        Ok(None) => {}
        Err(e) => return report_error(&e),
    }

    let split = match load_split(&settings) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    match train_families(&settings.families, &split, settings.seed, &ConsoleReporter) {
        Ok(trained) => {
            for model in &trained {
                info!(family = model.family.key(), best_params = %model.best_params, "trained");
            }
            ExitCode::SUCCESS
        }
        Err(e) => report_error(&e),
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let ingest_settings = match validate_ingest_config(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };
    let provider_settings = match validate_provider_config(&adapter) {
        Ok(s) => s,
        Err(e) => return report_error(&e),
    };

    let request = &ingest_settings.request;
    eprintln!("\n[ingest]");
    eprintln!("  tickers:    {}", request.tickers.join(", "));
    eprintln!("  interval:   {}", request.interval);
    eprintln!("  end_date:   {}", request.end_date);
    eprintln!("  output_dir: {}", ingest_settings.output_dir.display());
    match &request.benchmark {
        Some(bench) => eprintln!("  benchmark:  {} (suffix {})", bench.ticker, bench.suffix),
        None => eprintln!("  benchmark:  none"),
    }
    eprintln!("\n[provider]");
    eprintln!(
        "  base_url:   {}",
        provider_settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    );
    eprintln!("  timeout:    {}s", provider_settings.timeout_secs);
    eprintln!("  retries:    {}", provider_settings.max_retries);

    let has_train = ["train_path", "valid_path"]
        .iter()
        .any(|key| adapter.get_string("train", key).is_some());
    if has_train {
        let train_settings = match validate_train_config(&adapter) {
            Ok(s) => s,
            Err(e) => return report_error(&e),
        };
        let families: Vec<&str> = train_settings.families.iter().map(|f| f.key()).collect();
        eprintln!("\n[train]");
        eprintln!("  train_path: {}", train_settings.train_path.display());
        eprintln!("  valid_path: {}", train_settings.valid_path.display());
        eprintln!("  target:     {}", train_settings.target);
        eprintln!("  families:   {}", families.join(", "));
    }

    eprintln!("\nConfig validated successfully");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let adapter = FileConfigAdapter::from_string("[ingest]\ntickers = AAPL\n").unwrap();
        let mut settings = validate_ingest_config(&adapter).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        IngestOverrides {
            tickers: vec!["MSFT".into(), "NVDA".into()],
            end_date: Some(end),
            no_save: true,
            output: Some(PathBuf::from("elsewhere")),
        }
        .apply(&mut settings);

        assert_eq!(settings.request.tickers, vec!["MSFT", "NVDA"]);
        assert_eq!(settings.request.end_date, end);
        assert!(!settings.request.save);
        assert_eq!(settings.output_dir, PathBuf::from("elsewhere"));
    }

    #[test]
    fn empty_overrides_keep_config() {
        let adapter = FileConfigAdapter::from_string("[ingest]\ntickers = AAPL\n").unwrap();
        let mut settings = validate_ingest_config(&adapter).unwrap();
        let before = settings.clone();
        IngestOverrides::default().apply(&mut settings);
        assert_eq!(settings, before);
    }

    #[test]
    fn family_override() {
        assert_eq!(parse_family_override(None).unwrap(), None);
        assert_eq!(
            parse_family_override(Some("all")).unwrap(),
            Some(ModelFamily::ALL.to_vec())
        );
        assert_eq!(
            parse_family_override(Some("adaboost,decision_tree")).unwrap(),
            Some(vec![ModelFamily::AdaBoost, ModelFamily::DecisionTree])
        );
        assert!(parse_family_override(Some("xgboost")).is_err());
    }

    #[test]
    fn retry_config_follows_provider_settings() {
        let settings = ProviderSettings {
            base_url: None,
            timeout_secs: 5,
            max_retries: 0,
            retry_base_ms: 50,
        };
        let retry = retry_config(&settings);
        assert!(!retry.enabled);
        assert!(!retry.allows(0));
        assert_eq!(retry.backoff.base, Duration::from_millis(50));
    }

    #[test]
    fn cli_parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "stockfit",
            "ingest",
            "--ticker",
            "AAPL",
            "--ticker",
            "MSFT",
            "--end-date",
            "2024-06-30",
            "--no-save",
        ])
        .unwrap();
        match cli.command {
            Command::Ingest {
                ticker,
                end_date,
                no_save,
                config,
                ..
            } => {
                assert_eq!(ticker, vec!["AAPL", "MSFT"]);
                assert_eq!(end_date, NaiveDate::from_ymd_opt(2024, 6, 30));
                assert!(no_save);
                assert!(config.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
