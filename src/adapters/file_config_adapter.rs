//! INI file configuration adapter.

use crate::domain::error::StockfitError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, StockfitError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| StockfitError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, StockfitError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| StockfitError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[ingest]
tickers = AAPL, MSFT, ^GSPC
period = 5y

[provider]
timeout_secs = 10

[train]
family = random_forest
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_list("ingest", "tickers"),
            vec!["AAPL".to_string(), "MSFT".to_string(), "^GSPC".to_string()]
        );
        assert_eq!(adapter.get_string("ingest", "period"), Some("5y".to_string()));
        assert_eq!(adapter.get_int("provider", "timeout_secs", 30), 10);
        assert_eq!(
            adapter.get_string("train", "family"),
            Some("random_forest".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string("[ingest]\nperiod = max\n").unwrap();
        assert_eq!(adapter.get_string("ingest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert!(adapter.get_list("ingest", "tickers").is_empty());
    }

    #[test]
    fn get_int_returns_default_for_missing_or_non_numeric() {
        let adapter =
            FileConfigAdapter::from_string("[provider]\nmax_retries = abc\n").unwrap();
        assert_eq!(adapter.get_int("provider", "max_retries", 4), 4);
        assert_eq!(adapter.get_int("provider", "missing", 42), 42);
    }

    #[test]
    fn get_double_returns_value() {
        let adapter = FileConfigAdapter::from_string("[train]\nratio = 0.25\n").unwrap();
        assert_eq!(adapter.get_double("train", "ratio", 0.0), 0.25);
        assert_eq!(adapter.get_double("train", "missing", 99.9), 99.9);
    }

    #[test]
    fn get_bool_accepts_common_spellings() {
        let adapter = FileConfigAdapter::from_string(
            "[ingest]\na = true\nb = yes\nc = 1\nd = false\ne = no\nf = 0\n",
        )
        .unwrap();
        assert!(adapter.get_bool("ingest", "a", false));
        assert!(adapter.get_bool("ingest", "b", false));
        assert!(adapter.get_bool("ingest", "c", false));
        assert!(!adapter.get_bool("ingest", "d", true));
        assert!(!adapter.get_bool("ingest", "e", true));
        assert!(!adapter.get_bool("ingest", "f", true));
        assert!(adapter.get_bool("ingest", "missing", true));
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[train]\ntrain_path = data/train.csv\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("train", "train_path"),
            Some("data/train.csv".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(StockfitError::ConfigParse { .. })));
    }
}
