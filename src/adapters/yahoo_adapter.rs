//! Yahoo Finance chart API adapter.

use crate::adapters::retry::RetryConfig;
use crate::domain::error::StockfitError;
use crate::domain::ingest::{HistoryRequest, HistoryWindow};
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::market_data_port::MarketDataPort;
use chrono::{DateTime, NaiveTime};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct YahooAdapter {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl YahooAdapter {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self, StockfitError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stockfit/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StockfitError::Provider {
                ticker: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            retry,
        })
    }

    fn url(&self, request: &HistoryRequest) -> Result<reqwest::Url, StockfitError> {
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| StockfitError::Provider {
            ticker: request.ticker.clone(),
            reason: format!("invalid base url {}: {}", self.base_url, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| StockfitError::Provider {
                ticker: request.ticker.clone(),
                reason: format!("base url {} cannot take a path", self.base_url),
            })?
            .push(&request.ticker);

        {
            let mut query = url.query_pairs_mut();
            match &request.window {
                HistoryWindow::Period(period) => {
                    query.append_pair("range", period);
                }
                HistoryWindow::Range { start, end } => {
                    let secs = |d: &chrono::NaiveDate| d.and_time(NaiveTime::MIN).and_utc().timestamp();
                    query.append_pair("period1", &secs(start).to_string());
                    query.append_pair("period2", &secs(end).to_string());
                }
            }
            query.append_pair("interval", request.interval.as_str());
            query.append_pair("includePrePost", if request.prepost { "true" } else { "false" });
            query.append_pair("events", "div|split");
        }
        Ok(url)
    }

    fn get_once(&self, ticker: &str, url: &reqwest::Url) -> Result<String, StockfitError> {
        let response = self.client.get(url.clone()).send().map_err(|e| {
            let reason = e.to_string();
            if e.is_timeout() || e.is_connect() {
                StockfitError::Network {
                    ticker: ticker.to_string(),
                    reason,
                }
            } else {
                StockfitError::Provider {
                    ticker: ticker.to_string(),
                    reason,
                }
            }
        })?;

        let status = response.status();
        if self.retry.should_retry_status(status.as_u16()) {
            return Err(StockfitError::Network {
                ticker: ticker.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            return Err(StockfitError::Provider {
                ticker: ticker.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        response.text().map_err(|e| StockfitError::Network {
            ticker: ticker.to_string(),
            reason: format!("failed to read body: {}", e),
        })
    }

    fn get_with_retry(&self, ticker: &str, url: &reqwest::Url) -> Result<String, StockfitError> {
        let mut attempt = 0;
        loop {
            match self.get_once(ticker, url) {
                Ok(body) => return Ok(body),
                Err(err) if err.is_transient() && self.retry.allows(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(ticker, attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying provider call");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl MarketDataPort for YahooAdapter {
    fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<OhlcvBar>, StockfitError> {
        let url = self.url(request)?;
        debug!(ticker = %request.ticker, %url, "fetching chart");
        let body = self.get_with_retry(&request.ticker, &url)?;
        parse_chart(&request.ticker, &body, request.auto_adjust)
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartData,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<i64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Decode a chart payload into bars dated in the exchange's local calendar.
///
/// Bars missing any OHLC value are skipped. With `auto_adjust` the prices
/// are scaled by `adjclose / close`.
fn parse_chart(ticker: &str, body: &str, auto_adjust: bool) -> Result<Vec<OhlcvBar>, StockfitError> {
    let provider_err = |reason: String| StockfitError::Provider {
        ticker: ticker.to_string(),
        reason,
    };

    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| provider_err(format!("malformed chart payload: {}", e)))?;

    if let Some(error) = response.chart.error {
        return Err(provider_err(format!(
            "chart API error {}: {}",
            error.code, error.description
        )));
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| provider_err("no chart result".to_string()))?;

    let Some(quote) = result.indicators.quote.first() else {
        return Ok(Vec::new());
    };
    let adjclose = result.indicators.adjclose.first().map(|a| &a.adjclose);

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
        ) else {
            continue;
        };

        let date = DateTime::from_timestamp(ts + result.meta.gmtoffset, 0)
            .ok_or_else(|| provider_err(format!("invalid timestamp {}", ts)))?
            .date_naive();
        let volume = quote.volume.get(i).copied().flatten().unwrap_or(0);

        let bar = OhlcvBar {
            date,
            open,
            high,
            low,
            close,
            volume,
        };
        let ratio = match (auto_adjust, adjclose.and_then(field)) {
            (true, Some(adj)) if close != 0.0 => adj / close,
            _ => 1.0,
        };
        bars.push(if ratio == 1.0 { bar } else { bar.adjusted(ratio) });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingest::Interval;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    const PAYLOAD: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "gmtoffset": -18000},
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{
                        "open": [100.0, null, 102.0],
                        "high": [110.0, 111.0, 112.0],
                        "low": [90.0, 91.0, 92.0],
                        "close": [105.0, 106.0, 100.0],
                        "volume": [1000, 2000, null]
                    }],
                    "adjclose": [{"adjclose": [52.5, 53.0, 100.0]}]
                }
            }],
            "error": null
        }
    }"#;

    fn request(window: HistoryWindow) -> HistoryRequest {
        HistoryRequest {
            ticker: "^GSPC".into(),
            window,
            interval: Interval::Day1,
            auto_adjust: true,
            prepost: false,
        }
    }

    #[test]
    fn parses_and_skips_incomplete_bars() {
        let bars = parse_chart("AAPL", PAYLOAD, false).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
        assert_eq!(bars[0].close, 105.0);
        assert_eq!(bars[1].volume, 0);
    }

    #[test]
    fn auto_adjust_scales_prices() {
        let bars = parse_chart("AAPL", PAYLOAD, true).unwrap();
        assert_abs_diff_eq!(bars[0].open, 50.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bars[0].high, 55.0, epsilon = 1e-12);
        assert_abs_diff_eq!(bars[0].close, 52.5, epsilon = 1e-12);
        assert_eq!(bars[0].volume, 1000);
        assert_abs_diff_eq!(bars[1].close, 100.0, epsilon = 1e-12);
    }

    #[test]
    fn api_error_fails_fast() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("NOPE", body, true).unwrap_err();
        assert!(matches!(err, StockfitError::Provider { .. }));
        assert!(err.to_string().contains("delisted"));
    }

    #[test]
    fn malformed_payload_is_provider_error() {
        let err = parse_chart("AAPL", "<html>", true).unwrap_err();
        assert!(matches!(err, StockfitError::Provider { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn url_for_period() {
        let adapter = YahooAdapter::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT, RetryConfig::no_retry()).unwrap();
        let url = adapter.url(&request(HistoryWindow::default())).unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/^GSPC");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("range".into(), "max".into())));
        assert!(pairs.contains(&("interval".into(), "1d".into())));
        assert!(pairs.contains(&("includePrePost".into(), "false".into())));
        assert!(pairs.contains(&("events".into(), "div|split".into())));
    }

    #[test]
    fn url_for_range() {
        let adapter = YahooAdapter::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT, RetryConfig::no_retry()).unwrap();
        let window = HistoryWindow::range(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
        .unwrap();
        let url = adapter.url(&request(window)).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("period1".into(), "1704067200".into())));
        assert!(pairs.contains(&("period2".into(), "1704153600".into())));
        assert!(!pairs.iter().any(|(k, _)| k == "range"));
    }
}
