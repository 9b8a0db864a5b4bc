//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: A time series of indicator values
//!
//! Every calculation is a pure function of the bars; points inside the
//! warm-up window carry `valid == false`.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::fmt;

pub use ema::calculate_ema;

#[derive(Debug, Clone)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

/// The fixed indicator set appended to every ingested table, in column order.
pub fn standard_set() -> Vec<IndicatorType> {
    vec![
        IndicatorType::Sma(20),
        IndicatorType::Sma(50),
        IndicatorType::Rsi(14),
        IndicatorType::Macd {
            fast: macd::DEFAULT_FAST,
            slow: macd::DEFAULT_SLOW,
            signal: macd::DEFAULT_SIGNAL,
        },
        IndicatorType::Bollinger {
            period: bollinger::DEFAULT_PERIOD,
            stddev_mult_x100: bollinger::DEFAULT_MULT_X100,
        },
    ]
}

impl IndicatorType {
    pub fn calculate(&self, bars: &[OhlcvBar]) -> IndicatorSeries {
        match *self {
            IndicatorType::Sma(period) => sma::calculate_sma(bars, period),
            IndicatorType::Rsi(period) => rsi::calculate_rsi(bars, period),
            IndicatorType::Macd { fast, slow, signal } => {
                macd::calculate_macd(bars, fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => bollinger::calculate_bollinger(bars, period, stddev_mult_x100),
        }
    }

    /// Output column names, one per component.
    pub fn column_names(&self) -> Vec<String> {
        match self {
            IndicatorType::Sma(p) => vec![format!("SMA_{p}")],
            IndicatorType::Rsi(p) => vec![format!("RSI_{p}")],
            IndicatorType::Macd { fast, slow, signal } => vec![
                format!("MACD_{fast}_{slow}_{signal}"),
                format!("MACDh_{fast}_{slow}_{signal}"),
                format!("MACDs_{fast}_{slow}_{signal}"),
            ],
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                vec![
                    format!("BBL_{period}_{mult:.1}"),
                    format!("BBM_{period}_{mult:.1}"),
                    format!("BBU_{period}_{mult:.1}"),
                ]
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Split the series into named columns aligned with the input bars.
    /// Warm-up points become `None`.
    ///
    /// The MACD line is defined once the slow EMA is, ahead of the signal
    /// and histogram.
    pub fn into_columns(self) -> Vec<(String, Vec<Option<f64>>)> {
        let names = self.indicator_type.column_names();
        let mut columns: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(self.values.len()); names.len()];

        let line_warmup = match self.indicator_type {
            IndicatorType::Macd { fast, slow, .. } => fast.max(slow).saturating_sub(1),
            _ => 0,
        };

        for (i, point) in self.values.iter().enumerate() {
            let valid = point.valid;
            let keep = |v: f64| if valid { Some(v) } else { None };
            match point.value {
                IndicatorValue::Simple(v) => columns[0].push(keep(v)),
                IndicatorValue::Macd {
                    line,
                    signal,
                    histogram,
                } => {
                    columns[0].push(if i >= line_warmup { Some(line) } else { None });
                    columns[1].push(keep(histogram));
                    columns[2].push(keep(signal));
                }
                IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                } => {
                    columns[0].push(keep(lower));
                    columns[1].push(keep(middle));
                    columns[2].push(keep(upper));
                }
            }
        }

        names.into_iter().zip(columns).collect()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::make_bars;
    use super::*;

    #[test]
    fn indicator_type_display_sma() {
        assert_eq!(IndicatorType::Sma(20).to_string(), "SMA(20)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn standard_set_column_names_in_order() {
        let names: Vec<String> = standard_set()
            .iter()
            .flat_map(|t| t.column_names())
            .collect();
        assert_eq!(
            names,
            vec![
                "SMA_20",
                "SMA_50",
                "RSI_14",
                "MACD_12_26_9",
                "MACDh_12_26_9",
                "MACDs_12_26_9",
                "BBL_20_2.0",
                "BBM_20_2.0",
                "BBU_20_2.0",
            ]
        );
    }

    #[test]
    fn into_columns_marks_warmup_missing() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let columns = IndicatorType::Sma(3).calculate(&bars).into_columns();
        assert_eq!(columns.len(), 1);
        let (name, values) = &columns[0];
        assert_eq!(name, "SMA_3");
        assert_eq!(values[0], None);
        assert_eq!(values[1], None);
        assert_eq!(values[2], Some(2.0));
        assert_eq!(values[3], Some(3.0));
    }

    #[test]
    fn macd_line_defined_before_signal() {
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&prices);
        let columns = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        }
        .calculate(&bars)
        .into_columns();

        let line = &columns[0].1;
        let hist = &columns[1].1;
        let signal = &columns[2].1;
        assert!(line[24].is_none());
        assert!(line[25].is_some());
        assert!(signal[32].is_none());
        assert!(signal[33].is_some());
        assert!(hist[33].is_some());
    }
}
