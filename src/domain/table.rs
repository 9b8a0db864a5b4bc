//! Immutable per-ticker column table.
//!
//! Each transformation stage borrows a table and returns a new one, so the
//! order in which columns were derived stays visible in the column order.

use crate::domain::error::StockfitError;
use crate::domain::indicator::IndicatorType;
use crate::domain::ohlcv::{OhlcvBar, PriceSeries};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};

pub const DATE_COLUMN: &str = "Date";
pub const BASE_COLUMNS: [&str; 5] = ["Open", "High", "Low", "Close", "Volume"];

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

#[derive(Debug, Clone)]
pub struct PriceTable {
    pub ticker: String,
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    date_index: HashMap<NaiveDate, usize>,
}

impl PriceTable {
    /// Build a table, checking that dates strictly increase, that every
    /// column has one value per date and that column names are unique.
    pub fn new(
        ticker: impl Into<String>,
        dates: Vec<NaiveDate>,
        columns: Vec<Column>,
    ) -> Result<Self, StockfitError> {
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(StockfitError::shape(format!(
                "dates must be strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }

        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != dates.len() {
                return Err(StockfitError::shape(format!(
                    "column {} has {} values for {} dates",
                    column.name,
                    column.values.len(),
                    dates.len()
                )));
            }
            if column.name == DATE_COLUMN || !seen.insert(column.name.as_str()) {
                return Err(StockfitError::shape(format!(
                    "duplicate column {}",
                    column.name
                )));
            }
        }

        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Ok(Self {
            ticker: ticker.into(),
            dates,
            columns,
            date_index,
        })
    }

    pub fn from_series(series: &PriceSeries) -> Self {
        let bars = series.bars();
        let pick = |f: fn(&OhlcvBar) -> f64| -> Vec<Option<f64>> {
            bars.iter().map(|b| Some(f(b))).collect()
        };
        let columns = vec![
            Column::new("Open", pick(|b| b.open)),
            Column::new("High", pick(|b| b.high)),
            Column::new("Low", pick(|b| b.low)),
            Column::new("Close", pick(|b| b.close)),
            Column::new("Volume", pick(|b| b.volume as f64)),
        ];
        let dates: Vec<NaiveDate> = bars.iter().map(|b| b.date).collect();
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        Self {
            ticker: series.ticker.clone(),
            dates,
            columns,
            date_index,
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Columns after the base OHLCV block.
    pub fn derived_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .filter(|n| !BASE_COLUMNS.contains(n))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.dates.len()
    }

    /// (rows, columns) counting the date column.
    pub fn shape(&self) -> (usize, usize) {
        (self.dates.len(), self.columns.len() + 1)
    }

    pub fn row_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    /// Rebuild bars from the base columns. Fails when a base value is missing.
    pub fn bars(&self) -> Result<Vec<OhlcvBar>, StockfitError> {
        let base: Vec<&Column> = BASE_COLUMNS
            .iter()
            .map(|name| {
                self.column(name).ok_or_else(|| {
                    StockfitError::shape(format!("{} table has no {} column", self.ticker, name))
                })
            })
            .collect::<Result<_, _>>()?;

        self.dates
            .iter()
            .enumerate()
            .map(|(i, &date)| {
                let get = |c: &Column| {
                    c.values[i].ok_or_else(|| {
                        StockfitError::shape(format!(
                            "{} has a missing {} value on {}",
                            self.ticker, c.name, date
                        ))
                    })
                };
                Ok(OhlcvBar {
                    date,
                    open: get(base[0])?,
                    high: get(base[1])?,
                    low: get(base[2])?,
                    close: get(base[3])?,
                    volume: get(base[4])? as i64,
                })
            })
            .collect()
    }

    /// New table with `extra` appended after the existing columns.
    pub fn with_columns(&self, extra: Vec<Column>) -> Result<PriceTable, StockfitError> {
        let mut columns = self.columns.clone();
        columns.extend(extra);
        PriceTable::new(self.ticker.clone(), self.dates.clone(), columns)
    }

    /// Indicator stage: computes `indicator` from the close prices and
    /// appends its columns.
    pub fn with_indicator(&self, indicator: &IndicatorType) -> Result<PriceTable, StockfitError> {
        let bars = self.bars()?;
        let columns = indicator
            .calculate(&bars)
            .into_columns()
            .into_iter()
            .map(|(name, values)| Column::new(name, values))
            .collect();
        self.with_columns(columns)
    }

    /// New table with only the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<PriceTable, StockfitError> {
        let columns = names
            .iter()
            .map(|name| {
                self.column(name).cloned().ok_or_else(|| {
                    StockfitError::shape(format!("{} table has no {} column", self.ticker, name))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        PriceTable::new(self.ticker.clone(), self.dates.clone(), columns)
    }

    /// New table without the rows that have any missing value.
    pub fn drop_incomplete_rows(&self) -> PriceTable {
        let keep: Vec<usize> = (0..self.dates.len())
            .filter(|&i| self.columns.iter().all(|c| c.values[i].is_some()))
            .collect();
        let dates: Vec<NaiveDate> = keep.iter().map(|&i| self.dates[i]).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), keep.iter().map(|&i| c.values[i]).collect()))
            .collect();
        let date_index = dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        PriceTable {
            ticker: self.ticker.clone(),
            dates,
            columns,
            date_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_table() -> PriceTable {
        PriceTable::from_series(&PriceSeries::new(
            "AAPL",
            make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]),
        ))
    }

    #[test]
    fn from_series_has_base_columns() {
        let table = sample_table();
        assert_eq!(table.column_names(), BASE_COLUMNS.to_vec());
        assert_eq!(table.shape(), (5, 6));
        let row = table.row_index(date(2024, 1, 3)).unwrap();
        assert_eq!(table.column("Close").unwrap().values[row], Some(3.0));
    }

    #[test]
    fn bars_round_trip() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let table = PriceTable::from_series(&PriceSeries::new("AAPL", bars.clone()));
        assert_eq!(table.bars().unwrap(), bars);
    }

    #[test]
    fn with_indicator_appends_and_keeps_original() {
        let table = sample_table();
        let with_sma = table.with_indicator(&IndicatorType::Sma(2)).unwrap();
        assert_eq!(table.columns().len(), 5);
        assert_eq!(with_sma.derived_column_names(), vec!["SMA_2"]);
        assert_eq!(with_sma.column("SMA_2").unwrap().values[0], None);
        assert_eq!(with_sma.column("SMA_2").unwrap().values[1], Some(1.5));
    }

    #[test]
    fn duplicate_column_rejected() {
        let table = sample_table();
        let err = table
            .with_columns(vec![Column::new("Close", vec![None; 5])])
            .unwrap_err();
        assert!(matches!(err, StockfitError::ShapeMismatch { .. }));
    }

    #[test]
    fn length_mismatch_rejected() {
        let table = sample_table();
        let err = table
            .with_columns(vec![Column::new("Extra", vec![None; 4])])
            .unwrap_err();
        assert!(matches!(err, StockfitError::ShapeMismatch { .. }));
    }

    #[test]
    fn unordered_dates_rejected() {
        let result = PriceTable::new("X", vec![date(2024, 1, 2), date(2024, 1, 1)], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn drop_incomplete_rows_removes_warmup() {
        let table = sample_table().with_indicator(&IndicatorType::Sma(3)).unwrap();
        let clean = table.drop_incomplete_rows();
        assert_eq!(clean.row_count(), 3);
        assert_eq!(clean.dates()[0], date(2024, 1, 3));
        assert_eq!(clean.row_index(date(2024, 1, 3)), Some(0));
        assert!(clean.columns().iter().all(|c| c.missing_count() == 0));
    }

    #[test]
    fn select_reorders() {
        let table = sample_table().select(&["Close", "Open"]).unwrap();
        assert_eq!(table.column_names(), vec!["Close", "Open"]);
        assert!(sample_table().select(&["Nope"]).is_err());
    }

    #[test]
    fn bars_fail_on_missing_base_value() {
        let table = PriceTable::new(
            "X",
            vec![date(2024, 1, 1)],
            BASE_COLUMNS
                .iter()
                .map(|n| Column::new(*n, vec![if *n == "Close" { None } else { Some(1.0) }]))
                .collect(),
        )
        .unwrap();
        assert!(table.bars().is_err());
    }
}
