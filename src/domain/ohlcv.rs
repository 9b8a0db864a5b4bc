//! OHLCV bar and per-ticker price series.

use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl OhlcvBar {
    /// Scale the price fields by `ratio`, leaving volume untouched.
    pub fn adjusted(&self, ratio: f64) -> OhlcvBar {
        OhlcvBar {
            date: self.date,
            open: self.open * ratio,
            high: self.high * ratio,
            low: self.low * ratio,
            close: self.close * ratio,
            volume: self.volume,
        }
    }
}

/// Date-ordered bars for one ticker.
///
/// Dates are strictly increasing with no duplicates.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    pub ticker: String,
    bars: Vec<OhlcvBar>,
}

impl PriceSeries {
    /// Sort provider output by date and collapse duplicate dates (the last
    /// record for a date wins).
    pub fn new(ticker: impl Into<String>, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<OhlcvBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            ticker: ticker.into(),
            bars: deduped,
        }
    }

    /// Keep only bars dated on or before `cutoff`.
    pub fn truncate_to(mut self, cutoff: NaiveDate) -> Self {
        let keep = self.bars.partition_point(|b| b.date <= cutoff);
        self.bars.truncate(keep);
        self
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bar(day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn adjusted_scales_prices_not_volume() {
        let b = bar(2, 100.0).adjusted(0.5);
        assert!((b.open - 50.0).abs() < f64::EPSILON);
        assert!((b.high - 50.5).abs() < f64::EPSILON);
        assert!((b.low - 49.5).abs() < f64::EPSILON);
        assert!((b.close - 50.0).abs() < f64::EPSILON);
        assert_eq!(b.volume, 1_000);
    }

    #[test]
    fn new_sorts_and_dedups() {
        let series = PriceSeries::new("AAPL", vec![bar(3, 3.0), bar(1, 1.0), bar(3, 30.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[0].close, 1.0);
        assert_eq!(series.bars()[1].close, 30.0);
    }

    #[test]
    fn truncate_is_inclusive() {
        let series = PriceSeries::new("AAPL", (1..=10).map(|d| bar(d, d as f64)).collect());
        let cut = series.truncate_to(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        assert_eq!(cut.len(), 5);
        assert_eq!(
            cut.last_date(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
    }

    #[test]
    fn truncate_before_first_date_empties() {
        let series = PriceSeries::new("AAPL", vec![bar(10, 1.0)]);
        let cut = series.truncate_to(NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert!(cut.is_empty());
        assert_eq!(cut.first_date(), None);
    }

    proptest! {
        #[test]
        fn truncated_series_is_ordered_and_bounded(
            days in proptest::collection::vec(1u32..=28, 0..60),
            cutoff_day in 1u32..=28,
        ) {
            let bars: Vec<OhlcvBar> = days.iter().map(|&d| bar(d, d as f64)).collect();
            let cutoff = NaiveDate::from_ymd_opt(2024, 1, cutoff_day).unwrap();
            let series = PriceSeries::new("T", bars).truncate_to(cutoff);

            for b in series.bars() {
                prop_assert!(b.date <= cutoff);
            }
            for pair in series.bars().windows(2) {
                prop_assert!(pair[0].date < pair[1].date);
            }
        }
    }
}
