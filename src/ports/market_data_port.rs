//! Market data provider port.

use crate::domain::error::StockfitError;
use crate::domain::ingest::HistoryRequest;
use crate::domain::ohlcv::OhlcvBar;

pub trait MarketDataPort {
    /// Fetch the bar history described by `request`, one provider call per
    /// ticker. Bars may come back unordered; the caller normalises them.
    fn fetch_history(&self, request: &HistoryRequest) -> Result<Vec<OhlcvBar>, StockfitError>;
}
