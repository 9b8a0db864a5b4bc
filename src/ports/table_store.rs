//! Table persistence port.

use crate::domain::error::StockfitError;
use crate::domain::table::PriceTable;
use std::path::PathBuf;

pub trait TableStore {
    /// Persist `table` under `name`, returning where it was written.
    fn write_table(&self, name: &str, table: &PriceTable) -> Result<PathBuf, StockfitError>;

    /// Load the table stored under `name`, tagging it with `ticker`.
    fn read_table(&self, name: &str, ticker: &str) -> Result<PriceTable, StockfitError>;
}
