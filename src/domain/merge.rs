//! Benchmark merge: left join of a benchmark's OHLCV columns onto a ticker
//! table by date.

use crate::domain::error::StockfitError;
use crate::domain::table::{BASE_COLUMNS, Column, PriceTable};

pub const DEFAULT_SUFFIX: &str = "SP500";

/// Left-join `benchmark`'s base columns onto `stock`.
///
/// Every row of `stock` is kept unchanged and in order; benchmark columns are
/// named `<column>_<suffix>` and are `None` on dates the benchmark lacks.
pub fn merge_benchmark(
    stock: &PriceTable,
    benchmark: &PriceTable,
    suffix: &str,
) -> Result<PriceTable, StockfitError> {
    if stock.ticker == benchmark.ticker {
        return Err(StockfitError::shape(format!(
            "refusing to merge benchmark {} with itself",
            benchmark.ticker
        )));
    }

    let mut joined = Vec::with_capacity(BASE_COLUMNS.len());
    for name in BASE_COLUMNS {
        let source = benchmark.column(name).ok_or_else(|| {
            StockfitError::shape(format!(
                "benchmark {} has no {} column",
                benchmark.ticker, name
            ))
        })?;
        let values = stock
            .dates()
            .iter()
            .map(|&date| benchmark.row_index(date).and_then(|row| source.values[row]))
            .collect();
        joined.push(Column::new(format!("{name}_{suffix}"), values));
    }

    stock.with_columns(joined)
}
