//! Exponential moving average of closes, the building block of MACD.
//!
//! Seeded with the SMA of the first n closes, then
//! EMA[i] = close[i] * k + EMA[i-1] * (1 - k) with k = 2 / (n + 1).
//! Warmup: first (n-1) bars are `None`.

use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_ema(bars: &[OhlcvBar], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; bars.len()];
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut seed_sum = 0.0;
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        if i + 1 < period {
            seed_sum += bar.close;
            values.push(None);
            continue;
        }
        if i + 1 == period {
            seed_sum += bar.close;
            ema = seed_sum / period as f64;
        } else {
            ema = bar.close * k + ema * (1.0 - k);
        }
        values.push(Some(ema));
    }

    values
}
