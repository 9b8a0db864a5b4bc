//! Quantile feature binning for the histogram-based boosters.

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Per-feature split borders. Bin `b` of a feature holds the values in
/// `(borders[b - 1], borders[b]]`; the last bin is open above.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBins {
    borders: Vec<Vec<f64>>,
}

impl FeatureBins {
    /// Borders are midpoints between distinct values; when a feature has more
    /// than `max_borders` of them an evenly spaced subset (by rank) is kept.
    pub fn fit(x: ArrayView2<f64>, max_borders: usize) -> Self {
        let borders = x
            .columns()
            .into_iter()
            .map(|column| feature_borders(column, max_borders))
            .collect();
        Self { borders }
    }

    pub fn n_features(&self) -> usize {
        self.borders.len()
    }

    pub fn borders(&self, feature: usize) -> &[f64] {
        &self.borders[feature]
    }

    /// Number of bins for `feature` (borders + 1).
    pub fn n_bins(&self, feature: usize) -> usize {
        self.borders[feature].len() + 1
    }

    pub fn bin(&self, feature: usize, value: f64) -> u16 {
        self.borders[feature].partition_point(|&b| b < value) as u16
    }

    /// Bin index of every cell, row-major like `x`.
    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<u16> {
        Array2::from_shape_fn(x.dim(), |(i, j)| self.bin(j, x[[i, j]]))
    }
}

fn feature_borders(column: ArrayView1<f64>, max_borders: usize) -> Vec<f64> {
    let mut values: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
    values.sort_by(f64::total_cmp);
    values.dedup();

    let midpoints: Vec<f64> = values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect();
    if midpoints.len() <= max_borders {
        return midpoints;
    }

    let step = midpoints.len() as f64 / max_borders as f64;
    let mut picked: Vec<f64> = (0..max_borders)
        .map(|k| midpoints[((k as f64 + 0.5) * step) as usize])
        .collect();
    picked.dedup();
    picked
}
