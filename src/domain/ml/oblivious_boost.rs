//! Gradient boosting over symmetric (oblivious) trees.
//!
//! Every level of a tree shares one `(feature, border)` test, so a tree of
//! depth `d` is a lookup table of `2^d` leaves indexed by the test bits.

use crate::domain::error::StockfitError;
use crate::domain::ml::binning::FeatureBins;
use crate::domain::ml::params::{Params, unknown_param};
use crate::domain::ml::{DEFAULT_SEED, Regressor, check_fit_input, check_predict_input};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

const FAMILY: &str = "oblivious_boost";
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct ObliviousConfig {
    pub iterations: usize,
    pub depth: usize,
    pub learning_rate: f64,
    pub l2_leaf_reg: f64,
    pub border_count: usize,
    /// Reported as `random_seed`; the fit itself is not randomised.
    pub seed: u64,
}

impl Default for ObliviousConfig {
    fn default() -> Self {
        Self {
            iterations: 100,
            depth: 6,
            learning_rate: 0.03,
            l2_leaf_reg: 3.0,
            border_count: 254,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone)]
struct ObliviousTree {
    /// `(feature, border)` per level; bit `level` of the leaf index is set
    /// when the value is above the border.
    levels: Vec<(usize, f64)>,
    leaves: Vec<f64>,
}

impl ObliviousTree {
    fn leaf_index(&self, row: ArrayView1<f64>) -> usize {
        self.levels
            .iter()
            .enumerate()
            .fold(0, |idx, (level, &(f, border))| {
                idx | (usize::from(row[f] > border) << level)
            })
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        self.leaves[self.leaf_index(row)]
    }
}

#[derive(Debug, Clone)]
pub struct ObliviousBoost {
    config: ObliviousConfig,
    base: f64,
    trees: Vec<ObliviousTree>,
    n_features: usize,
}

impl ObliviousBoost {
    pub fn new(config: ObliviousConfig) -> Self {
        Self {
            config,
            base: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(ObliviousConfig {
            seed,
            ..ObliviousConfig::default()
        })
    }

    pub fn config(&self) -> &ObliviousConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Grow one tree on `residual`, returning it with each row's leaf.
    fn grow_tree(
        &self,
        bins: &FeatureBins,
        binned: &Array2<u16>,
        residual: &[f64],
    ) -> (ObliviousTree, Vec<usize>) {
        let n = residual.len();
        let l2 = self.config.l2_leaf_reg;
        let mut leaf_of = vec![0usize; n];
        let mut levels: Vec<(usize, f64)> = Vec::with_capacity(self.config.depth);

        for level in 0..self.config.depth {
            let n_leaves = 1usize << level;
            let mut best: Option<(f64, usize, usize)> = None;

            for f in 0..bins.n_features() {
                let n_bins = bins.n_bins(f);
                if n_bins < 2 {
                    continue;
                }
                let mut sum = vec![0.0; n_leaves * n_bins];
                let mut count = vec![0.0; n_leaves * n_bins];
                for i in 0..n {
                    let cell = leaf_of[i] * n_bins + binned[[i, f]] as usize;
                    sum[cell] += residual[i];
                    count[cell] += 1.0;
                }

                let mut scores = vec![0.0; n_bins - 1];
                for leaf in 0..n_leaves {
                    let row = leaf * n_bins..(leaf + 1) * n_bins;
                    let total_sum: f64 = sum[row.clone()].iter().sum();
                    let total_count: f64 = count[row.clone()].iter().sum();
                    if total_count == 0.0 {
                        continue;
                    }
                    let (mut ls, mut lc) = (0.0, 0.0);
                    for b in 0..n_bins - 1 {
                        ls += sum[row.start + b];
                        lc += count[row.start + b];
                        let (rs, rc) = (total_sum - ls, total_count - lc);
                        scores[b] += ls * ls / (lc + l2) + rs * rs / (rc + l2);
                    }
                }

                for (b, &score) in scores.iter().enumerate() {
                    if best.is_none_or(|(s, _, _)| score > s) {
                        best = Some((score, f, b));
                    }
                }
            }

            let Some((_, f, b)) = best else {
                break;
            };
            for i in 0..n {
                if binned[[i, f]] as usize > b {
                    leaf_of[i] |= 1 << level;
                }
            }
            levels.push((f, bins.borders(f)[b]));
        }

        let n_leaves = 1usize << levels.len();
        let mut sum = vec![0.0; n_leaves];
        let mut count = vec![0.0; n_leaves];
        for i in 0..n {
            sum[leaf_of[i]] += residual[i];
            count[leaf_of[i]] += 1.0;
        }
        let leaves = sum
            .iter()
            .zip(&count)
            .map(|(s, c)| self.config.learning_rate * s / (c + l2))
            .collect();

        (ObliviousTree { levels, leaves }, leaf_of)
    }
}

impl Default for ObliviousBoost {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl Regressor for ObliviousBoost {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), StockfitError> {
        check_fit_input(FAMILY, x, y)?;
        if self.config.iterations == 0 {
            return Err(StockfitError::invalid_param(FAMILY, "iterations must be at least 1"));
        }

        let bins = FeatureBins::fit(x, self.config.border_count);
        let binned = bins.transform(x);
        let n = y.len();

        self.base = y.sum() / n as f64;
        let mut pred = vec![self.base; n];
        let mut residual = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.config.iterations);

        for _ in 0..self.config.iterations {
            for i in 0..n {
                residual[i] = y[i] - pred[i];
            }
            let (tree, leaf_of) = self.grow_tree(&bins, &binned, &residual);
            for i in 0..n {
                pred[i] += tree.leaves[leaf_of[i]];
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, StockfitError> {
        if self.trees.is_empty() {
            return Err(StockfitError::NotFitted {
                model: FAMILY.to_string(),
            });
        }
        check_predict_input(FAMILY, self.n_features, x)?;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.base + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>())
            .collect())
    }

    fn set_params(&mut self, params: &Params) -> Result<(), StockfitError> {
        for (key, value) in params.iter() {
            match key {
                "iterations" => self.config.iterations = value.as_usize(FAMILY, key)?,
                "depth" => {
                    let v = value.as_usize(FAMILY, key)?;
                    if v > MAX_DEPTH {
                        return Err(StockfitError::invalid_param(
                            FAMILY,
                            format!("depth must be at most {MAX_DEPTH}"),
                        ));
                    }
                    self.config.depth = v;
                }
                "learning_rate" => {
                    let v = value.as_f64(FAMILY, key)?;
                    if v <= 0.0 {
                        return Err(StockfitError::invalid_param(
                            FAMILY,
                            "learning_rate must be positive",
                        ));
                    }
                    self.config.learning_rate = v;
                }
                "l2_leaf_reg" => {
                    let v = value.as_f64(FAMILY, key)?;
                    if v < 0.0 {
                        return Err(StockfitError::invalid_param(
                            FAMILY,
                            "l2_leaf_reg must be non-negative",
                        ));
                    }
                    self.config.l2_leaf_reg = v;
                }
                "border_count" => {
                    let v = value.as_usize(FAMILY, key)?;
                    if v == 0 || v > u16::MAX as usize {
                        return Err(StockfitError::invalid_param(
                            FAMILY,
                            "border_count out of range",
                        ));
                    }
                    self.config.border_count = v;
                }
                "random_seed" => self.config.seed = value.as_usize(FAMILY, key)? as u64,
                _ => return Err(unknown_param(FAMILY, key)),
            }
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::new()
            .with("iterations", self.config.iterations as i64)
            .with("depth", self.config.depth as i64)
            .with("learning_rate", self.config.learning_rate)
            .with("l2_leaf_reg", self.config.l2_leaf_reg)
            .with("border_count", self.config.border_count as i64)
            .with("random_seed", self.config.seed as i64)
    }

    fn clone_unfitted(&self) -> Box<dyn Regressor> {
        Box::new(ObliviousBoost::new(self.config.clone()))
    }
}
