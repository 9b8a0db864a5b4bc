//! Gradient boosting with best-first (leaf-wise) tree growth.

use crate::domain::error::StockfitError;
use crate::domain::ml::binning::FeatureBins;
use crate::domain::ml::params::{ParamValue, Params, unknown_param};
use crate::domain::ml::{DEFAULT_SEED, Regressor, check_fit_input, check_predict_input};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;

const FAMILY: &str = "leafwise_boost";
const MAX_BORDERS: usize = 254;

#[derive(Debug, Clone, PartialEq)]
pub struct LeafwiseConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// `None` leaves depth bounded only by `num_leaves`.
    pub max_depth: Option<usize>,
    pub num_leaves: usize,
    pub min_child_samples: usize,
    /// Fraction of rows drawn without replacement for a bag.
    pub subsample: f64,
    /// Draw a new bag every this many rounds; 0 disables bagging, so
    /// `subsample` has no effect.
    pub subsample_freq: usize,
    /// Fraction of features drawn for each tree.
    pub colsample_bytree: f64,
    pub seed: u64,
}

impl Default for LeafwiseConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: None,
            num_leaves: 31,
            min_child_samples: 20,
            subsample: 1.0,
            subsample_freq: 0,
            colsample_bytree: 1.0,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        bin: u16,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct LeafwiseTree {
    nodes: Vec<Node>,
}

impl LeafwiseTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => id = if row[*feature] <= *threshold { *left } else { *right },
            }
        }
    }

    fn predict_binned(&self, binned: ArrayView1<u16>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    bin,
                    left,
                    right,
                    ..
                } => id = if binned[*feature] <= *bin { *left } else { *right },
            }
        }
    }

    fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    gain: f64,
    feature: usize,
    bin: u16,
}

/// A leaf that may still be split.
struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    sum: f64,
    split: Option<SplitCandidate>,
}

struct Grower<'a> {
    config: &'a LeafwiseConfig,
    bins: &'a FeatureBins,
    binned: &'a Array2<u16>,
    gradient: &'a [f64],
    features: Vec<usize>,
}

impl Grower<'_> {
    fn open(&self, node: usize, rows: Vec<usize>, depth: usize) -> OpenLeaf {
        let sum = rows.iter().map(|&i| self.gradient[i]).sum();
        let mut leaf = OpenLeaf {
            node,
            rows,
            depth,
            sum,
            split: None,
        };
        leaf.split = self.best_split(&leaf);
        leaf
    }

    fn best_split(&self, leaf: &OpenLeaf) -> Option<SplitCandidate> {
        let min_child = self.config.min_child_samples.max(1);
        let n = leaf.rows.len();
        if self.config.max_depth.is_some_and(|d| leaf.depth >= d) || n < 2 * min_child {
            return None;
        }

        let parent = leaf.sum * leaf.sum / n as f64;
        let mut best: Option<SplitCandidate> = None;
        for &f in &self.features {
            let n_bins = self.bins.n_bins(f);
            if n_bins < 2 {
                continue;
            }
            let mut sum = vec![0.0; n_bins];
            let mut count = vec![0usize; n_bins];
            for &i in &leaf.rows {
                let b = self.binned[[i, f]] as usize;
                sum[b] += self.gradient[i];
                count[b] += 1;
            }

            let (mut ls, mut lc) = (0.0, 0usize);
            for b in 0..n_bins - 1 {
                ls += sum[b];
                lc += count[b];
                let rc = n - lc;
                if lc < min_child || rc < min_child {
                    continue;
                }
                let rs = leaf.sum - ls;
                let gain = ls * ls / lc as f64 + rs * rs / rc as f64 - parent;
                if gain > best.map_or(0.0, |s| s.gain) {
                    best = Some(SplitCandidate {
                        gain,
                        feature: f,
                        bin: b as u16,
                    });
                }
            }
        }
        best
    }

    fn grow(&self, rows: Vec<usize>) -> LeafwiseTree {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut open = vec![self.open(0, rows, 0)];

        while open.len() < self.config.num_leaves {
            let mut pick: Option<(usize, f64)> = None;
            for (idx, leaf) in open.iter().enumerate() {
                if let Some(split) = leaf.split {
                    if pick.is_none_or(|(_, g)| split.gain > g) {
                        pick = Some((idx, split.gain));
                    }
                }
            }
            let Some((idx, _)) = pick else {
                break;
            };

            let leaf = open.remove(idx);
            let Some(split) = leaf.split else {
                break;
            };
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .copied()
                .partition(|&i| self.binned[[i, split.feature]] <= split.bin);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[leaf.node] = Node::Split {
                feature: split.feature,
                bin: split.bin,
                threshold: self.bins.borders(split.feature)[split.bin as usize],
                left,
                right,
            };
            open.push(self.open(left, left_rows, leaf.depth + 1));
            open.push(self.open(right, right_rows, leaf.depth + 1));
        }

        for leaf in open {
            let value = if leaf.rows.is_empty() {
                0.0
            } else {
                self.config.learning_rate * leaf.sum / leaf.rows.len() as f64
            };
            nodes[leaf.node] = Node::Leaf { value };
        }
        LeafwiseTree { nodes }
    }
}

#[derive(Debug, Clone)]
pub struct LeafwiseBoost {
    config: LeafwiseConfig,
    base: f64,
    trees: Vec<LeafwiseTree>,
    n_features: usize,
}

impl LeafwiseBoost {
    pub fn new(config: LeafwiseConfig) -> Self {
        Self {
            config,
            base: 0.0,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(LeafwiseConfig {
            seed,
            ..LeafwiseConfig::default()
        })
    }

    pub fn config(&self) -> &LeafwiseConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn max_leaves(&self) -> usize {
        self.trees.iter().map(LeafwiseTree::n_leaves).max().unwrap_or(0)
    }
}

fn sample_count(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction).round() as usize).clamp(1, total)
}

fn fraction(value: &ParamValue, key: &str) -> Result<f64, StockfitError> {
    let v = value.as_f64(FAMILY, key)?;
    if !(v > 0.0 && v <= 1.0) {
        return Err(StockfitError::invalid_param(
            FAMILY,
            format!("{key} must be in (0, 1], got {v}"),
        ));
    }
    Ok(v)
}

impl Default for LeafwiseBoost {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl Regressor for LeafwiseBoost {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), StockfitError> {
        check_fit_input(FAMILY, x, y)?;
        if self.config.n_estimators == 0 {
            return Err(StockfitError::invalid_param(FAMILY, "n_estimators must be at least 1"));
        }

        let n = y.len();
        let n_features = x.ncols();
        let bins = FeatureBins::fit(x, MAX_BORDERS);
        let binned = bins.transform(x);
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);

        self.base = y.sum() / n as f64;
        let mut pred = vec![self.base; n];
        let mut gradient = vec![0.0; n];
        let mut trees = Vec::with_capacity(self.config.n_estimators);
        let bagging = self.config.subsample_freq > 0 && self.config.subsample < 1.0;
        let mut rows: Vec<usize> = (0..n).collect();

        for round in 0..self.config.n_estimators {
            for i in 0..n {
                gradient[i] = y[i] - pred[i];
            }

            if bagging && round % self.config.subsample_freq == 0 {
                rows = index::sample(&mut rng, n, sample_count(n, self.config.subsample)).into_vec();
                rows.sort_unstable();
            }
            let mut features: Vec<usize> = if self.config.colsample_bytree < 1.0 {
                index::sample(&mut rng, n_features, sample_count(n_features, self.config.colsample_bytree))
                    .into_vec()
            } else {
                (0..n_features).collect()
            };
            features.sort_unstable();

            let grower = Grower {
                config: &self.config,
                bins: &bins,
                binned: &binned,
                gradient: &gradient,
                features,
            };
            let tree = grower.grow(rows.clone());
            for (i, row) in binned.rows().into_iter().enumerate() {
                pred[i] += tree.predict_binned(row);
            }
            trees.push(tree);
        }

        self.trees = trees;
        self.n_features = n_features;
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
                "n_estimators" => self.config.n_estimators = value.as_usize(FAMILY, key)?,
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
                // -1 is the conventional spelling of "no limit"
                "max_depth" => {
                    self.config.max_depth = match value {
                        ParamValue::Int(v) if *v <= 0 => None,
                        other => other.as_opt_usize(FAMILY, key)?,
                    }
                }
                "num_leaves" => {
                    let v = value.as_usize(FAMILY, key)?;
                    if v < 2 {
                        return Err(StockfitError::invalid_param(FAMILY, "num_leaves must be at least 2"));
                    }
                    self.config.num_leaves = v;
                }
                "min_child_samples" => self.config.min_child_samples = value.as_usize(FAMILY, key)?,
                "subsample" => self.config.subsample = fraction(value, key)?,
                "subsample_freq" => self.config.subsample_freq = value.as_usize(FAMILY, key)?,
                "colsample_bytree" => self.config.colsample_bytree = fraction(value, key)?,
                "random_state" => self.config.seed = value.as_usize(FAMILY, key)? as u64,
                _ => return Err(unknown_param(FAMILY, key)),
            }
        }
        Ok(())
    }

    fn params(&self) -> Params {
        Params::new()
            .with("n_estimators", self.config.n_estimators as i64)
            .with("learning_rate", self.config.learning_rate)
            .with("max_depth", self.config.max_depth)
            .with("num_leaves", self.config.num_leaves as i64)
            .with("min_child_samples", self.config.min_child_samples as i64)
            .with("subsample", self.config.subsample)
            .with("subsample_freq", self.config.subsample_freq as i64)
            .with("colsample_bytree", self.config.colsample_bytree)
            .with("random_state", self.config.seed as i64)
    }

    fn clone_unfitted(&self) -> Box<dyn Regressor> {
        Box::new(LeafwiseBoost::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::metrics::r2_score;
    use ndarray::array;

    fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| ((i * (7 + j * 4)) % n) as f64 / 10.0);
        let y = x.column(0).mapv(|v| 2.0 * v) + &x.column(1);
        (x, y)
    }

    #[test]
    fn fits_linear_target() {
        let (x, y) = data(101);
        let mut model = LeafwiseBoost::default();
        model.fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view()).unwrap();
        assert!(r2_score(y.view(), pred.view()).unwrap() > 0.9);
    }

    #[test]
    fn num_leaves_and_depth_bound_trees() {
        let (x, y) = data(101);
        let mut model = LeafwiseBoost::new(LeafwiseConfig {
            n_estimators: 5,
            num_leaves: 31,
            min_child_samples: 5,
            max_depth: Some(2),
            ..LeafwiseConfig::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        assert!(model.max_leaves() <= 4);

        let mut model = LeafwiseBoost::new(LeafwiseConfig {
            n_estimators: 5,
            num_leaves: 3,
            min_child_samples: 5,
            ..LeafwiseConfig::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.max_leaves(), 3);
    }

    #[test]
    fn min_child_samples_blocks_small_splits() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 0.0, 10.0];
        let mut model = LeafwiseBoost::new(LeafwiseConfig {
            n_estimators: 3,
            min_child_samples: 3,
            ..LeafwiseConfig::default()
        });
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.max_leaves(), 1);
        let pred = model.predict(x.view()).unwrap();
        assert!(pred.iter().all(|&p| (p - 2.5).abs() < 1e-12));
    }

    #[test]
    fn subsampling_is_seeded() {
        let (x, y) = data(80);
        let params = Params::new()
            .with("subsample", 0.7)
            .with("subsample_freq", 1i64)
            .with("colsample_bytree", 0.7)
            .with("max_depth", 3i64);
        let mut a = LeafwiseBoost::default();
        let mut b = LeafwiseBoost::default();
        a.set_params(&params).unwrap();
        b.set_params(&params).unwrap();
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());
    }

    #[test]
    fn subsample_needs_a_bagging_frequency() {
        let (x, y) = data(80);
        let fit = |params: Params| {
            let mut model = LeafwiseBoost::default();
            model.set_params(&params.with("max_depth", 3i64)).unwrap();
            model.fit(x.view(), y.view()).unwrap();
            model.predict(x.view()).unwrap()
        };

        let full = fit(Params::new().with("subsample", 1.0));
        assert_eq!(fit(Params::new().with("subsample", 0.7)), full);
        assert_eq!(
            fit(Params::new().with("subsample", 0.7).with("subsample_freq", 0i64)),
            full
        );
        assert_ne!(
            fit(Params::new().with("subsample", 0.7).with("subsample_freq", 1i64)),
            full
        );
    }

    #[test]
    fn params_validation() {
        let mut model = LeafwiseBoost::default();
        assert!(model.set_params(&Params::new().with("subsample", 0.0)).is_err());
        assert!(model.set_params(&Params::new().with("colsample_bytree", 1.5)).is_err());
        assert!(model.set_params(&Params::new().with("depth", 3i64)).is_err());
        model.set_params(&Params::new().with("max_depth", -1i64)).unwrap();
        assert_eq!(model.config().max_depth, None);
    }
}
