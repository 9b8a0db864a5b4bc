//! CART regression tree.

use crate::domain::error::StockfitError;
use crate::domain::ml::params::{ParamValue, Params, unknown_param};
use crate::domain::ml::{DEFAULT_SEED, Regressor, check_fit_input, check_predict_input};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

const FAMILY: &str = "decision_tree";

#[derive(Debug, Clone, PartialEq)]
pub struct TreeConfig {
    /// `None` grows until leaves are pure or too small.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features drawn per split (`None` = all).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            seed: DEFAULT_SEED,
        }
    }
}

impl TreeConfig {
    /// Apply one tree parameter. Returns `false` for names the tree does not
    /// own so that ensembles can handle them.
    pub(crate) fn apply(
        &mut self,
        family: &str,
        key: &str,
        value: &ParamValue,
    ) -> Result<bool, StockfitError> {
        match key {
            "max_depth" => self.max_depth = value.as_opt_usize(family, key)?,
            "min_samples_split" => {
                let v = value.as_usize(family, key)?;
                if v < 2 {
                    return Err(StockfitError::invalid_param(
                        family,
                        "min_samples_split must be at least 2",
                    ));
                }
                self.min_samples_split = v;
            }
            "min_samples_leaf" => {
                let v = value.as_usize(family, key)?;
                if v < 1 {
                    return Err(StockfitError::invalid_param(
                        family,
                        "min_samples_leaf must be at least 1",
                    ));
                }
                self.min_samples_leaf = v;
            }
            "max_features" => {
                let v = value.as_opt_usize(family, key)?;
                if v == Some(0) {
                    return Err(StockfitError::invalid_param(
                        family,
                        "max_features must be at least 1",
                    ));
                }
                self.max_features = v;
            }
            "random_state" => self.seed = value.as_usize(family, key)? as u64,
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub(crate) fn to_params(&self) -> Params {
        Params::new()
            .with("max_depth", self.max_depth)
            .with("min_samples_split", self.min_samples_split as i64)
            .with("min_samples_leaf", self.min_samples_leaf as i64)
            .with("max_features", self.max_features)
            .with("random_state", self.seed as i64)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

struct Split {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

/// Node statistics over weighted samples.
#[derive(Default, Clone, Copy)]
struct Moments {
    count: usize,
    weight: f64,
    sum: f64,
    sum_sq: f64,
}

impl Moments {
    fn add(&mut self, w: f64, y: f64) {
        self.count += 1;
        self.weight += w;
        self.sum += w * y;
        self.sum_sq += w * y * y;
    }

    fn mean(&self) -> f64 {
        if self.weight > 0.0 { self.sum / self.weight } else { 0.0 }
    }

    fn variance(&self) -> f64 {
        if self.weight > 0.0 {
            (self.sum_sq / self.weight - self.mean().powi(2)).max(0.0)
        } else {
            0.0
        }
    }

    /// Larger is better; the weighted SSE reduction up to a constant.
    fn proxy(&self) -> f64 {
        if self.weight > 0.0 { self.sum * self.sum / self.weight } else { 0.0 }
    }
}

/// Regression tree grown by greedy variance reduction.
///
/// Sample weights enter every statistic; `min_samples_*` limits count rows
/// with positive weight.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    config: TreeConfig,
    nodes: Vec<Node>,
    n_features: usize,
}

impl RegressionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(TreeConfig {
            seed,
            ..TreeConfig::default()
        })
    }

    pub fn with_max_depth(max_depth: usize, seed: u64) -> Self {
        Self::new(TreeConfig {
            max_depth: Some(max_depth),
            seed,
            ..TreeConfig::default()
        })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }

    pub fn fit_weighted(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        weights: &[f64],
    ) -> Result<(), StockfitError> {
        check_fit_input(FAMILY, x, y)?;
        if weights.len() != y.len() {
            return Err(StockfitError::shape(format!(
                "{FAMILY}: {} weights for {} samples",
                weights.len(),
                y.len()
            )));
        }

        let indices: Vec<usize> = (0..y.len()).filter(|&i| weights[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(StockfitError::shape(format!("{FAMILY}: every sample weight is zero")));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut nodes = Vec::new();
        let builder = Builder {
            config: &self.config,
            x: x.view(),
            y: y.view(),
            weights,
        };
        builder.grow(indices, 0, &mut rng, &mut nodes);

        self.nodes = nodes;
        self.n_features = x.ncols();
        Ok(())
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut id = 0;
        loop {
            match self.nodes.get(id) {
                Some(Node::Leaf { value }) => return *value,
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => id = if row[*feature] <= *threshold { *left } else { *right },
                None => return 0.0,
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

struct Builder<'a> {
    config: &'a TreeConfig,
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    weights: &'a [f64],
}

impl Builder<'_> {
    fn moments(&self, indices: &[usize]) -> Moments {
        let mut m = Moments::default();
        for &i in indices {
            m.add(self.weights[i], self.y[i]);
        }
        m
    }

    /// Grow the subtree over `indices`, returning its root id.
    fn grow(&self, indices: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng, nodes: &mut Vec<Node>) -> usize {
        let id = nodes.len();
        let stats = self.moments(&indices);
        nodes.push(Node::Leaf { value: stats.mean() });

        let n = indices.len();
        if self.config.max_depth.is_some_and(|d| depth >= d)
            || n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf
            || stats.variance() <= 1e-12
        {
            return id;
        }

        let Some(split) = self.best_split(&indices, &stats, rng) else {
            return id;
        };

        let left = self.grow(split.left, depth + 1, rng, nodes);
        let right = self.grow(split.right, depth + 1, rng, nodes);
        nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        if let Some(k) = self.config.max_features.filter(|&k| k < n_features) {
            features.shuffle(rng);
            features.truncate(k);
        }
        features
    }

    fn best_split(&self, indices: &[usize], parent: &Moments, rng: &mut ChaCha8Rng) -> Option<Split> {
        let min_leaf = self.config.min_samples_leaf;
        let mut best: Option<(usize, f64, f64)> = None;
        let mut best_proxy = parent.proxy();

        let mut sorted = indices.to_vec();
        for feature in self.candidate_features(rng) {
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = Moments::default();
            for pos in 0..sorted.len() - 1 {
                let i = sorted[pos];
                left.add(self.weights[i], self.y[i]);

                let here = self.x[[i, feature]];
                let next = self.x[[sorted[pos + 1], feature]];
                if here >= next || left.count < min_leaf || sorted.len() - left.count < min_leaf {
                    continue;
                }

                let right = Moments {
                    count: parent.count - left.count,
                    weight: parent.weight - left.weight,
                    sum: parent.sum - left.sum,
                    sum_sq: parent.sum_sq - left.sum_sq,
                };
                let proxy = left.proxy() + right.proxy();
                if proxy > best_proxy {
                    best_proxy = proxy;
                    let mid = (here + next) / 2.0;
                    let threshold = if mid < next { mid } else { here };
                    best = Some((feature, threshold, proxy));
                }
            }
        }

        let (feature, threshold, _) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| self.x[[i, feature]] <= threshold);
        Some(Split {
            feature,
            threshold,
            left,
            right,
        })
    }
}

impl Regressor for RegressionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), StockfitError> {
        let weights = vec![1.0; y.len()];
        self.fit_weighted(x, y, &weights)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, StockfitError> {
        if !self.is_fitted() {
            return Err(StockfitError::NotFitted {
                model: FAMILY.to_string(),
            });
        }
        check_predict_input(FAMILY, self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    fn set_params(&mut self, params: &Params) -> Result<(), StockfitError> {
        for (key, value) in params.iter() {
            if !self.config.apply(FAMILY, key, value)? {
                return Err(unknown_param(FAMILY, key));
            }
        }
        Ok(())
    }

    fn params(&self) -> Params {
        self.config.to_params()
    }

    fn clone_unfitted(&self) -> Box<dyn Regressor> {
        Box::new(RegressionTree::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| if v < 10.0 { 1.0 } else { 5.0 });
        (x, y)
    }

    #[test]
    fn learns_step_function() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::default();
        tree.fit(x.view(), y.view()).unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        let pred = tree.predict(array![[3.0], [9.4], [9.6], [15.0]].view()).unwrap();
        assert_eq!(pred, array![1.0, 1.0, 5.0, 5.0]);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = x.column(0).to_owned();
        let mut tree = RegressionTree::with_max_depth(2, 0);
        tree.fit(x.view(), y.view()).unwrap();
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.n_leaves(), 4);
    }

    #[test]
    fn min_samples_leaf_respected() {
        let x = Array2::from_shape_fn((10, 1), |(i, _)| i as f64);
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 100.0];
        let mut tree = RegressionTree::new(TreeConfig {
            min_samples_leaf: 4,
            ..TreeConfig::default()
        });
        tree.fit(x.view(), y.view()).unwrap();
        let pred = tree.predict(array![[9.0]].view()).unwrap();
        assert_abs_diff_eq!(pred[0], 25.0, epsilon = 1e-9);
    }

    #[test]
    fn weights_shift_leaf_means() {
        let x = array![[0.0], [0.0], [1.0]];
        let y = array![0.0, 3.0, 10.0];
        let mut tree = RegressionTree::with_max_depth(1, 0);
        tree.fit_weighted(x.view(), y.view(), &[1.0, 2.0, 1.0]).unwrap();
        let pred = tree.predict(array![[0.0], [1.0]].view()).unwrap();
        assert_abs_diff_eq!(pred[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pred[1], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_weight_rows_are_ignored() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![1.0, 1.0, 50.0];
        let mut tree = RegressionTree::default();
        tree.fit_weighted(x.view(), y.view(), &[1.0, 1.0, 0.0]).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict(array![[2.0]].view()).unwrap()[0], 1.0);
    }

    #[test]
    fn predict_before_fit_fails() {
        let tree = RegressionTree::default();
        let err = tree.predict(array![[1.0]].view()).unwrap_err();
        assert!(matches!(err, StockfitError::NotFitted { .. }));
    }

    #[test]
    fn predict_checks_width() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::default();
        tree.fit(x.view(), y.view()).unwrap();
        assert!(tree.predict(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn set_params_round_trip() {
        let mut tree = RegressionTree::default();
        let params = Params::new()
            .with("max_depth", 5i64)
            .with("min_samples_split", 10i64)
            .with("min_samples_leaf", 4i64);
        tree.set_params(&params).unwrap();
        let out = tree.params();
        assert_eq!(out.get("max_depth"), Some(&ParamValue::Int(5)));
        assert_eq!(out.get("min_samples_leaf"), Some(&ParamValue::Int(4)));

        tree.set_params(&Params::new().with("max_depth", ParamValue::None)).unwrap();
        assert_eq!(tree.config().max_depth, None);
    }

    #[test]
    fn set_params_rejects_bad_values() {
        let mut tree = RegressionTree::default();
        assert!(tree.set_params(&Params::new().with("min_samples_split", 1i64)).is_err());
        assert!(tree.set_params(&Params::new().with("depth", 3i64)).is_err());
        assert!(tree.set_params(&Params::new().with("max_depth", 0.5)).is_err());
    }

    #[test]
    fn fit_is_deterministic() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * 7 + j * 13) % 17) as f64);
        let y = x.column(0).mapv(|v| v * 2.0) + &x.column(2);
        let config = TreeConfig {
            max_features: Some(2),
            ..TreeConfig::default()
        };
        let mut a = RegressionTree::new(config.clone());
        let mut b = RegressionTree::new(config);
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());
    }
}
