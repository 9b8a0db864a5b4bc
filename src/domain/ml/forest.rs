//! Random forest regressor.

use crate::domain::error::StockfitError;
use crate::domain::ml::params::{Params, unknown_param};
use crate::domain::ml::tree::{RegressionTree, TreeConfig};
use crate::domain::ml::{DEFAULT_SEED, Regressor, check_fit_input, check_predict_input};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

const FAMILY: &str = "random_forest";

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_estimators: usize,
    /// Per-tree settings; `tree.seed` seeds the forest.
    pub tree: TreeConfig,
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            tree: TreeConfig::default(),
            bootstrap: true,
        }
    }
}

/// Mean of independently grown trees. Each tree gets its own seed drawn from
/// the forest seed, so the fit does not depend on thread scheduling.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        let mut config = ForestConfig::default();
        config.tree.seed = seed;
        Self::new(config)
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn grow_tree(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, seed: u64) -> Result<RegressionTree, StockfitError> {
        let n = y.len();
        let mut weights = vec![0.0; n];
        if self.config.bootstrap {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            for _ in 0..n {
                weights[rng.gen_range(0..n)] += 1.0;
            }
        } else {
            weights.fill(1.0);
        }

        let mut tree = RegressionTree::new(TreeConfig {
            seed,
            ..self.config.tree.clone()
        });
        tree.fit_weighted(x, y, &weights)?;
        Ok(tree)
    }
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), StockfitError> {
        check_fit_input(FAMILY, x, y)?;
        if self.config.n_estimators == 0 {
            return Err(StockfitError::invalid_param(FAMILY, "n_estimators must be at least 1"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.tree.seed);
        let seeds: Vec<u64> = (0..self.config.n_estimators).map(|_| rng.next_u64()).collect();
        let trees = seeds
            .par_iter()
            .map(|&seed| self.grow_tree(x, y, seed))
            .collect::<Result<Vec<_>, _>>()?;

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

        let scale = 1.0 / self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() * scale)
            .collect())
    }

    fn set_params(&mut self, params: &Params) -> Result<(), StockfitError> {
        for (key, value) in params.iter() {
            match key {
                "n_estimators" => self.config.n_estimators = value.as_usize(FAMILY, key)?,
                "bootstrap" => self.config.bootstrap = value.as_bool(FAMILY, key)?,
                _ => {
                    if !self.config.tree.apply(FAMILY, key, value)? {
                        return Err(unknown_param(FAMILY, key));
                    }
                }
            }
        }
        Ok(())
    }

    fn params(&self) -> Params {
        self.config
            .tree
            .to_params()
            .with("n_estimators", self.config.n_estimators as i64)
            .with("bootstrap", self.config.bootstrap)
    }

    fn clone_unfitted(&self) -> Box<dyn Regressor> {
        Box::new(RandomForest::new(self.config.clone()))
    }
}
