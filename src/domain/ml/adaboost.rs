//! AdaBoost.R2 regressor over shallow regression trees.

use crate::domain::error::StockfitError;
use crate::domain::ml::params::{Params, unknown_param};
use crate::domain::ml::tree::RegressionTree;
use crate::domain::ml::{DEFAULT_SEED, Regressor, check_fit_input, check_predict_input};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fmt;
use std::str::FromStr;

const FAMILY: &str = "adaboost";
const BASE_DEPTH: usize = 3;

/// How absolute errors are mapped into [0, 1] before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoostLoss {
    Linear,
    Square,
    Exponential,
}

impl BoostLoss {
    fn apply(self, scaled: f64) -> f64 {
        match self {
            BoostLoss::Linear => scaled,
            BoostLoss::Square => scaled * scaled,
            BoostLoss::Exponential => 1.0 - (-scaled).exp(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoostLoss::Linear => "linear",
            BoostLoss::Square => "square",
            BoostLoss::Exponential => "exponential",
        }
    }
}

impl FromStr for BoostLoss {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(BoostLoss::Linear),
            "square" => Ok(BoostLoss::Square),
            "exponential" => Ok(BoostLoss::Exponential),
            other => Err(format!("unknown loss '{}'", other)),
        }
    }
}

impl fmt::Display for BoostLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdaBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub loss: BoostLoss,
    pub seed: u64,
}

impl Default for AdaBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 1.0,
            loss: BoostLoss::Linear,
            seed: DEFAULT_SEED,
        }
    }
}

/// Outcome of one boosting round.
enum Round {
    /// Estimator kept; continue with the updated sample weights.
    Continue,
    /// Perfect fit: keep the estimator with unit weight and stop.
    Perfect,
    /// Error too large: discard the estimator (unless it is the only one)
    /// and stop.
    Abort,
}

#[derive(Debug, Clone)]
pub struct AdaBoost {
    config: AdaBoostConfig,
    estimators: Vec<RegressionTree>,
    weights: Vec<f64>,
    n_features: usize,
}

impl AdaBoost {
    pub fn new(config: AdaBoostConfig) -> Self {
        Self {
            config,
            estimators: Vec::new(),
            weights: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(AdaBoostConfig {
            seed,
            ..AdaBoostConfig::default()
        })
    }

    pub fn config(&self) -> &AdaBoostConfig {
        &self.config
    }

    pub fn n_estimators_fitted(&self) -> usize {
        self.estimators.len()
    }

    /// Indices drawn with replacement, proportionally to `weights`.
    fn resample(weights: &[f64], rng: &mut ChaCha8Rng) -> Vec<f64> {
        let mut cdf = Vec::with_capacity(weights.len());
        let mut total = 0.0;
        for &w in weights {
            total += w;
            cdf.push(total);
        }
        let mut counts = vec![0.0; weights.len()];
        for _ in 0..weights.len() {
            let u = rng.gen_range(0.0..total);
            let idx = cdf.partition_point(|&c| c <= u).min(weights.len() - 1);
            counts[idx] += 1.0;
        }
        counts
    }

    fn boost_round(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        sample_weight: &mut [f64],
        rng: &mut ChaCha8Rng,
        last: bool,
    ) -> Result<Round, StockfitError> {
        let counts = Self::resample(sample_weight, rng);
        let mut tree = RegressionTree::with_max_depth(BASE_DEPTH, rng.next_u64());
        tree.fit_weighted(x, y, &counts)?;

        let errors: Vec<f64> = x
            .rows()
            .into_iter()
            .zip(y.iter())
            .map(|(row, &target)| (tree.predict_row(row) - target).abs())
            .collect();
        let error_max = errors
            .iter()
            .zip(sample_weight.iter())
            .filter(|&(_, &w)| w > 0.0)
            .map(|(&e, _)| e)
            .fold(0.0, f64::max);
        let losses: Vec<f64> = errors
            .iter()
            .map(|&e| {
                let scaled = if error_max > 0.0 { e / error_max } else { e };
                self.config.loss.apply(scaled)
            })
            .collect();

        let estimator_error: f64 = losses
            .iter()
            .zip(sample_weight.iter())
            .filter(|&(_, &w)| w > 0.0)
            .map(|(l, w)| l * w)
            .sum();

        if estimator_error <= 0.0 {
            self.estimators.push(tree);
            self.weights.push(1.0);
            return Ok(Round::Perfect);
        }
        if estimator_error >= 0.5 {
            if self.estimators.is_empty() {
                self.estimators.push(tree);
                self.weights.push(0.0);
            }
            return Ok(Round::Abort);
        }

        let beta = estimator_error / (1.0 - estimator_error);
        let estimator_weight = self.config.learning_rate * (1.0 / beta).ln();
        if !last {
            for (w, l) in sample_weight.iter_mut().zip(&losses) {
                if *w > 0.0 {
                    *w *= beta.powf((1.0 - l) * self.config.learning_rate);
                }
            }
        }
        self.estimators.push(tree);
        self.weights.push(estimator_weight);
        Ok(Round::Continue)
    }

    /// Weighted median of the estimators' predictions for one row.
    fn predict_median(&self, row: ArrayView1<f64>) -> f64 {
        let mut preds: Vec<(f64, f64)> = self
            .estimators
            .iter()
            .zip(&self.weights)
            .map(|(t, &w)| (t.predict_row(row), w))
            .collect();
        preds.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total: f64 = preds.iter().map(|p| p.1).sum();
        let mut cumulative = 0.0;
        for &(value, weight) in &preds {
            cumulative += weight;
            if cumulative >= 0.5 * total {
                return value;
            }
        }
        preds.last().map_or(0.0, |p| p.0)
    }
}

impl Default for AdaBoost {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl Regressor for AdaBoost {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), StockfitError> {
        check_fit_input(FAMILY, x, y)?;
        if self.config.n_estimators == 0 {
            return Err(StockfitError::invalid_param(FAMILY, "n_estimators must be at least 1"));
        }

        self.estimators.clear();
        self.weights.clear();
        let n = y.len();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut sample_weight = vec![1.0 / n as f64; n];

        for round in 0..self.config.n_estimators {
            let last = round + 1 == self.config.n_estimators;
            match self.boost_round(x, y, &mut sample_weight, &mut rng, last)? {
                Round::Continue => {}
                Round::Perfect | Round::Abort => break,
            }
            let total: f64 = sample_weight.iter().sum();
            if total <= 0.0 {
                break;
            }
            if !last {
                sample_weight.iter_mut().for_each(|w| *w /= total);
            }
        }

        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, StockfitError> {
        if self.estimators.is_empty() {
            return Err(StockfitError::NotFitted {
                model: FAMILY.to_string(),
            });
        }
        check_predict_input(FAMILY, self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| self.predict_median(row)).collect())
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
                "loss" => {
                    self.config.loss = value
                        .as_text(FAMILY, key)?
                        .parse()
                        .map_err(|e: String| StockfitError::invalid_param(FAMILY, e))?;
                }
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
            .with("loss", self.config.loss.as_str())
            .with("random_state", self.config.seed as i64)
    }

    fn clone_unfitted(&self) -> Box<dyn Regressor> {
        Box::new(AdaBoost::new(self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::metrics::r2_score;
    use ndarray::{Array2, array};

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((80, 2), |(i, j)| ((i * (5 + j * 6)) % 80) as f64 / 8.0);
        let y = x.column(0).mapv(|v| 3.0 * v) + &x.column(1).mapv(|v| 0.5 * v);
        (x, y)
    }

    #[test]
    fn loss_parsing() {
        for loss in [BoostLoss::Linear, BoostLoss::Square, BoostLoss::Exponential] {
            assert_eq!(loss.as_str().parse::<BoostLoss>().unwrap(), loss);
        }
        assert!("huber".parse::<BoostLoss>().is_err());
    }

    #[test]
    fn loss_maps_into_unit_interval() {
        assert_eq!(BoostLoss::Linear.apply(0.5), 0.5);
        assert_eq!(BoostLoss::Square.apply(0.5), 0.25);
        assert!((BoostLoss::Exponential.apply(1.0) - (1.0 - (-1.0f64).exp())).abs() < 1e-12);
    }

    #[test]
    fn weighted_resample_respects_zero_weight() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let counts = AdaBoost::resample(&[0.5, 0.0, 0.5], &mut rng);
        assert_eq!(counts[1], 0.0);
        assert_eq!(counts.iter().sum::<f64>(), 3.0);
    }

    #[test]
    fn fits_each_loss() {
        let (x, y) = data();
        for loss in ["linear", "square", "exponential"] {
            let mut model = AdaBoost::default();
            model
                .set_params(&Params::new().with("loss", loss).with("n_estimators", 30i64))
                .unwrap();
            model.fit(x.view(), y.view()).unwrap();
            assert!(model.n_estimators_fitted() >= 1);
            let pred = model.predict(x.view()).unwrap();
            assert!(r2_score(y.view(), pred.view()).unwrap() > 0.9, "loss={loss}");
        }
    }

    #[test]
    fn deterministic_for_seed() {
        let (x, y) = data();
        let mut a = AdaBoost::with_seed(7);
        let mut b = AdaBoost::with_seed(7);
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();
        assert_eq!(a.predict(x.view()).unwrap(), b.predict(x.view()).unwrap());
    }

    #[test]
    fn constant_target_stops_early() {
        let x = array![[1.0], [2.0], [3.0]];
        let y = array![4.0, 4.0, 4.0];
        let mut model = AdaBoost::default();
        model.fit(x.view(), y.view()).unwrap();
        assert_eq!(model.n_estimators_fitted(), 1);
        assert_eq!(model.predict(x.view()).unwrap(), y);
    }

    #[test]
    fn rejects_bad_params() {
        let mut model = AdaBoost::default();
        assert!(model.set_params(&Params::new().with("loss", "huber")).is_err());
        assert!(model.set_params(&Params::new().with("learning_rate", 0.0)).is_err());
        assert!(model.set_params(&Params::new().with("max_depth", 3i64)).is_err());
    }
}
