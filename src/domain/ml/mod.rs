//! Regression model families, hyperparameter search and evaluation.
//!
//! Every estimator implements [`Regressor`]; [`train::train_family`] runs the
//! shared search, refit and evaluate routine for one [`family::ModelFamily`].

pub mod adaboost;
pub mod binning;
pub mod cv;
pub mod dataset;
pub mod family;
pub mod forest;
pub mod grid;
pub mod leafwise_boost;
pub mod metrics;
pub mod oblivious_boost;
pub mod params;
pub mod search;
pub mod train;
pub mod tree;

use crate::domain::error::StockfitError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use params::Params;

/// Default seed for every randomised estimator.
pub const DEFAULT_SEED: u64 = 42;

pub trait Regressor: Send + Sync {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<(), StockfitError>;

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, StockfitError>;

    /// Apply every entry of `params`; unknown names and out-of-range values
    /// are rejected.
    fn set_params(&mut self, params: &Params) -> Result<(), StockfitError>;

    fn params(&self) -> Params;

    /// Unfitted copy with the same parameters.
    fn clone_unfitted(&self) -> Box<dyn Regressor>;
}

pub(crate) fn check_fit_input(
    model: &str,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
) -> Result<(), StockfitError> {
    if x.nrows() != y.len() {
        return Err(StockfitError::shape(format!(
            "{model}: {} feature rows vs {} targets",
            x.nrows(),
            y.len()
        )));
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(StockfitError::shape(format!(
            "{model}: cannot fit on a {}x{} matrix",
            x.nrows(),
            x.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn check_predict_input(
    model: &str,
    expected: usize,
    x: ArrayView2<f64>,
) -> Result<(), StockfitError> {
    if x.ncols() != expected {
        return Err(StockfitError::shape(format!(
            "{model}: fitted on {expected} features, got {}",
            x.ncols()
        )));
    }
    Ok(())
}
