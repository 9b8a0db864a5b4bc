//! Regression error metrics.

use crate::domain::error::StockfitError;
use ndarray::ArrayView1;

fn check_lengths(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<(), StockfitError> {
    if y_true.len() != y_pred.len() {
        return Err(StockfitError::shape(format!(
            "{} targets vs {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(StockfitError::shape("cannot score an empty prediction"));
    }
    Ok(())
}

pub fn mean_squared_error(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64, StockfitError> {
    check_lengths(y_true, y_pred)?;
    let sse: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok(sse / y_true.len() as f64)
}

pub fn root_mean_squared_error(
    y_true: ArrayView1<f64>,
    y_pred: ArrayView1<f64>,
) -> Result<f64, StockfitError> {
    mean_squared_error(y_true, y_pred).map(f64::sqrt)
}

/// Coefficient of determination. A constant target scores 1.0 when predicted
/// exactly and 0.0 otherwise.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64, StockfitError> {
    check_lengths(y_true, y_pred)?;
    let mean = y_true.sum() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Validation-set scores of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub rmse: f64,
    pub r2: f64,
}

impl Evaluation {
    pub fn compute(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<Self, StockfitError> {
        Ok(Self {
            rmse: root_mean_squared_error(y_true, y_pred)?,
            r2: r2_score(y_true, y_pred)?,
        })
    }
}

/// Cross-validation score; higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scoring {
    NegMeanSquaredError,
    NegRootMeanSquaredError,
}

impl Scoring {
    pub fn score(self, y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> Result<f64, StockfitError> {
        match self {
            Scoring::NegMeanSquaredError => mean_squared_error(y_true, y_pred).map(|v| -v),
            Scoring::NegRootMeanSquaredError => root_mean_squared_error(y_true, y_pred).map(|v| -v),
        }
    }
}
