//! Exhaustive grid search with k-fold cross-validation.

use crate::domain::error::StockfitError;
use crate::domain::ml::Regressor;
use crate::domain::ml::cv::{Fold, KFold};
use crate::domain::ml::dataset::Dataset;
use crate::domain::ml::grid::ParamGrid;
use crate::domain::ml::metrics::Scoring;
use crate::domain::ml::params::Params;
use rayon::prelude::*;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GridSearch {
    pub grid: ParamGrid,
    pub folds: usize,
    pub scoring: Scoring,
    /// Score candidates on the rayon pool.
    pub parallel: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub params: Params,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub best_params: Params,
    pub best_score: f64,
    /// Every candidate in enumeration order.
    pub candidates: Vec<CandidateScore>,
}

impl GridSearch {
    pub fn new(grid: ParamGrid, folds: usize, scoring: Scoring) -> Self {
        Self {
            grid,
            folds,
            scoring,
            parallel: false,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Score every grid candidate on `data` starting from `base`'s
    /// parameters. Ties go to the earliest candidate.
    pub fn fit(&self, base: &dyn Regressor, data: &Dataset) -> Result<SearchResult, StockfitError> {
        if self.grid.is_empty() {
            return Err(StockfitError::invalid_param(
                "grid_search",
                "parameter grid has no candidates",
            ));
        }
        let folds = KFold::new(self.folds).split(data.n_samples())?;
        let candidates = self.grid.candidates();
        debug!(
            candidates = candidates.len(),
            folds = self.folds,
            samples = data.n_samples(),
            "starting grid search"
        );

        let scored: Vec<CandidateScore> = if self.parallel {
            candidates
                .into_par_iter()
                .map(|params| self.score_candidate(base, data, &folds, params))
                .collect::<Result<_, _>>()?
        } else {
            candidates
                .into_iter()
                .map(|params| self.score_candidate(base, data, &folds, params))
                .collect::<Result<_, _>>()?
        };

        let mut best = 0;
        for (i, candidate) in scored.iter().enumerate().skip(1) {
            if candidate.mean_score > scored[best].mean_score {
                best = i;
            }
        }

        Ok(SearchResult {
            best_params: scored[best].params.clone(),
            best_score: scored[best].mean_score,
            candidates: scored,
        })
    }

    fn score_candidate(
        &self,
        base: &dyn Regressor,
        data: &Dataset,
        folds: &[Fold],
        params: Params,
    ) -> Result<CandidateScore, StockfitError> {
        let mut fold_scores = Vec::with_capacity(folds.len());
        for fold in folds {
            let train = data.select_rows(&fold.train);
            let test = data.select_rows(&fold.test);

            let mut model = base.clone_unfitted();
            model.set_params(&params)?;
            model.fit(train.features.view(), train.target.view())?;
            let pred = model.predict(test.features.view())?;
            fold_scores.push(self.scoring.score(test.target.view(), pred.view())?);
        }

        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        debug!(params = %params, mean_score, "scored candidate");
        Ok(CandidateScore {
            params,
            mean_score,
            fold_scores,
        })
    }
}
