//! Search, refit and evaluate one model family.

use crate::domain::error::StockfitError;
use crate::domain::ml::Regressor;
use crate::domain::ml::dataset::TrainValidSplit;
use crate::domain::ml::family::{FamilySpec, ModelFamily, SearchData};
use crate::domain::ml::metrics::Evaluation;
use crate::domain::ml::params::Params;
use crate::domain::ml::search::GridSearch;
use crate::ports::report_port::ReportPort;
use std::fmt;
use tracing::info;

/// A refitted model with its winning parameters and validation scores.
pub struct TrainedModel {
    pub family: ModelFamily,
    /// Winner of the grid search, before the production override.
    pub best_params: Params,
    pub model: Box<dyn Regressor>,
    pub evaluation: Evaluation,
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("family", &self.family)
            .field("best_params", &self.best_params)
            .field("model_params", &self.model.params())
            .field("evaluation", &self.evaluation)
            .finish()
    }
}

pub fn train_family(
    spec: &FamilySpec,
    split: &TrainValidSplit,
    seed: u64,
) -> Result<TrainedModel, StockfitError> {
    let family = spec.family;
    let base = family.estimator(seed);

    let combined;
    let search_data = match spec.search_data {
        SearchData::TrainOnly => &split.train,
        SearchData::Combined => {
            combined = split.combined()?;
            &combined
        }
    };

    info!(
        family = family.key(),
        candidates = spec.grid.len(),
        folds = spec.folds,
        samples = search_data.n_samples(),
        "grid search"
    );
    let search = GridSearch::new(spec.grid.clone(), spec.folds, spec.scoring).parallel(spec.parallel);
    let result = search.fit(base.as_ref(), search_data)?;
    info!(
        family = family.key(),
        best_params = %result.best_params,
        best_score = result.best_score,
        "best parameters"
    );

    let mut refit = result.best_params.clone();
    if let Some((key, value)) = &spec.production {
        refit.insert(key, value.clone());
    }
    let mut model = base.clone_unfitted();
    model.set_params(&refit)?;
    model.fit(split.train.features.view(), split.train.target.view())?;

    let pred = model.predict(split.valid.features.view())?;
    let evaluation = Evaluation::compute(split.valid.target.view(), pred.view())?;
    info!(
        family = family.key(),
        rmse = evaluation.rmse,
        r2 = evaluation.r2,
        "validation"
    );

    Ok(TrainedModel {
        family,
        best_params: result.best_params,
        model,
        evaluation,
    })
}

/// Train `families` in order on the same split, reporting each evaluation
/// as soon as it is available.
pub fn train_families(
    families: &[ModelFamily],
    split: &TrainValidSplit,
    seed: u64,
    report: &dyn ReportPort,
) -> Result<Vec<TrainedModel>, StockfitError> {
    let mut trained = Vec::with_capacity(families.len());
    for family in families {
        let model = train_family(&family.spec(), split, seed)?;
        report.evaluation(family.display_name(), &model.evaluation);
        trained.push(model);
    }
    Ok(trained)
}
