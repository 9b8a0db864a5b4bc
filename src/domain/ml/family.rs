//! The five model families and their search settings.

use crate::domain::error::StockfitError;
use crate::domain::ml::Regressor;
use crate::domain::ml::adaboost::AdaBoost;
use crate::domain::ml::forest::RandomForest;
use crate::domain::ml::grid::ParamGrid;
use crate::domain::ml::leafwise_boost::LeafwiseBoost;
use crate::domain::ml::metrics::Scoring;
use crate::domain::ml::oblivious_boost::ObliviousBoost;
use crate::domain::ml::params::ParamValue;
use crate::domain::ml::tree::RegressionTree;
use std::fmt;
use std::str::FromStr;

/// Estimator count used during search; the refit raises it to
/// [`PRODUCTION_ESTIMATORS`].
pub const SEARCH_ESTIMATORS: i64 = 100;
pub const PRODUCTION_ESTIMATORS: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    DecisionTree,
    RandomForest,
    AdaBoost,
    ObliviousBoost,
    LeafwiseBoost,
}

/// Which rows the grid search sees. The final refit always uses the
/// training rows only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchData {
    TrainOnly,
    /// Training rows followed by validation rows.
    Combined,
}

#[derive(Debug, Clone)]
pub struct FamilySpec {
    pub family: ModelFamily,
    pub grid: ParamGrid,
    pub folds: usize,
    pub scoring: Scoring,
    pub parallel: bool,
    pub search_data: SearchData,
    /// Parameter raised for the refit, with its production value.
    pub production: Option<(&'static str, ParamValue)>,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 5] = [
        ModelFamily::DecisionTree,
        ModelFamily::RandomForest,
        ModelFamily::AdaBoost,
        ModelFamily::ObliviousBoost,
        ModelFamily::LeafwiseBoost,
    ];

    /// Configuration / CLI key.
    pub fn key(self) -> &'static str {
        match self {
            ModelFamily::DecisionTree => "decision_tree",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::AdaBoost => "adaboost",
            ModelFamily::ObliviousBoost => "oblivious_boost",
            ModelFamily::LeafwiseBoost => "leafwise_boost",
        }
    }

    /// Heading used in the validation report.
    pub fn display_name(self) -> &'static str {
        match self {
            ModelFamily::DecisionTree => "Árbol de Decisión",
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::AdaBoost => "AdaBoost",
            ModelFamily::ObliviousBoost => "Oblivious GBM",
            ModelFamily::LeafwiseBoost => "Leaf-wise GBM",
        }
    }

    /// Unfitted estimator with the family's search-time defaults.
    pub fn estimator(self, seed: u64) -> Box<dyn Regressor> {
        match self {
            ModelFamily::DecisionTree => Box::new(RegressionTree::with_seed(seed)),
            ModelFamily::RandomForest => Box::new(RandomForest::with_seed(seed)),
            ModelFamily::AdaBoost => Box::new(AdaBoost::with_seed(seed)),
            ModelFamily::ObliviousBoost => Box::new(ObliviousBoost::with_seed(seed)),
            ModelFamily::LeafwiseBoost => Box::new(LeafwiseBoost::with_seed(seed)),
        }
    }

    pub fn spec(self) -> FamilySpec {
        let production = |key: &'static str| Some((key, ParamValue::Int(PRODUCTION_ESTIMATORS)));
        match self {
            ModelFamily::DecisionTree => FamilySpec {
                family: self,
                grid: ParamGrid::new()
                    .axis("max_depth", [Some(3usize), Some(5), Some(10), None])
                    .axis("min_samples_split", [2i64, 5, 10])
                    .axis("min_samples_leaf", [1i64, 2, 4]),
                folds: 5,
                scoring: Scoring::NegMeanSquaredError,
                parallel: false,
                search_data: SearchData::TrainOnly,
                production: None,
            },
            ModelFamily::RandomForest => FamilySpec {
                family: self,
                grid: ParamGrid::new()
                    .axis("max_depth", [5i64, 10, 15])
                    .axis("min_samples_split", [2i64, 5])
                    .axis("min_samples_leaf", [1i64, 2])
                    .axis("bootstrap", [true, false]),
                folds: 3,
                scoring: Scoring::NegMeanSquaredError,
                parallel: true,
                search_data: SearchData::TrainOnly,
                production: production("n_estimators"),
            },
            ModelFamily::AdaBoost => FamilySpec {
                family: self,
                grid: ParamGrid::new()
                    .axis("learning_rate", [0.01, 0.1, 1.0])
                    .axis("loss", ["linear", "square", "exponential"]),
                folds: 3,
                scoring: Scoring::NegMeanSquaredError,
                parallel: true,
                search_data: SearchData::TrainOnly,
                production: production("n_estimators"),
            },
            ModelFamily::ObliviousBoost => FamilySpec {
                family: self,
                grid: ParamGrid::new()
                    .axis("depth", [2i64, 4, 6, 8])
                    .axis("learning_rate", [0.01, 0.05, 0.1, 1.0])
                    .axis("l2_leaf_reg", [1.0, 3.0, 5.0, 7.0]),
                folds: 3,
                scoring: Scoring::NegRootMeanSquaredError,
                parallel: true,
                search_data: SearchData::Combined,
                production: production("iterations"),
            },
            ModelFamily::LeafwiseBoost => FamilySpec {
                family: self,
                grid: ParamGrid::new()
                    .axis("max_depth", [3i64, 5, 7])
                    .axis("learning_rate", [0.01, 0.05, 0.1])
                    .axis("subsample", [0.7, 0.9, 1.0])
                    .axis("colsample_bytree", [0.7, 1.0]),
                folds: 3,
                scoring: Scoring::NegRootMeanSquaredError,
                parallel: true,
                search_data: SearchData::Combined,
                production: production("n_estimators"),
            },
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ModelFamily {
    type Err = StockfitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ModelFamily::ALL
            .into_iter()
            .find(|f| f.key() == wanted)
            .ok_or_else(|| StockfitError::ConfigInvalid {
                section: "train".to_string(),
                key: "family".to_string(),
                reason: format!(
                    "unknown model family {s:?}, expected one of: {}",
                    ModelFamily::ALL.map(ModelFamily::key).join(", ")
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_sizes() {
        let sizes: Vec<usize> = ModelFamily::ALL.iter().map(|f| f.spec().grid.len()).collect();
        assert_eq!(sizes, vec![36, 24, 9, 64, 54]);
    }

    #[test]
    fn parses_keys() {
        assert_eq!("random_forest".parse::<ModelFamily>().unwrap(), ModelFamily::RandomForest);
        assert_eq!("Leafwise-Boost".parse::<ModelFamily>().unwrap(), ModelFamily::LeafwiseBoost);
        assert!("svm".parse::<ModelFamily>().is_err());
    }

    #[test]
    fn every_grid_candidate_is_accepted() {
        for family in ModelFamily::ALL {
            let spec = family.spec();
            for params in spec.grid.candidates() {
                let mut model = family.estimator(42);
                model.set_params(&params).unwrap();
            }
            if let Some((key, value)) = spec.production {
                let mut model = family.estimator(42);
                model.set_params(&crate::domain::ml::params::Params::new().with(key, value)).unwrap();
            }
        }
    }

    #[test]
    fn search_defaults_use_100_estimators() {
        for family in [ModelFamily::RandomForest, ModelFamily::AdaBoost, ModelFamily::LeafwiseBoost] {
            let params = family.estimator(42).params();
            assert_eq!(params.get("n_estimators"), Some(&ParamValue::Int(SEARCH_ESTIMATORS)));
        }
        let params = ModelFamily::ObliviousBoost.estimator(42).params();
        assert_eq!(params.get("iterations"), Some(&ParamValue::Int(SEARCH_ESTIMATORS)));
    }

    #[test]
    fn display_uses_report_heading() {
        assert_eq!(ModelFamily::DecisionTree.to_string(), "Árbol de Decisión");
    }
}
