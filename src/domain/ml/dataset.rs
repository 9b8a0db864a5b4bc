//! Feature matrix / target vector pairs.

use crate::domain::error::StockfitError;
use crate::domain::table::PriceTable;
use ndarray::{Array1, Array2, Axis, concatenate};

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub features: Array2<f64>,
    pub target: Array1<f64>,
}

impl Dataset {
    pub fn new(
        feature_names: Vec<String>,
        features: Array2<f64>,
        target: Array1<f64>,
    ) -> Result<Self, StockfitError> {
        if features.nrows() != target.len() {
            return Err(StockfitError::shape(format!(
                "{} feature rows vs {} targets",
                features.nrows(),
                target.len()
            )));
        }
        if features.ncols() != feature_names.len() {
            return Err(StockfitError::shape(format!(
                "{} feature columns vs {} names",
                features.ncols(),
                feature_names.len()
            )));
        }
        Ok(Self {
            feature_names,
            features,
            target,
        })
    }

    /// Use `target` as the target and every other column, except those in
    /// `drop_columns`, as features. Any missing cell is rejected.
    pub fn from_table(
        table: &PriceTable,
        target: &str,
        drop_columns: &[&str],
    ) -> Result<Self, StockfitError> {
        let target_column = table.column(target).ok_or_else(|| {
            StockfitError::shape(format!("{} has no target column {}", table.ticker, target))
        })?;
        let feature_columns: Vec<_> = table
            .columns()
            .iter()
            .filter(|c| c.name != target && !drop_columns.contains(&c.name.as_str()))
            .collect();

        let complete = |name: &str, row: usize, v: Option<f64>| {
            v.ok_or_else(|| {
                StockfitError::shape(format!(
                    "{} has a missing {} value on {}",
                    table.ticker,
                    name,
                    table.dates()[row]
                ))
            })
        };

        let rows = table.row_count();
        let mut features = Array2::zeros((rows, feature_columns.len()));
        for (j, column) in feature_columns.iter().enumerate() {
            for (i, v) in column.values.iter().enumerate() {
                features[[i, j]] = complete(&column.name, i, *v)?;
            }
        }
        let target_values = target_column
            .values
            .iter()
            .enumerate()
            .map(|(i, v)| complete(target, i, *v))
            .collect::<Result<Vec<f64>, _>>()?;

        Dataset::new(
            feature_columns.iter().map(|c| c.name.clone()).collect(),
            features,
            Array1::from(target_values),
        )
    }

    pub fn n_samples(&self) -> usize {
        self.target.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn select_rows(&self, rows: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            features: self.features.select(Axis(0), rows),
            target: self.target.select(Axis(0), rows),
        }
    }

    /// Rows of `self` followed by the rows of `other`.
    pub fn concat(&self, other: &Dataset) -> Result<Dataset, StockfitError> {
        check_schema(self, other)?;
        let features = concatenate(Axis(0), &[self.features.view(), other.features.view()])
            .map_err(|e| StockfitError::shape(e.to_string()))?;
        let target = concatenate(Axis(0), &[self.target.view(), other.target.view()])
            .map_err(|e| StockfitError::shape(e.to_string()))?;
        Dataset::new(self.feature_names.clone(), features, target)
    }
}

fn check_schema(a: &Dataset, b: &Dataset) -> Result<(), StockfitError> {
    if a.feature_names != b.feature_names {
        return Err(StockfitError::shape(format!(
            "feature columns differ: [{}] vs [{}]",
            a.feature_names.join(", "),
            b.feature_names.join(", ")
        )));
    }
    Ok(())
}

/// Pre-split training and validation data with a shared schema.
#[derive(Debug, Clone)]
pub struct TrainValidSplit {
    pub train: Dataset,
    pub valid: Dataset,
}

impl TrainValidSplit {
    pub fn new(train: Dataset, valid: Dataset) -> Result<Self, StockfitError> {
        check_schema(&train, &valid)?;
        Ok(Self { train, valid })
    }

    pub fn combined(&self) -> Result<Dataset, StockfitError> {
        self.train.concat(&self.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::Column;
    use chrono::NaiveDate;
    use ndarray::array;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_checks_shapes() {
        assert!(Dataset::new(names(&["a"]), array![[1.0], [2.0]], array![1.0]).is_err());
        assert!(Dataset::new(names(&["a", "b"]), array![[1.0], [2.0]], array![1.0, 2.0]).is_err());
        assert!(Dataset::new(names(&["a"]), array![[1.0], [2.0]], array![1.0, 2.0]).is_ok());
    }

    #[test]
    fn from_table_splits_target() {
        let dates: Vec<NaiveDate> = (1..=3)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let table = PriceTable::new(
            "T",
            dates,
            vec![
                Column::new("x1", vec![Some(1.0), Some(2.0), Some(3.0)]),
                Column::new("skip", vec![None, None, None]),
                Column::new("y", vec![Some(10.0), Some(20.0), Some(30.0)]),
                Column::new("x2", vec![Some(4.0), Some(5.0), Some(6.0)]),
            ],
        )
        .unwrap();

        let ds = Dataset::from_table(&table, "y", &["skip"]).unwrap();
        assert_eq!(ds.feature_names, names(&["x1", "x2"]));
        assert_eq!(ds.features, array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
        assert_eq!(ds.target, array![10.0, 20.0, 30.0]);

        let err = Dataset::from_table(&table, "y", &[]).unwrap_err();
        assert!(matches!(err, StockfitError::ShapeMismatch { .. }));
        assert!(Dataset::from_table(&table, "missing", &["skip"]).is_err());
    }

    #[test]
    fn concat_and_select() {
        let a = Dataset::new(names(&["x"]), array![[1.0], [2.0]], array![1.0, 2.0]).unwrap();
        let b = Dataset::new(names(&["x"]), array![[3.0]], array![3.0]).unwrap();
        let all = a.concat(&b).unwrap();
        assert_eq!(all.n_samples(), 3);
        assert_eq!(all.select_rows(&[2, 0]).target, array![3.0, 1.0]);
    }

    #[test]
    fn split_requires_same_schema() {
        let a = Dataset::new(names(&["x"]), array![[1.0]], array![1.0]).unwrap();
        let b = Dataset::new(names(&["z"]), array![[1.0]], array![1.0]).unwrap();
        assert!(TrainValidSplit::new(a.clone(), b).is_err());
        assert!(TrainValidSplit::new(a.clone(), a).is_ok());
    }
}
