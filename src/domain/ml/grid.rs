//! Exhaustive hyperparameter grids.

use crate::domain::ml::params::{ParamValue, Params};
use std::collections::BTreeMap;

/// Candidate values per hyperparameter.
///
/// Enumeration visits keys in name order with the first key varying slowest;
/// values keep their declared order.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis<V: Into<ParamValue>>(mut self, key: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.axes
            .insert(key.to_string(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.values().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn candidates(&self) -> Vec<Params> {
        let axes: Vec<(&String, &Vec<ParamValue>)> = self.axes.iter().collect();
        let total = self.len();
        let mut out = Vec::with_capacity(total);

        for flat in 0..total {
            let mut params = Params::new();
            let mut rest = flat;
            for (key, values) in axes.iter().rev() {
                params.insert(key, values[rest % values.len()].clone());
                rest /= values.len();
            }
            out.push(params);
        }
        out
    }
}
