//! K-fold cross-validation splits.

use crate::domain::error::StockfitError;

/// Contiguous, unshuffled folds. The first `n % k` folds hold one extra
/// sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn split(&self, n_samples: usize) -> Result<Vec<Fold>, StockfitError> {
        let k = self.n_splits;
        if k < 2 || n_samples < k {
            return Err(StockfitError::InsufficientSamples {
                samples: n_samples,
                folds: k,
            });
        }

        let base = n_samples / k;
        let extra = n_samples % k;
        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for i in 0..k {
            let size = base + usize::from(i < extra);
            let end = start + size;
            folds.push(Fold {
                train: (0..start).chain(end..n_samples).collect(),
                test: (start..end).collect(),
            });
            start = end;
        }
        Ok(folds)
    }
}
