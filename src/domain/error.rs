//! Domain error types.

/// Top-level error type for stockfit.
#[derive(Debug, thiserror::Error)]
pub enum StockfitError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("provider error for {ticker}: {reason}")]
    Provider { ticker: String, reason: String },

    #[error("network error for {ticker}: {reason}")]
    Network { ticker: String, reason: String },

    #[error("empty price series for {ticker}")]
    EmptySeries { ticker: String },

    #[error("shape mismatch: {reason}")]
    ShapeMismatch { reason: String },

    #[error("csv error: {reason}")]
    Csv { reason: String },

    #[error("cannot run {folds}-fold cross-validation on {samples} samples")]
    InsufficientSamples { samples: usize, folds: usize },

    #[error("invalid hyperparameter for {family}: {reason}")]
    InvalidHyperparameter { family: String, reason: String },

    #[error("{model} used before fit")]
    NotFitted { model: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StockfitError {
    pub fn shape(reason: impl Into<String>) -> Self {
        StockfitError::ShapeMismatch {
            reason: reason.into(),
        }
    }

    pub fn invalid_param(family: impl Into<String>, reason: impl Into<String>) -> Self {
        StockfitError::InvalidHyperparameter {
            family: family.into(),
            reason: reason.into(),
        }
    }

    /// Process exit status for a run that failed with this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            StockfitError::Io(_) => 1,
            StockfitError::ConfigParse { .. }
            | StockfitError::ConfigMissing { .. }
            | StockfitError::ConfigInvalid { .. } => 2,
            StockfitError::Provider { .. }
            | StockfitError::Network { .. }
            | StockfitError::EmptySeries { .. } => 3,
            StockfitError::ShapeMismatch { .. } | StockfitError::Csv { .. } => 4,
            StockfitError::InsufficientSamples { .. }
            | StockfitError::InvalidHyperparameter { .. }
            | StockfitError::NotFitted { .. } => 5,
        }
    }

    /// Whether retrying the same provider call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StockfitError::Network { .. })
    }
}

impl From<csv::Error> for StockfitError {
    fn from(err: csv::Error) -> Self {
        StockfitError::Csv {
            reason: err.to_string(),
        }
    }
}

impl From<&StockfitError> for std::process::ExitCode {
    fn from(err: &StockfitError) -> Self {
        std::process::ExitCode::from(err.exit_code())
    }
}
