use thiserror::Error;

/// A result type for GP algorithms
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`GpRegressor`](crate::GpRegressor), [`GpClassifier`](crate::GpClassifier),
/// [`GpMultiClassifier`](crate::GpMultiClassifier) or [`LassoGpRegressor`](crate::LassoGpRegressor)
#[derive(Error, Debug)]
pub enum GpError {
    /// When inputs, targets or variances lengths do not agree
    #[error("Length mismatch: {0}")]
    LengthMismatch(String),
    /// When a parameter (initial guess, objective name, ...) is invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),
    /// When asking for an unsupported score metric
    #[error("Invalid metric: {0}")]
    InvalidMetric(String),
    /// When a classification target is not a valid label
    #[error("Invalid label: {0}")]
    InvalidLabel(String),
    /// When Laplace mode finding does not converge
    #[error("Mode finding did not converge after {max_iterations} iterations (last relative change {last_change:e})")]
    NonConvergence {
        /// Iteration budget
        max_iterations: usize,
        /// Relative squared update at the last iteration
        last_change: f64,
    },
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When the L1 feature selection fails
    #[error(transparent)]
    LassoError(#[from] linfa_elasticnet::ElasticNetError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error during saving
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
    /// When error during loading
    #[error("Load error: {0}")]
    LoadError(String),
}
