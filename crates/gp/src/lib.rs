//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) models
//! over encoded biological sequences, given a covariance [Kernel](seqgp_kernels::Kernel)
//! from `seqgp-kernels`.
//!
//! The following models are available:
//! * regression with noise variance or per-point variances, hyperparameters tuned by
//!   log marginal likelihood or leave-one-out log predictive probability:
//!   [GpRegressor] parameterized by [GpRegressorParams],
//! * binary classification with a logistic likelihood under the Laplace approximation:
//!   [GpClassifier] parameterized by [GpClassifierParams],
//! * multi-class classification with a softmax likelihood under the Laplace approximation:
//!   [GpMultiClassifier] parameterized by [GpMultiClassifierParams],
//! * regression on features selected by an L1 regularized linear model:
//!   [LassoGpRegressor] parameterized by [LassoGpRegressorParams].
//!
//! Covariance matrices are factorized with a [StabilizedCholesky](linalg::StabilizedCholesky)
//! decomposition which perturbs the diagonal of non positive definite matrices,
//! so that training on duplicated items or with zero variances does not fail.
//!
//! With the `persistent` feature, fitted models can be saved to and loaded from
//! versioned JSON files (see `GpRegressor::save`). The `serializable` feature
//! only derives serde traits on kernels, mean models and parameters.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod classifier_algorithm;
mod errors;
mod lasso_algorithm;
pub mod linalg;
pub mod mean_models;
pub mod metrics;
mod multiclass_algorithm;

mod classifier_parameters;
mod lasso_parameters;
mod multiclass_parameters;
mod parameters;
mod utils;

mod optimization;
#[cfg(feature = "persistent")]
mod persistence;

pub use algorithm::*;
pub use classifier_algorithm::GpClassifier;
pub use classifier_parameters::*;
pub use errors::*;
pub use lasso_algorithm::*;
pub use lasso_parameters::*;
pub use multiclass_algorithm::{expand, softmax, split_hypers, stack, unstack, GpMultiClassifier};
pub use multiclass_parameters::*;
pub use optimization::{Algorithm, GP_OPTIM_MAX_EVAL, HYPERS_LOWER_BOUND, HYPERS_UPPER_BOUND};
pub use parameters::*;
#[cfg(feature = "persistent")]
pub use persistence::GP_SCHEMA_VERSION;
pub use utils::Normalization;
