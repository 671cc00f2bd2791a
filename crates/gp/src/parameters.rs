use crate::errors::{GpError, Result};
use crate::mean_models::PriorMean;
use crate::optimization::{Algorithm, GP_OPTIM_MAX_EVAL};
use linfa::{Float, ParamGuard};
use ndarray::Array1;
use seqgp_kernels::Kernel;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default initial value of every hyperparameter
pub const DEFAULT_GUESS: f64 = 0.9;

/// Objective maximized when fitting a [GpRegressor](crate::GpRegressor)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Objective {
    /// Log marginal likelihood
    #[default]
    #[cfg_attr(feature = "serializable", serde(rename = "log_ML"))]
    MarginalLikelihood,
    /// Leave-one-out log predictive probability
    #[cfg_attr(feature = "serializable", serde(rename = "LOO_log_p"))]
    LeaveOneOut,
}

impl Objective {
    /// Symbolic name used in persisted models
    pub fn tag(&self) -> &'static str {
        match self {
            Objective::MarginalLikelihood => "log_ML",
            Objective::LeaveOneOut => "LOO_log_p",
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for Objective {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "log_ML" => Ok(Objective::MarginalLikelihood),
            "LOO_log_p" => Ok(Objective::LeaveOneOut),
            _ => Err(GpError::ConfigError(format!(
                "unknown objective '{s}', expected 'log_ML' or 'LOO_log_p'"
            ))),
        }
    }
}

/// A set of validated GP regression parameters.
#[derive(Clone, Debug)]
pub struct GpRegressorValidParams<F: Float, Mean, K: Kernel<F>> {
    /// Prior mean model, fitted on normalized targets
    pub(crate) mean: Mean,
    /// Covariance kernel
    pub(crate) kernel: K,
    /// Objective maximized by the hyperparameters optimization
    pub(crate) objective: Objective,
    /// Initial hyperparameters, noise variance first when no variances are given
    pub(crate) guesses: Option<Array1<F>>,
    /// Number of random restarts of the optimization
    pub(crate) n_start: usize,
    /// Max number of objective evaluations during one optimization
    pub(crate) max_eval: usize,
    /// Optimizer
    pub(crate) algorithm: Algorithm,
    /// Whether hyperparameters are optimized or used as given
    pub(crate) optimize: bool,
}

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> GpRegressorValidParams<F, Mean, K> {
    /// Get mean model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Get kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get objective
    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Get initial hyperparameters if any
    pub fn guesses(&self) -> Option<&Array1<F>> {
        self.guesses.as_ref()
    }

    /// Get the number of random restarts
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of objective evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get optimizer
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Whether hyperparameters are optimized during fitting
    pub fn is_optimized(&self) -> bool {
        self.optimize
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GP regression algorithm](crate::GpRegressor).
pub struct GpRegressorParams<F: Float, Mean, K: Kernel<F>>(
    pub(crate) GpRegressorValidParams<F, Mean, K>,
);

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> GpRegressorParams<F, Mean, K> {
    /// A constructor for GP parameters given mean model and kernel
    pub fn new(mean: Mean, kernel: K) -> GpRegressorParams<F, Mean, K> {
        Self(GpRegressorValidParams {
            mean,
            kernel,
            objective: Objective::default(),
            guesses: None,
            n_start: 0,
            max_eval: GP_OPTIM_MAX_EVAL,
            algorithm: Algorithm::default(),
            optimize: true,
        })
    }

    /// Set mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set kernel.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set the objective maximized during fitting.
    pub fn objective(mut self, objective: Objective) -> Self {
        self.0.objective = objective;
        self
    }

    /// Set initial hyperparameters.
    ///
    /// When no per-point variances are given to the fit, the first value
    /// is the noise variance and the others are kernel hyperparameters.
    /// Default to [DEFAULT_GUESS] for every hyperparameter.
    pub fn guesses(mut self, guesses: Array1<F>) -> Self {
        self.0.guesses = Some(guesses);
        self.0.optimize = true;
        self
    }

    /// Set constant hyperparameters: no optimization takes place.
    pub fn fixed_hypers(mut self, hypers: Array1<F>) -> Self {
        self.0.guesses = Some(hypers);
        self.0.optimize = false;
        self
    }

    /// Set the number of random restarts of the hyperparameters optimization
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of objective evaluations during one optimization
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = max_eval;
        self
    }

    /// Set optimizer
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.0.algorithm = algorithm;
        self
    }
}

impl<F: Float, Mean, K: Kernel<F>> From<GpRegressorValidParams<F, Mean, K>>
    for GpRegressorParams<F, Mean, K>
{
    fn from(valid: GpRegressorValidParams<F, Mean, K>) -> Self {
        GpRegressorParams(valid)
    }
}

/// Checks shared by every model parameters
pub(crate) fn check_optim_params<F: Float>(
    guesses: Option<&Array1<F>>,
    max_eval: usize,
) -> Result<()> {
    if max_eval == 0 {
        return Err(GpError::ConfigError(
            "`max_eval` should be strictly positive".to_string(),
        ));
    }
    if let Some(g) = guesses {
        if g.iter().any(|v| !v.is_finite() || *v <= F::zero()) {
            return Err(GpError::ConfigError(format!(
                "initial hyperparameters should be finite positive values, got {g}"
            )));
        }
    }
    Ok(())
}

/// Initial hyperparameters given the expected count
pub(crate) fn initial_hypers<F: Float>(guesses: Option<&Array1<F>>, n_hypers: usize) -> Result<Array1<F>> {
    match guesses {
        Some(g) if g.len() != n_hypers => Err(GpError::ConfigError(format!(
            "{} initial hyperparameters given while {} are required",
            g.len(),
            n_hypers
        ))),
        Some(g) => Ok(g.to_owned()),
        None => Ok(Array1::from_elem(n_hypers, F::cast(DEFAULT_GUESS))),
    }
}

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> ParamGuard for GpRegressorParams<F, Mean, K> {
    type Checked = GpRegressorValidParams<F, Mean, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_optim_params(self.0.guesses.as_ref(), self.0.max_eval)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
