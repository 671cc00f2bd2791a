use crate::classifier_algorithm::LAPLACE_MAX_ITER;
use crate::errors::{GpError, Result};
use crate::optimization::{Algorithm, GP_OPTIM_MAX_EVAL};
use crate::parameters::check_optim_params;
use linfa::{Float, ParamGuard};
use ndarray::Array1;
use seqgp_kernels::Kernel;

/// A set of validated GP classification parameters.
#[derive(Clone, Debug)]
pub struct GpClassifierValidParams<F: Float, K: Kernel<F>> {
    /// Covariance kernel of the latent function
    pub(crate) kernel: K,
    /// Initial kernel hyperparameters
    pub(crate) guesses: Option<Array1<F>>,
    /// Number of random restarts of the optimization
    pub(crate) n_start: usize,
    /// Max number of objective evaluations during one optimization
    pub(crate) max_eval: usize,
    /// Optimizer
    pub(crate) algorithm: Algorithm,
    /// Whether hyperparameters are optimized or used as given
    pub(crate) optimize: bool,
    /// Newton iterations budget of the mode finding
    pub(crate) max_iterations: usize,
}

impl<F: Float, K: Kernel<F>> GpClassifierValidParams<F, K> {
    /// Get kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Get initial hyperparameters if any
    pub fn guesses(&self) -> Option<&Array1<F>> {
        self.guesses.as_ref()
    }

    /// Get the number of random restarts
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of objective evaluations
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

    /// Get the Newton iterations budget of the mode finding
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [binary GP classification algorithm](crate::GpClassifier).
pub struct GpClassifierParams<F: Float, K: Kernel<F>>(pub(crate) GpClassifierValidParams<F, K>);

impl<F: Float, K: Kernel<F>> GpClassifierParams<F, K> {
    /// A constructor for GP classifier parameters given a kernel
    pub fn new(kernel: K) -> GpClassifierParams<F, K> {
        Self(GpClassifierValidParams {
            kernel,
            guesses: None,
            n_start: 0,
            max_eval: GP_OPTIM_MAX_EVAL,
            algorithm: Algorithm::default(),
            optimize: true,
            max_iterations: LAPLACE_MAX_ITER,
        })
    }

    /// Set kernel.
    pub fn kernel(mut self, kernel: K) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set initial kernel hyperparameters (there is no noise hyperparameter).
    pub fn guesses(mut self, guesses: Array1<F>) -> Self {
        self.0.guesses = Some(guesses);
        self.0.optimize = true;
        self
    }

    /// Set constant kernel hyperparameters: no optimization takes place.
    pub fn fixed_hypers(mut self, hypers: Array1<F>) -> Self {
        self.0.guesses = Some(hypers);
        self.0.optimize = false;
        self
    }

    /// Set the number of random restarts
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

    /// Set the Newton iterations budget of the mode finding, default to 1000.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.0.max_iterations = max_iterations;
        self
    }
}

impl<F: Float, K: Kernel<F>> ParamGuard for GpClassifierParams<F, K> {
    type Checked = GpClassifierValidParams<F, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_optim_params(self.0.guesses.as_ref(), self.0.max_eval)?;
        check_max_iterations(self.0.max_iterations)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// Mode finding needs at least one Newton iteration
pub(crate) fn check_max_iterations(max_iterations: usize) -> Result<()> {
    if max_iterations == 0 {
        return Err(GpError::ConfigError(
            "max_iterations should be strictly positive".to_string(),
        ));
    }
    Ok(())
}
