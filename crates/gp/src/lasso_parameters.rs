use crate::errors::{GpError, Result};
use crate::mean_models::PriorMean;
use crate::parameters::{check_optim_params, GpRegressorParams, GpRegressorValidParams};
use linfa::{Float, ParamGuard};
use seqgp_kernels::Kernel;

/// Default max number of evaluations of the regularization search
pub const LASSO_OPTIM_MAX_EVAL: usize = 50;

/// A set of validated L1 feature selection GP regression parameters.
#[derive(Clone, Debug)]
pub struct LassoGpRegressorValidParams<F: Float, Mean, K: Kernel<F, Elem = F>> {
    /// Parameters of the regressor fitted on selected columns
    pub(crate) gp_params: GpRegressorValidParams<F, Mean, K>,
    /// Initial log of the L1 penalty
    pub(crate) gamma: F,
    /// Max number of evaluations of the regularization search
    pub(crate) max_eval: usize,
}

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> LassoGpRegressorValidParams<F, Mean, K> {
    /// Get inner regressor parameters
    pub fn gp_params(&self) -> &GpRegressorValidParams<F, Mean, K> {
        &self.gp_params
    }

    /// Get initial log of the L1 penalty
    pub fn gamma(&self) -> F {
        self.gamma
    }

    /// Get the max number of evaluations of the regularization search
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [L1 feature selection GP regression](crate::LassoGpRegressor).
pub struct LassoGpRegressorParams<F: Float, Mean, K: Kernel<F, Elem = F>>(
    pub(crate) LassoGpRegressorValidParams<F, Mean, K>,
);

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> LassoGpRegressorParams<F, Mean, K> {
    /// A constructor given the inner regressor parameters
    pub fn new(gp_params: GpRegressorParams<F, Mean, K>) -> Self {
        Self(LassoGpRegressorValidParams {
            gp_params: gp_params.0,
            gamma: F::zero(),
            max_eval: LASSO_OPTIM_MAX_EVAL,
        })
    }

    /// Set inner regressor parameters
    pub fn gp_params(mut self, gp_params: GpRegressorParams<F, Mean, K>) -> Self {
        self.0.gp_params = gp_params.0;
        self
    }

    /// Set initial log of the L1 penalty, default to 0.
    pub fn gamma(mut self, gamma: F) -> Self {
        self.0.gamma = gamma;
        self
    }

    /// Set the max number of evaluations of the regularization search
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = max_eval;
        self
    }
}

impl<F: Float, Mean: PriorMean<F, F>, K: Kernel<F, Elem = F>> ParamGuard
    for LassoGpRegressorParams<F, Mean, K>
{
    type Checked = LassoGpRegressorValidParams<F, Mean, K>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if !self.0.gamma.is_finite() {
            return Err(GpError::ConfigError(format!(
                "initial gamma should be finite, got {}",
                self.0.gamma
            )));
        }
        check_optim_params(self.0.gp_params.guesses.as_ref(), self.0.max_eval)?;
        check_optim_params(self.0.gp_params.guesses.as_ref(), self.0.gp_params.max_eval)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
