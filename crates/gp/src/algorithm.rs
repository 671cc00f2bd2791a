use crate::errors::{GpError, Result};
use crate::linalg::{inverse, StabilizedCholesky};
use crate::mean_models::PriorMean;
use crate::metrics::{parse_metrics, score_with, Score};
use crate::optimization::{optimize_hypers, OptimParams};
use crate::parameters::{initial_hypers, GpRegressorParams, GpRegressorValidParams, Objective};
use crate::utils::Normalization;

use linfa::prelude::{DatasetBase, Fit, Float};
use log::{info, warn};
use ndarray::{s, stack, Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2, Zip};
use seqgp_kernels::Kernel;
use std::fmt;

#[cfg(feature = "persistent")]
use crate::optimization::Algorithm;
#[cfg(feature = "persistent")]
use crate::persistence::{check_version, load_error, read_record, write_record, GP_SCHEMA_VERSION};
#[cfg(feature = "persistent")]
use serde::{de::DeserializeOwned, Deserialize, Serialize};
#[cfg(feature = "persistent")]
use std::path::Path;

/// Training data of a regression and the objectives computed on it
pub(crate) struct RegressionProblem<'a, F: Float, K: Kernel<F>> {
    pub kernel: &'a K,
    pub x: ArrayView2<'a, K::Elem>,
    /// Normalized targets minus prior mean
    pub y: ArrayView1<'a, F>,
    /// Normalized per-point variances
    pub variances: Option<ArrayView1<'a, F>>,
}

/// Quantities cached at given hyperparameters
pub(crate) struct Posterior<F: Float> {
    /// Negative log marginal likelihood
    pub ml: F,
    pub chol: StabilizedCholesky<F>,
    /// `Ky^-1 y`
    pub alpha: Array1<F>,
}

impl<'a, F: Float, K: Kernel<F>> RegressionProblem<'a, F, K> {
    /// Kernel part of `hypers`, the noise variance comes first when no variances are given
    pub fn kernel_hypers<'h>(&self, hypers: &'h Array1<F>) -> ArrayView1<'h, F> {
        if self.variances.is_none() {
            hypers.slice(s![1..])
        } else {
            hypers.view()
        }
    }

    /// `Ky = K + noise`
    fn noisy_cov(&self, hypers: &Array1<F>) -> Array2<F> {
        let mut ky = self.kernel.self_cov(&self.x, &self.kernel_hypers(hypers));
        match &self.variances {
            Some(variances) => ky
                .diag_mut()
                .zip_mut_with(variances, |k, &v| *k += v),
            None => {
                let noise = hypers[0];
                ky.diag_mut().mapv_inplace(|k| k + noise)
            }
        }
        ky
    }

    /// Factorization and negative log marginal likelihood
    ///
    /// `0.5 * y^T Ky^-1 y + sum(log(diag(L))) + n/2 * log(2 pi)`
    pub fn posterior(&self, hypers: &Array1<F>) -> Result<Posterior<F>> {
        let chol = StabilizedCholesky::factorize(&self.noisy_cov(hypers))?;
        let alpha = chol.solve(&self.y)?;
        let n = F::cast(self.y.len());
        let ml = F::cast(0.5) * self.y.dot(&alpha)
            + chol.sum_log_diag()
            + n / F::cast(2.) * F::cast(2. * std::f64::consts::PI).ln();
        Ok(Posterior { ml, chol, alpha })
    }

    /// Leave-one-out predictive means and variances
    ///
    /// `mu_i = y_i - [Ky^-1 y]_i / [Ky^-1]_ii` and `v_i = 1 / [Ky^-1]_ii`
    pub fn loo(&self, hypers: &Array1<F>) -> Result<(Array1<F>, Array1<F>)> {
        let kinv = inverse(&self.noisy_cov(hypers))?;
        let kinv_y = kinv.dot(&self.y);
        let d = kinv.diag();
        let mut mus = self.y.to_owned();
        Zip::from(&mut mus)
            .and(&kinv_y)
            .and(&d)
            .for_each(|mu, &ky, &dii| *mu -= ky / dii);
        Ok((mus, d.mapv(|dii| F::one() / dii)))
    }

    /// Negative leave-one-out log predictive probability
    pub fn loo_log_p(&self, hypers: &Array1<F>) -> Result<F> {
        let (mus, vs) = self.loo(hypers)?;
        let half = F::cast(0.5);
        let log_2pi = F::cast(2. * std::f64::consts::PI).ln();
        Ok(Zip::from(&self.y)
            .and(&mus)
            .and(&vs)
            .fold(F::zero(), |acc, &y, &mu, &v| {
                acc + half * v.ln() + (y - mu) * (y - mu) / (F::cast(2.) * v) + half * log_2pi
            }))
    }

    /// Value of the negative `objective`
    pub fn objective(&self, objective: Objective, hypers: &Array1<F>) -> Result<F> {
        match objective {
            Objective::MarginalLikelihood => Ok(self.posterior(hypers)?.ml),
            Objective::LeaveOneOut => self.loo_log_p(hypers),
        }
    }
}

/// Gaussian process regression over encoded sequences
///
/// Targets are normalized to zero mean and unit variance, a prior mean model
/// is fitted on them and the residuals `y` are modeled by a GP
///
/// `y ~ N(0, K + noise)`
///
/// where `K` is given by a [Kernel] and `noise` is either the identity scaled
/// by a noise variance hyperparameter, or the diagonal of per-point variances
/// given at fitting time.
///
/// Hyperparameters are tuned by maximizing the log marginal likelihood
/// or the leave-one-out log predictive probability (see [Objective]).
///
/// # Example
///
/// ```no_run
/// use seqgp_gp::{mean_models::ZeroMean, GpRegressor};
/// use seqgp_kernels::IdentityKernel;
/// use linfa::prelude::*;
/// use ndarray::{arr1, Array2};
///
/// let seqs: Vec<char> = "MKVLMKLLMRVLMRLL".chars().collect();
/// let xt = Array2::from_shape_vec((4, 4), seqs).unwrap();
/// let yt = arr1(&[1.2, 0.8, -0.3, -1.1]);
///
/// let gp = GpRegressor::params(ZeroMean(), IdentityKernel::new())
///     .fit(&Dataset::new(xt.to_owned(), yt))
///     .expect("GP fitted");
/// let (mean, cov) = gp.predict(&xt).expect("GP prediction");
/// ```
#[derive(Clone, Debug)]
pub struct GpRegressor<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> {
    /// Optimized hyperparameters
    hypers: Array1<F>,
    /// Negative log marginal likelihood at `hypers`
    ml: F,
    /// Negative leave-one-out log predictive probability at `hypers`
    loo_log_p: F,
    /// `Ky^-1 y`
    alpha: Array1<F>,
    /// Factorization of `Ky`
    chol: StabilizedCholesky<F>,
    normalization: Normalization<F>,
    /// Training inputs
    xt: Array2<K::Elem>,
    /// Raw training targets
    yt: Array1<F>,
    /// Normalized training targets minus prior mean
    yt_norm: Array1<F>,
    /// Normalized per-point variances
    variances: Option<Array1<F>>,
    kernel: K,
    mean: Mean,
    params: GpRegressorValidParams<F, Mean, K>,
}

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> fmt::Display for GpRegressor<F, Mean, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GP(mean={}, kernel={}, objective={}, hypers={}, neg_log_ml={}, neg_loo_log_p={})",
            self.mean,
            self.kernel,
            self.params.objective,
            self.hypers,
            self.ml,
            self.loo_log_p
        )
    }
}

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> GpRegressor<F, Mean, K> {
    /// Gp parameters constructor
    pub fn params(mean: Mean, kernel: K) -> GpRegressorParams<F, Mean, K> {
        GpRegressorParams::new(mean, kernel)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        params: GpRegressorValidParams<F, Mean, K>,
        kernel: K,
        mean: Mean,
        normalization: Normalization<F>,
        xt: Array2<K::Elem>,
        yt: Array1<F>,
        yt_norm: Array1<F>,
        variances: Option<Array1<F>>,
        hypers: Array1<F>,
    ) -> Result<Self> {
        let (posterior, loo_log_p) = {
            let problem = RegressionProblem {
                kernel: &kernel,
                x: xt.view(),
                y: yt_norm.view(),
                variances: variances.as_ref().map(|v| v.view()),
            };
            let posterior = problem.posterior(&hypers)?;
            let loo_log_p = match problem.loo_log_p(&hypers) {
                Ok(v) => v,
                Err(err) if params.objective == Objective::MarginalLikelihood => {
                    warn!("LOO log predictive probability not available: {err}");
                    F::nan()
                }
                Err(err) => return Err(err),
            };
            (posterior, loo_log_p)
        };
        info!(
            "GP fitted with hypers = {hypers}, neg_log_ml = {}, neg_loo_log_p = {loo_log_p}",
            posterior.ml
        );
        Ok(GpRegressor {
            hypers,
            ml: posterior.ml,
            loo_log_p,
            alpha: posterior.alpha,
            chol: posterior.chol,
            normalization,
            xt,
            yt,
            yt_norm,
            variances,
            kernel,
            mean,
            params,
        })
    }

    fn problem(&self) -> RegressionProblem<'_, F, K> {
        RegressionProblem {
            kernel: &self.kernel,
            x: self.xt.view(),
            y: self.yt_norm.view(),
            variances: self.variances.as_ref().map(|v| v.view()),
        }
    }

    fn kernel_hypers(&self) -> ArrayView1<'_, F> {
        if self.variances.is_none() {
            self.hypers.slice(s![1..])
        } else {
            self.hypers.view()
        }
    }

    fn check_inputs(&self, x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>) -> Result<()> {
        if x.ncols() != self.xt.ncols() {
            return Err(GpError::LengthMismatch(format!(
                "inputs of length {} given while model is trained on length {}",
                x.ncols(),
                self.xt.ncols()
            )));
        }
        Ok(())
    }

    /// Predict posterior means (m,) and covariance (m, m) at the `m` rows of `x`,
    /// both scaled as the training targets.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>) -> Result<(Array1<F>, Array2<F>)> {
        self.check_inputs(x)?;
        let h = self.kernel_hypers();
        let k_star = self.kernel.cov(x, &self.xt, &h);
        let k_star_star = self.kernel.self_cov(x, &h);
        let mean = k_star.dot(&self.alpha) + self.mean.value(x);
        let v = self.chol.triangular_solve_mat(&k_star.t())?;
        let std2 = self.normalization.std * self.normalization.std;
        let cov = (k_star_star - v.t().dot(&v)) * std2;
        Ok((self.normalization.denormalize(&mean), cov))
    }

    /// Predict posterior variances (m,) at the `m` rows of `x`
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>) -> Result<Array1<F>> {
        let (_, cov) = self.predict(x)?;
        Ok(cov.diag().mapv(|v| v.max(F::zero())))
    }

    /// Leave-one-out predictions at training points as a (n, 2) matrix of (mu, v).
    ///
    /// When `add_mean` is true the prior mean is added back, which implies
    /// unnormalized values. Otherwise values are unnormalized only if `unnormalize`.
    pub fn loo_residuals(&self, add_mean: bool, unnormalize: bool) -> Result<Array2<F>> {
        let (mut mus, mut vs) = self.problem().loo(&self.hypers)?;
        if add_mean {
            mus = mus + self.mean.value(&self.xt);
        }
        if add_mean || unnormalize {
            mus = self.normalization.denormalize(&mus);
            let std2 = self.normalization.std * self.normalization.std;
            vs.mapv_inplace(|v| v * std2);
        }
        Ok(stack![Axis(1), mus, vs])
    }

    /// Score mean predictions at `x` against `y` with the given metrics
    /// among `"kendalltau"`, `"R2"` and `"R"`. No metric means Kendall tau.
    pub fn score(
        &self,
        x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        metrics: &[&str],
    ) -> Result<Score<F>> {
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} targets",
                x.nrows(),
                y.len()
            )));
        }
        let metrics = parse_metrics(metrics)?;
        let (pred, _) = self.predict(x)?;
        Ok(score_with(&metrics, y, &pred))
    }

    /// Optimized hyperparameters, noise variance first when no variances were given
    pub fn hypers(&self) -> &Array1<F> {
        &self.hypers
    }

    /// Negative log marginal likelihood
    pub fn ml(&self) -> F {
        self.ml
    }

    /// Negative leave-one-out log predictive probability (NaN if not computable)
    pub fn loo_log_p(&self) -> F {
        self.loo_log_p
    }

    /// Objective used during fitting
    pub fn objective(&self) -> Objective {
        self.params.objective
    }

    /// Mean and standard deviation of the training targets
    pub fn normalization(&self) -> &Normalization<F> {
        &self.normalization
    }

    /// Fitted kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Fitted mean model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Training inputs and raw targets
    pub fn training_data(&self) -> (&Array2<K::Elem>, &Array1<F>) {
        (&self.xt, &self.yt)
    }

    /// (number of training items, encoded length)
    pub fn dims(&self) -> (usize, usize) {
        self.xt.dim()
    }

    /// Parameters used to fit the model
    pub fn params_used(&self) -> &GpRegressorValidParams<F, Mean, K> {
        &self.params
    }
}

impl<F, Mean, K, D, DT> Fit<ArrayBase<D, Ix2>, ArrayBase<DT, Ix1>, GpError>
    for GpRegressorValidParams<F, Mean, K>
where
    F: Float,
    K: Kernel<F>,
    Mean: PriorMean<F, K::Elem>,
    D: Data<Elem = K::Elem>,
    DT: Data<Elem = F>,
{
    type Object = GpRegressor<F, Mean, K>;

    /// Fit GP regression hyperparameters using the noise variance hyperparameter.
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<DT, Ix1>>) -> Result<Self::Object> {
        self.fit_with_variances(dataset, None)
    }
}

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> GpRegressorValidParams<F, Mean, K> {
    /// Fit GP regression hyperparameters given optional per-point `variances`
    /// of the targets, in which case no noise hyperparameter is used.
    pub fn fit_with_variances(
        &self,
        dataset: &DatasetBase<ArrayBase<impl Data<Elem = K::Elem>, Ix2>, ArrayBase<impl Data<Elem = F>, Ix1>>,
        variances: Option<&Array1<F>>,
    ) -> Result<GpRegressor<F, Mean, K>> {
        let (x, y) = (dataset.records(), dataset.targets());
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if let Some(v) = variances {
            if v.len() != y.len() {
                return Err(GpError::LengthMismatch(format!(
                    "{} variances given for {} targets",
                    v.len(),
                    y.len()
                )));
            }
        }

        let normalization = Normalization::new(y);
        let mut mean = self.mean.clone();
        let y_norm = normalization.normalize(y);
        mean.fit(x, &y_norm)?;
        let yt_norm = y_norm - mean.value(x);
        let std2 = normalization.std * normalization.std;
        let variances = variances.map(|v| v.mapv(|s| s / std2));

        let mut kernel = self.kernel.clone();
        let n_hypers = kernel.fit(x) + usize::from(variances.is_none());
        let guesses = initial_hypers(self.guesses.as_ref(), n_hypers)?;
        let xt = x.to_owned();

        let hypers = if self.optimize {
            let problem = RegressionProblem {
                kernel: &kernel,
                x: xt.view(),
                y: yt_norm.view(),
                variances: variances.as_ref().map(|v| v.view()),
            };
            let objective = self.objective;
            optimize_hypers(
                |h: &Array1<F>| problem.objective(objective, h),
                &guesses,
                self.n_start,
                &OptimParams {
                    algorithm: self.algorithm,
                    max_eval: self.max_eval,
                    ..OptimParams::default()
                },
            )
        } else {
            guesses
        };

        GpRegressor::assemble(
            self.clone(),
            kernel,
            mean,
            normalization,
            xt,
            y.to_owned(),
            yt_norm,
            variances,
            hypers,
        )
    }
}

impl<F: Float, Mean: PriorMean<F, K::Elem>, K: Kernel<F>> GpRegressorParams<F, Mean, K> {
    /// Check parameters then fit with optional per-point `variances`
    /// (see [GpRegressorValidParams::fit_with_variances])
    pub fn fit_with_variances(
        &self,
        dataset: &DatasetBase<ArrayBase<impl Data<Elem = K::Elem>, Ix2>, ArrayBase<impl Data<Elem = F>, Ix1>>,
        variances: Option<&Array1<F>>,
    ) -> Result<GpRegressor<F, Mean, K>> {
        use linfa::ParamGuard;
        self.check_ref()?.fit_with_variances(dataset, variances)
    }
}

/// Persisted content of a [GpRegressor]
#[cfg(feature = "persistent")]
#[derive(Serialize, Deserialize)]
#[serde(bound(
    serialize = "F: Serialize, Mean: Serialize, K: Serialize, A: Serialize",
    deserialize = "F: Deserialize<'de>, Mean: Deserialize<'de>, K: Deserialize<'de>, A: Deserialize<'de>"
))]
pub(crate) struct GpRegressorRecord<F, Mean, K, A> {
    version: u32,
    kernel: K,
    mean: Mean,
    objective: String,
    hypers: Vec<F>,
    guesses: Option<Vec<F>>,
    normalization: Normalization<F>,
    xt: Array2<A>,
    yt: Vec<F>,
    variances: Option<Vec<F>>,
    n_start: usize,
    max_eval: usize,
    algorithm: Algorithm,
    optimize: bool,
}

#[cfg(feature = "persistent")]
impl<F, Mean, K> GpRegressor<F, Mean, K>
where
    F: Float + Serialize + DeserializeOwned,
    Mean: PriorMean<F, K::Elem> + Serialize + DeserializeOwned,
    K: Kernel<F> + Serialize + DeserializeOwned,
    K::Elem: Serialize + DeserializeOwned,
{
    pub(crate) fn to_record(&self) -> GpRegressorRecord<F, Mean, K, K::Elem> {
        GpRegressorRecord {
            version: GP_SCHEMA_VERSION,
            kernel: self.kernel.clone(),
            mean: self.mean.clone(),
            objective: self.params.objective.tag().to_string(),
            hypers: self.hypers.to_vec(),
            guesses: self.params.guesses.as_ref().map(|g| g.to_vec()),
            normalization: self.normalization,
            xt: self.xt.clone(),
            yt: self.yt.to_vec(),
            variances: self.variances.as_ref().map(|v| v.to_vec()),
            n_start: self.params.n_start,
            max_eval: self.params.max_eval,
            algorithm: self.params.algorithm,
            optimize: self.params.optimize,
        }
    }

    /// Rebuild the model, the factorization being recomputed from the hyperparameters
    pub(crate) fn from_record(record: GpRegressorRecord<F, Mean, K, K::Elem>) -> Result<Self> {
        check_version(record.version)?;
        let objective: Objective = record.objective.parse().map_err(load_error)?;

        let xt = record.xt;
        let yt = Array1::from(record.yt);
        let variances = record.variances.map(Array1::from);
        if xt.nrows() != yt.len() || variances.as_ref().is_some_and(|v| v.len() != yt.len()) {
            return Err(GpError::LoadError(
                "inconsistent training data lengths".to_string(),
            ));
        }
        let mut kernel = record.kernel;
        let n_hypers = kernel.fit(&xt) + usize::from(variances.is_none());
        if record.hypers.len() != n_hypers {
            return Err(GpError::LoadError(format!(
                "{} hyperparameters found while {} are required",
                record.hypers.len(),
                n_hypers
            )));
        }
        let mean = record.mean;
        let normalization = record.normalization;
        let yt_norm = normalization.normalize(&yt) - mean.value(&xt);

        let params = GpRegressorValidParams {
            mean: mean.clone(),
            kernel: kernel.clone(),
            objective,
            guesses: record.guesses.map(Array1::from),
            n_start: record.n_start,
            max_eval: record.max_eval,
            algorithm: record.algorithm,
            optimize: record.optimize,
        };
        Self::assemble(
            params,
            kernel,
            mean,
            normalization,
            xt,
            yt,
            yt_norm,
            variances,
            Array1::from(record.hypers),
        )
    }

    /// Save the model as JSON in the given file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_record(path, &self.to_record())
    }

    /// Load a model saved with [GpRegressor::save]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_record(read_record(path)?)
    }
}
