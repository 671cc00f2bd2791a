use crate::classifier_parameters::{GpClassifierParams, GpClassifierValidParams};
#[cfg(feature = "persistent")]
use crate::classifier_parameters::check_max_iterations;
use crate::errors::{GpError, Result};
use crate::linalg::StabilizedCholesky;
use crate::metrics::roc_auc;
use crate::optimization::{optimize_hypers, OptimParams};
use crate::parameters::initial_hypers;
use crate::utils::{integrate, log_sigmoid, sigmoid};

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use log::{debug, error, info};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2, Zip};
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

/// Relative squared update under which a Newton step counts as converged
const LAPLACE_TOL: f64 = 1e-4;
/// Number of consecutive converged steps required
const LAPLACE_CONSECUTIVE: usize = 10;
/// Newton iterations budget
pub(crate) const LAPLACE_MAX_ITER: usize = 1000;
/// Half width of the integration window in units of the latent variance
const PREDICT_WINDOW: f64 = 20.;

/// Laplace approximation at the mode of the latent posterior
#[derive(Clone, Debug)]
pub(crate) struct LaplaceMode<F: Float> {
    /// Mode of `p(f | X, y)`
    pub f: Array1<F>,
    /// `K^-1 f`
    pub a: Array1<F>,
    /// Square root of the likelihood curvature `W`
    pub w_sqrt: Array1<F>,
    /// Factorization of `B = I + W^1/2 K W^1/2`
    pub chol: StabilizedCholesky<F>,
    /// Gradient of the log likelihood at the mode
    pub grad: Array1<F>,
    /// Negative approximate log marginal likelihood
    pub logq: F,
}

/// Square root of curvature and gradient of the logistic log likelihood
fn logistic_derivatives<F: Float>(
    y: &ArrayView1<F>,
    f: &Array1<F>,
) -> (Array1<F>, Array1<F>) {
    let half = F::cast(0.5);
    let pi = f.mapv(sigmoid);
    let w_sqrt = pi.mapv(|p| (p * (F::one() - p)).sqrt());
    let mut grad = y.mapv(|t| (t + F::one()) * half);
    grad -= &pi;
    (w_sqrt, grad)
}

/// `I + W^1/2 K W^1/2`
fn curvature_system<F: Float>(k: &Array2<F>, w_sqrt: &Array1<F>) -> Array2<F> {
    let mut b = k.to_owned();
    Zip::indexed(&mut b).for_each(|(i, j), v| *v = *v * w_sqrt[i] * w_sqrt[j]);
    b.diag_mut().mapv_inplace(|v| v + F::one());
    b
}

/// Training data of a binary classification
pub(crate) struct ClassificationProblem<'a, F: Float, K: Kernel<F>> {
    pub kernel: &'a K,
    pub x: ArrayView2<'a, K::Elem>,
    /// Labels in {-1, +1}
    pub y: ArrayView1<'a, F>,
    /// Newton iterations budget
    pub max_iterations: usize,
}

impl<'a, F: Float, K: Kernel<F>> ClassificationProblem<'a, F, K> {
    /// Newton iterations towards the latent mode from `guess` (zeros by default)
    pub fn find_f(&self, hypers: &Array1<F>, guess: Option<&Array1<F>>) -> Result<LaplaceMode<F>> {
        let n = self.y.len();
        let mut f = match guess {
            Some(g) if g.len() != n => {
                return Err(GpError::LengthMismatch(format!(
                    "latent guess of length {} given for {} items",
                    g.len(),
                    n
                )))
            }
            Some(g) => g.to_owned(),
            None => Array1::zeros(n),
        };
        let k = self.kernel.self_cov(&self.x, hypers);
        let tol = F::cast(LAPLACE_TOL);
        let eps = F::epsilon();

        let mut consecutive = 0;
        let mut change = F::infinity();
        for iter in 0..self.max_iterations {
            let (w_sqrt, grad) = logistic_derivatives(&self.y, &f);
            let chol = StabilizedCholesky::factorize(&curvature_system(&k, &w_sqrt))?;
            let b = &w_sqrt * &w_sqrt * &f + &grad;
            let rhs = &w_sqrt * &k.dot(&b);
            let a = b - &w_sqrt * &chol.solve(&rhs)?;
            let f_new = k.dot(&a);

            let diff = &f_new - &f;
            change = diff.dot(&diff) / f_new.dot(&f_new).max(eps);
            f = f_new;
            consecutive = if change < tol { consecutive + 1 } else { 0 };
            if consecutive >= LAPLACE_CONSECUTIVE {
                debug!("Laplace mode found after {} iterations", iter + 1);
                return self.mode(&k, f, a);
            }
        }
        Err(GpError::NonConvergence {
            max_iterations: self.max_iterations,
            last_change: change.to_f64().unwrap_or(f64::NAN),
        })
    }

    /// State at the mode `f = K a`
    fn mode(&self, k: &Array2<F>, f: Array1<F>, a: Array1<F>) -> Result<LaplaceMode<F>> {
        let (w_sqrt, grad) = logistic_derivatives(&self.y, &f);
        let chol = StabilizedCholesky::factorize(&curvature_system(k, &w_sqrt))?;
        let logq = self.logq(&f, &a, &chol);
        Ok(LaplaceMode {
            f,
            a,
            w_sqrt,
            chol,
            grad,
            logq,
        })
    }

    /// `0.5 * a^T f - sum(log(sigmoid(y f))) + sum(log(diag(L)))`
    pub fn logq(&self, f: &Array1<F>, a: &Array1<F>, chol: &StabilizedCholesky<F>) -> F {
        let loglik = Zip::from(&self.y)
            .and(f)
            .fold(F::zero(), |acc, &y, &f| acc + log_sigmoid(y * f));
        F::cast(0.5) * a.dot(f) - loglik + chol.sum_log_diag()
    }
}

/// Gaussian process binary classifier with logistic likelihood,
/// the latent posterior being approximated at its mode (Laplace).
///
/// Labels are -1 or +1. Kernel hyperparameters are tuned by minimizing
/// the negative approximate log marginal likelihood.
#[derive(Clone, Debug)]
pub struct GpClassifier<F: Float, K: Kernel<F>> {
    hypers: Array1<F>,
    mode: LaplaceMode<F>,
    xt: Array2<K::Elem>,
    yt: Array1<F>,
    kernel: K,
    params: GpClassifierValidParams<F, K>,
}

impl<F: Float, K: Kernel<F>> fmt::Display for GpClassifier<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GPClassifier(kernel={}, hypers={}, neg_logq={})",
            self.kernel, self.hypers, self.mode.logq
        )
    }
}

/// Check labels are -1 or +1
pub(crate) fn check_labels<F: Float>(y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<()> {
    match y.iter().find(|&&v| v != F::one() && v != -F::one()) {
        Some(v) => Err(GpError::InvalidLabel(format!(
            "label {v} found, expected -1 or 1"
        ))),
        None => Ok(()),
    }
}

impl<F: Float, K: Kernel<F>> GpClassifier<F, K> {
    /// Gp classifier parameters constructor
    pub fn params(kernel: K) -> GpClassifierParams<F, K> {
        GpClassifierParams::new(kernel)
    }

    fn problem(&self) -> ClassificationProblem<'_, F, K> {
        ClassificationProblem {
            kernel: &self.kernel,
            x: self.xt.view(),
            y: self.yt.view(),
            max_iterations: self.params.max_iterations,
        }
    }

    /// Latent mode at given `hypers` starting from `guess`
    pub fn find_f(&self, hypers: &Array1<F>, guess: Option<&Array1<F>>) -> Result<Array1<F>> {
        Ok(self.problem().find_f(hypers, guess)?.f)
    }

    /// Negative approximate log marginal likelihood at given `hypers`
    pub fn neg_logq(&self, hypers: &Array1<F>) -> Result<F> {
        Ok(self.problem().find_f(hypers, None)?.logq)
    }

    /// Predict positive class probabilities (m,), latent means (m,) and
    /// latent covariance (m, m) at the `m` rows of `x`.
    pub fn predict(
        &self,
        x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>, Array2<F>)> {
        if x.ncols() != self.xt.ncols() {
            return Err(GpError::LengthMismatch(format!(
                "inputs of length {} given while model is trained on length {}",
                x.ncols(),
                self.xt.ncols()
            )));
        }
        let k_star = self.kernel.cov(x, &self.xt, &self.hypers);
        let f_bar = k_star.dot(&self.mode.grad);

        let mut wk = k_star.t().to_owned();
        Zip::from(wk.rows_mut())
            .and(&self.mode.w_sqrt)
            .for_each(|mut row, &w| row.mapv_inplace(|v| v * w));
        let v = self.mode.chol.triangular_solve_mat(&wk)?;
        let var = self.kernel.self_cov(x, &self.hypers) - v.t().dot(&v);

        let pi_star = Zip::from(&f_bar)
            .and(var.diag())
            .map_collect(|&mu, &s2| predictive_probability(mu, s2));
        Ok((pi_star, f_bar, var))
    }

    /// Area under the ROC curve of predicted probabilities against labels `y`
    pub fn score(
        &self,
        x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<F> {
        check_labels(y)?;
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} labels",
                x.nrows(),
                y.len()
            )));
        }
        let (pi_star, _, _) = self.predict(x)?;
        Ok(roc_auc(y, &pi_star))
    }

    /// Optimized kernel hyperparameters
    pub fn hypers(&self) -> &Array1<F> {
        &self.hypers
    }

    /// Negative approximate log marginal likelihood at the optimum
    pub fn ml(&self) -> F {
        self.mode.logq
    }

    /// Latent mode at training points
    pub fn f_hat(&self) -> &Array1<F> {
        &self.mode.f
    }

    /// Fitted kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Training inputs and labels
    pub fn training_data(&self) -> (&Array2<K::Elem>, &Array1<F>) {
        (&self.xt, &self.yt)
    }

    /// Parameters used to fit the model
    pub fn params_used(&self) -> &GpClassifierValidParams<F, K> {
        &self.params
    }
}

/// `int sigmoid(z) N(z; mu, s2) dz` over `[mu - 20 s2, mu + 20 s2]`
fn predictive_probability<F: Float>(mu: F, s2: F) -> F {
    if s2 <= F::zero() {
        return sigmoid(mu);
    }
    let two = F::cast(2.);
    let norm = (two * F::cast(std::f64::consts::PI) * s2).sqrt();
    let density = |z: F| sigmoid(z) * (-(z - mu) * (z - mu) / (two * s2)).exp() / norm;
    let (width, core) = (F::cast(PREDICT_WINDOW) * s2, F::cast(8.) * s2.sqrt());
    let tol = F::cast(1e-10);
    if core < width {
        // split so that the quadrature cannot step over the density peak
        integrate(&density, mu - width, mu - core, tol)
            + integrate(&density, mu - core, mu + core, tol)
            + integrate(&density, mu + core, mu + width, tol)
    } else {
        integrate(density, mu - width, mu + width, tol)
    }
}

impl<F, K, D, DT> Fit<ArrayBase<D, Ix2>, ArrayBase<DT, Ix1>, GpError> for GpClassifierValidParams<F, K>
where
    F: Float,
    K: Kernel<F>,
    D: Data<Elem = K::Elem>,
    DT: Data<Elem = F>,
{
    type Object = GpClassifier<F, K>;

    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<DT, Ix1>>) -> Result<Self::Object> {
        let (x, y) = (dataset.records(), dataset.targets());
        check_labels(y)?;
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} labels",
                x.nrows(),
                y.len()
            )));
        }
        let mut kernel = self.kernel.clone();
        let n_hypers = kernel.fit(x);
        let guesses = initial_hypers(self.guesses.as_ref(), n_hypers)?;
        let (xt, yt) = (x.to_owned(), y.to_owned());

        let problem = ClassificationProblem {
            kernel: &kernel,
            x: xt.view(),
            y: yt.view(),
            max_iterations: self.max_iterations,
        };
        let hypers = if self.optimize {
            optimize_hypers(
                |h: &Array1<F>| Ok(problem.find_f(h, None)?.logq),
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
        let mode = problem.find_f(&hypers, None)?;
        info!("GP classifier fitted with hypers = {hypers}, neg_logq = {}", mode.logq);

        Ok(GpClassifier {
            hypers,
            mode,
            xt,
            yt,
            kernel,
            params: self.clone(),
        })
    }
}

impl<F, K, D> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for GpClassifier<F, K>
where
    F: Float,
    K: Kernel<F>,
    D: Data<Elem = K::Elem>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        match self.predict(x) {
            Ok((pi_star, _, _)) => y.assign(&pi_star),
            Err(err) => {
                error!("GP classifier prediction failed: {err}");
                y.fill(F::nan());
            }
        }
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.len_of(Axis(0)))
    }
}

/// Persisted content of a [GpClassifier]
#[cfg(feature = "persistent")]
#[derive(Serialize, Deserialize)]
#[serde(bound(
    serialize = "F: Serialize, K: Serialize, A: Serialize",
    deserialize = "F: Deserialize<'de>, K: Deserialize<'de>, A: Deserialize<'de>"
))]
struct GpClassifierRecord<F, K, A> {
    version: u32,
    kernel: K,
    hypers: Vec<F>,
    guesses: Option<Vec<F>>,
    xt: Array2<A>,
    yt: Vec<F>,
    n_start: usize,
    max_eval: usize,
    algorithm: Algorithm,
    optimize: bool,
    max_iterations: usize,
}

#[cfg(feature = "persistent")]
impl<F, K> GpClassifier<F, K>
where
    F: Float + Serialize + DeserializeOwned,
    K: Kernel<F> + Serialize + DeserializeOwned,
    K::Elem: Serialize + DeserializeOwned,
{
    /// Save the model as JSON in the given file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let record = GpClassifierRecord {
            version: GP_SCHEMA_VERSION,
            kernel: self.kernel.clone(),
            hypers: self.hypers.to_vec(),
            guesses: self.params.guesses.as_ref().map(|g| g.to_vec()),
            xt: self.xt.clone(),
            yt: self.yt.to_vec(),
            n_start: self.params.n_start,
            max_eval: self.params.max_eval,
            algorithm: self.params.algorithm,
            optimize: self.params.optimize,
            max_iterations: self.params.max_iterations,
        };
        write_record(path, &record)
    }

    /// Load a model saved with [GpClassifier::save]
    ///
    /// The Laplace mode is recomputed from the persisted hyperparameters.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let record: GpClassifierRecord<F, K, K::Elem> = read_record(path)?;
        check_version(record.version)?;
        check_max_iterations(record.max_iterations).map_err(load_error)?;
        let xt = record.xt;
        let yt = Array1::from(record.yt);
        if xt.nrows() != yt.len() {
            return Err(GpError::LoadError(
                "inconsistent training data lengths".to_string(),
            ));
        }
        check_labels(&yt).map_err(load_error)?;
        let mut kernel = record.kernel;
        let n_hypers = kernel.fit(&xt);
        if record.hypers.len() != n_hypers {
            return Err(GpError::LoadError(format!(
                "{} hyperparameters found while {} are required",
                record.hypers.len(),
                n_hypers
            )));
        }
        let hypers = Array1::from(record.hypers);
        let mode = ClassificationProblem {
            kernel: &kernel,
            x: xt.view(),
            y: yt.view(),
            max_iterations: record.max_iterations,
        }
        .find_f(&hypers, None)?;

        let params = GpClassifierValidParams {
            kernel: kernel.clone(),
            guesses: record.guesses.map(Array1::from),
            n_start: record.n_start,
            max_eval: record.max_eval,
            algorithm: record.algorithm,
            optimize: record.optimize,
            max_iterations: record.max_iterations,
        };
        Ok(GpClassifier {
            hypers,
            mode,
            xt,
            yt,
            kernel,
            params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::{Dataset, Predict};
    use ndarray::{array, Array2};
    use seqgp_kernels::{IdentityKernel, LinearKernel};

    fn toy() -> (Array2<char>, Array1<f64>) {
        let seqs = ["AAAA", "AAAB", "AABA", "BBBB", "BBBA", "BBAB"];
        let flat: Vec<char> = seqs.iter().flat_map(|s| s.chars()).collect();
        (
            Array2::from_shape_vec((6, 4), flat).unwrap(),
            array![1., 1., 1., -1., -1., -1.],
        )
    }

    #[test]
    fn test_find_f_converges_to_local_minimum() {
        let (xt, yt) = toy();
        let kernel = IdentityKernel::new();
        let problem = ClassificationProblem {
            kernel: &kernel,
            x: xt.view(),
            y: yt.view(),
            max_iterations: LAPLACE_MAX_ITER,
        };
        let hypers = array![1.];
        let mode = problem.find_f(&hypers, None).unwrap();
        // latent values follow the labels
        Zip::from(&mode.f).and(&yt).for_each(|&f, &y| assert!(f * y > 0.));

        // perturbing the mode does not decrease the Laplace objective
        let k = kernel.self_cov(&xt, &hypers);
        assert_abs_diff_eq!(mode.f, k.dot(&mode.a), epsilon = 1e-9);
        let objective = |a: &Array1<f64>| {
            let f = k.dot(a);
            let loglik: f64 = Zip::from(&yt).and(&f).fold(0., |acc, &y, &f| acc + log_sigmoid(y * f));
            0.5 * a.dot(&f) - loglik
        };
        let fmin = objective(&mode.a);
        for i in 0..6 {
            for delta in [-1e-2, 1e-2] {
                let mut a = mode.a.clone();
                a[i] += delta;
                assert!(objective(&a) >= fmin - 1e-9);
            }
        }
        assert!(mode.logq.is_finite());
    }

    #[test]
    fn test_find_f_guess_length() {
        let (xt, yt) = toy();
        let kernel = IdentityKernel::new();
        let problem = ClassificationProblem {
            kernel: &kernel,
            x: xt.view(),
            y: yt.view(),
            max_iterations: LAPLACE_MAX_ITER,
        };
        assert!(matches!(
            problem.find_f(&array![1.], Some(&array![0., 0.])),
            Err(GpError::LengthMismatch(_))
        ));
        let warm = problem.find_f(&array![1.], None).unwrap();
        let again = problem.find_f(&array![1.], Some(&warm.f)).unwrap();
        assert_abs_diff_eq!(again.f, warm.f, epsilon = 1e-3);
    }

    #[test]
    fn test_fit_predict() {
        let (xt, yt) = toy();
        let gpc = GpClassifier::params(IdentityKernel::new())
            .fit(&Dataset::new(xt.clone(), yt.clone()))
            .expect("GP classifier fitted");
        assert_eq!(gpc.hypers().len(), 1);
        assert!(gpc.ml().is_finite());

        let (pi_star, f_bar, var) = gpc.predict(&xt).unwrap();
        assert_eq!(var.dim(), (6, 6));
        for i in 0..6 {
            assert!(pi_star[i] > 0. && pi_star[i] < 1.);
            assert_eq!(f_bar[i] > 0., yt[i] > 0.);
        }
        assert_abs_diff_eq!(gpc.score(&xt, &yt).unwrap(), 1.);

        let probas = gpc.predict(&xt);
        let predicted: Array1<f64> = Predict::predict(&gpc, &xt);
        assert_abs_diff_eq!(predicted, probas.unwrap().0, epsilon = 1e-12);
    }

    #[test]
    fn test_numeric_features() {
        let xt = array![[-2.], [-1.], [-0.5], [0.5], [1.], [2.]];
        let yt = array![-1., -1., -1., 1., 1., 1.];
        let gpc = GpClassifier::params(LinearKernel())
            .fixed_hypers(array![2.])
            .fit(&Dataset::new(xt, yt))
            .unwrap();
        let (pi_star, _, _) = gpc.predict(&array![[-3.], [0.], [3.]]).unwrap();
        assert!(pi_star[0] < 0.5);
        assert_abs_diff_eq!(pi_star[1], 0.5, epsilon = 1e-9);
        assert!(pi_star[2] > 0.5);
    }

    #[test]
    fn test_invalid_labels() {
        let (xt, _) = toy();
        let res = GpClassifier::params(IdentityKernel::new())
            .fit(&Dataset::new(xt, array![1., 0., 1., -1., -1., -1.]));
        assert!(matches!(res, Err(GpError::InvalidLabel(_))));
    }

    #[test]
    fn test_guess_length() {
        let (xt, yt) = toy();
        let res = GpClassifier::params(IdentityKernel::new())
            .guesses(array![1., 1.])
            .fit(&Dataset::new(xt, yt));
        assert!(matches!(res, Err(GpError::ConfigError(_))));
    }

    #[test]
    fn test_predictive_probability() {
        assert_abs_diff_eq!(predictive_probability(1.5, 0.), sigmoid(1.5));
        assert_abs_diff_eq!(predictive_probability(0., 2.), 0.5, epsilon = 1e-9);
        // probit approximation of the logistic gaussian integral
        let (mu, s2) = (1., 0.5f64);
        let approx = sigmoid(mu / (1. + std::f64::consts::PI * s2 / 8.).sqrt());
        assert_abs_diff_eq!(predictive_probability(mu, s2), approx, epsilon = 1e-2);
    }

    #[test]
    fn test_mode_finding_budget() {
        let (xt, yt) = toy();
        let res = GpClassifier::params(IdentityKernel::new())
            .fixed_hypers(array![1.])
            .max_iterations(1)
            .fit(&Dataset::new(xt.clone(), yt.clone()));
        match res {
            Err(GpError::NonConvergence {
                max_iterations,
                last_change,
            }) => {
                assert_eq!(max_iterations, 1);
                // first step from the zero latent vector
                assert_abs_diff_eq!(last_change, 1., epsilon = 1e-12);
            }
            _ => panic!("mode finding should not converge in one iteration"),
        }
        let res = GpClassifier::params(IdentityKernel::new())
            .max_iterations(0)
            .fit(&Dataset::new(xt, yt));
        assert!(matches!(res, Err(GpError::ConfigError(_))));
    }

    #[cfg(feature = "persistent")]
    #[test]
    fn test_save_load() {
        use std::fs;

        let (xt, yt) = toy();
        let gpc = GpClassifier::params(IdentityKernel::<char>::new())
            .fixed_hypers(array![0.7])
            .fit(&Dataset::new(xt.clone(), yt))
            .unwrap();
        let test_dir = "target/tests";
        fs::create_dir_all(test_dir).ok();
        let path = format!("{test_dir}/classifier_save_load.json");
        gpc.save(&path).unwrap();
        let loaded = GpClassifier::<f64, IdentityKernel<char>>::load(&path).unwrap();
        assert_eq!(loaded.hypers(), gpc.hypers());
        assert_abs_diff_eq!(loaded.f_hat(), gpc.f_hat(), epsilon = 1e-12);
        assert_abs_diff_eq!(loaded.ml(), gpc.ml(), epsilon = 1e-12);
        let (p1, f1, v1) = gpc.predict(&xt).unwrap();
        let (p2, f2, v2) = loaded.predict(&xt).unwrap();
        assert_abs_diff_eq!(p1, p2, epsilon = 1e-12);
        assert_abs_diff_eq!(f1, f2, epsilon = 1e-12);
        assert_abs_diff_eq!(v1, v2, epsilon = 1e-12);

        let content = fs::read_to_string(&path).unwrap();
        let bad_labels = format!("{test_dir}/classifier_bad_labels.json");
        fs::write(&bad_labels, content.replace("\"yt\":[1.0", "\"yt\":[2.0")).unwrap();
        assert!(matches!(
            GpClassifier::<f64, IdentityKernel<char>>::load(&bad_labels),
            Err(GpError::LoadError(_))
        ));
    }
}
