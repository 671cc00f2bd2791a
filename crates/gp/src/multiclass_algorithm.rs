use crate::errors::{GpError, Result};
use crate::linalg::StabilizedCholesky;
use crate::multiclass_parameters::{GpMultiClassifierParams, GpMultiClassifierValidParams};
use crate::optimization::{optimize_hypers, OptimParams};
use crate::parameters::initial_hypers;

use linfa::prelude::{DatasetBase, Fit, Float};
use log::{debug, info, warn};
use ndarray::{s, Array1, Array2, ArrayBase, ArrayView2, Axis, Data, Ix2, Zip};
use seqgp_kernels::Kernel;
use std::fmt;

/// Relative squared update under which a Newton step counts as converged
const MULTI_LAPLACE_TOL: f64 = 1e-12;
const LAPLACE_CONSECUTIVE: usize = 10;

/// Split concatenated hyperparameters into per-kernel vectors of given sizes
pub fn split_hypers<F: Float>(hypers: &Array1<F>, sizes: &[usize]) -> Result<Vec<Array1<F>>> {
    let total: usize = sizes.iter().sum();
    if hypers.len() != total {
        return Err(GpError::LengthMismatch(format!(
            "{} hyperparameters given while kernels require {}",
            hypers.len(),
            total
        )));
    }
    let mut start = 0;
    Ok(sizes
        .iter()
        .map(|&size| {
            let h = hypers.slice(s![start..start + size]).to_owned();
            start += size;
            h
        })
        .collect())
}

/// Block diagonal matrix of the given square blocks
pub fn expand<F: Float>(blocks: &[Array2<F>]) -> Array2<F> {
    let n: usize = blocks.iter().map(|b| b.nrows()).sum();
    let mut res = Array2::zeros((n, n));
    let mut start = 0;
    for b in blocks {
        let end = start + b.nrows();
        res.slice_mut(s![start..end, start..end]).assign(b);
        start = end;
    }
    res
}

/// Stack the columns of a (n, C) matrix into a vector of length `n * C`
pub fn stack<F: Float>(m: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
    m.t().iter().cloned().collect()
}

/// Inverse of [stack]
pub fn unstack<F: Float>(v: &Array1<F>, n_classes: usize) -> Array2<F> {
    let n = v.len() / n_classes;
    Array2::from_shape_fn((n, n_classes), |(i, c)| v[c * n + i])
}

/// Row-wise softmax of latent values (n, C)
pub fn softmax<F: Float>(f: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
    let mut res = f.to_owned();
    for mut row in res.rows_mut() {
        let max = row.fold(F::neg_infinity(), |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let total = row.sum();
        row.mapv_inplace(|v| v / total);
    }
    res
}

/// `log(sum(exp(f_c)))` for every row
fn log_sum_exp<F: Float>(f: &Array2<F>) -> Array1<F> {
    f.map_axis(Axis(1), |row| {
        let max = row.fold(F::neg_infinity(), |m, &v| m.max(v));
        max + row.fold(F::zero(), |acc, &v| acc + (v - max).exp()).ln()
    })
}

/// Laplace approximation at the latent mode of a multi-class problem
#[derive(Clone, Debug)]
pub(crate) struct MultiLaplaceMode<F: Float> {
    /// Latent mode (n, C)
    pub f: Array2<F>,
    /// Stacked `K^-1 f`
    pub a: Array1<F>,
    /// Negative approximate log marginal likelihood
    pub logq: F,
}

/// Per-class `E_c = D_c^1/2 (I + D_c^1/2 K_c D_c^1/2)^-1 D_c^1/2`
/// and the sum of the log diagonals of the factorizations
fn class_factors<F: Float>(ks: &[Array2<F>], pi: &Array2<F>) -> Result<(Vec<Array2<F>>, F)> {
    let mut z = F::zero();
    let es = ks
        .iter()
        .zip(pi.columns())
        .map(|(k, pi_c)| {
            let d_sqrt = pi_c.mapv(|p| p.sqrt());
            let mut b = k.to_owned();
            Zip::indexed(&mut b).for_each(|(i, j), v| *v = *v * d_sqrt[i] * d_sqrt[j]);
            b.diag_mut().mapv_inplace(|v| v + F::one());
            let chol = StabilizedCholesky::factorize(&b)?;
            z += chol.sum_log_diag();
            let mut e = chol.solve_mat(&Array2::from_diag(&d_sqrt))?;
            Zip::from(e.rows_mut())
                .and(&d_sqrt)
                .for_each(|mut row, &d| row.mapv_inplace(|v| v * d));
            Ok(e)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((es, z))
}

/// Training data of a multi-class classification
pub(crate) struct MultiClassificationProblem<'a, F: Float, K: Kernel<F>> {
    pub kernels: &'a [K],
    pub sizes: &'a [usize],
    pub x: ArrayView2<'a, K::Elem>,
    /// One-hot labels (n, C)
    pub y: ArrayView2<'a, F>,
    /// Newton iterations budget
    pub max_iterations: usize,
}

impl<'a, F: Float, K: Kernel<F>> MultiClassificationProblem<'a, F, K> {
    fn class_covs(&self, hypers: &Array1<F>) -> Result<Vec<Array2<F>>> {
        Ok(self
            .kernels
            .iter()
            .zip(split_hypers(hypers, self.sizes)?)
            .map(|(kernel, h)| kernel.self_cov(&self.x, &h))
            .collect())
    }

    /// Newton iterations towards the latent mode from `guess` (n, C), zeros by default
    pub fn find_f(&self, hypers: &Array1<F>, guess: Option<&Array2<F>>) -> Result<MultiLaplaceMode<F>> {
        let (n, n_classes) = self.y.dim();
        let mut f = match guess {
            Some(g) if g.dim() != (n, n_classes) => {
                return Err(GpError::LengthMismatch(format!(
                    "latent guess of shape {:?} given for {} items and {} classes",
                    g.dim(),
                    n,
                    n_classes
                )))
            }
            Some(g) => stack(g),
            None => Array1::zeros(n * n_classes),
        };
        let ks = self.class_covs(hypers)?;
        let k_big = expand(&ks);
        let y = stack(&self.y);
        let tol = F::cast(MULTI_LAPLACE_TOL);
        let eps = F::epsilon();

        let mut consecutive = 0;
        let mut change = F::infinity();
        for iter in 0..self.max_iterations {
            let f_mat = unstack(&f, n_classes);
            let pi = softmax(&f_mat);
            let (es, _) = class_factors(&ks, &pi)?;
            let m = es.iter().fold(Array2::zeros((n, n)), |acc, e| acc + e);
            let chol_m = StabilizedCholesky::factorize(&m)?;

            // b = (D - Pi Pi^T) f + y - pi
            let pi_f = (&pi * &f_mat).sum_axis(Axis(1));
            let mut b_mat = &pi * &f_mat;
            Zip::from(b_mat.rows_mut())
                .and(pi.rows())
                .and(&pi_f)
                .for_each(|mut row, pi_i, &pf| row.zip_mut_with(&pi_i, |v, &p| *v -= p * pf));
            let b = stack(&b_mat) + &y - stack(&pi);

            let e_big = expand(&es);
            let c = e_big.dot(&k_big.dot(&b));
            let rt_c = unstack(&c, n_classes).sum_axis(Axis(1));
            let s = chol_m.solve(&rt_c)?;
            let r_s: Array1<F> = (0..n_classes).flat_map(|_| s.iter().cloned()).collect();
            let a = b - c + e_big.dot(&r_s);
            let f_new = k_big.dot(&a);

            let diff = &f_new - &f;
            change = diff.dot(&diff) / f_new.dot(&f_new).max(eps);
            f = f_new;
            consecutive = if change < tol { consecutive + 1 } else { 0 };
            if consecutive >= LAPLACE_CONSECUTIVE {
                debug!("Multi-class Laplace mode found after {} iterations", iter + 1);
                let f_mat = unstack(&f, n_classes);
                let (_, z) = class_factors(&ks, &softmax(&f_mat))?;
                let logq = self.logq(&f_mat, &a, z);
                return Ok(MultiLaplaceMode { f: f_mat, a, logq });
            }
        }
        Err(GpError::NonConvergence {
            max_iterations: self.max_iterations,
            last_change: change.to_f64().unwrap_or(f64::NAN),
        })
    }

    /// `0.5 * a^T f - y^T f + sum(log(sum(exp(f_i)))) + z`
    fn logq(&self, f: &Array2<F>, a: &Array1<F>, z: F) -> F {
        let stacked = stack(f);
        F::cast(0.5) * a.dot(&stacked) - stack(&self.y).dot(&stacked) + log_sum_exp(f).sum() + z
    }
}

/// Check labels are a one-hot (n, C) matrix
fn check_one_hot<F: Float>(y: &ArrayBase<impl Data<Elem = F>, Ix2>, n_classes: usize) -> Result<()> {
    if y.ncols() != n_classes {
        return Err(GpError::LengthMismatch(format!(
            "labels for {} classes given while {} kernels are defined",
            y.ncols(),
            n_classes
        )));
    }
    for (i, row) in y.rows().into_iter().enumerate() {
        let binary = row.iter().all(|&v| v == F::zero() || v == F::one());
        if !binary || row.sum() != F::one() {
            return Err(GpError::InvalidLabel(format!("row {i} is not one-hot: {row}")));
        }
    }
    Ok(())
}

/// Gaussian process multi-class classifier with softmax likelihood,
/// one latent function and one kernel per class, the latent posterior
/// being approximated at its mode (Laplace).
#[derive(Clone, Debug)]
pub struct GpMultiClassifier<F: Float, K: Kernel<F>> {
    hypers: Array1<F>,
    sizes: Vec<usize>,
    mode: MultiLaplaceMode<F>,
    xt: Array2<K::Elem>,
    yt: Array2<F>,
    kernels: Vec<K>,
    params: GpMultiClassifierValidParams<F, K>,
}

impl<F: Float, K: Kernel<F>> fmt::Display for GpMultiClassifier<F, K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kernels: Vec<String> = self.kernels.iter().map(|k| k.to_string()).collect();
        write!(
            f,
            "GPMultiClassifier(kernels=[{}], hypers={}, neg_logq={})",
            kernels.join(", "),
            self.hypers,
            self.mode.logq
        )
    }
}

impl<F: Float, K: Kernel<F>> GpMultiClassifier<F, K> {
    /// Parameters constructor given one kernel per class
    pub fn params(kernels: Vec<K>) -> GpMultiClassifierParams<F, K> {
        GpMultiClassifierParams::new(kernels)
    }

    fn problem(&self) -> MultiClassificationProblem<'_, F, K> {
        MultiClassificationProblem {
            kernels: &self.kernels,
            sizes: &self.sizes,
            x: self.xt.view(),
            y: self.yt.view(),
            max_iterations: self.params.max_iterations,
        }
    }

    /// Latent mode (n, C) at given concatenated `hypers` starting from `guess`
    pub fn find_f(&self, hypers: &Array1<F>, guess: Option<&Array2<F>>) -> Result<Array2<F>> {
        Ok(self.problem().find_f(hypers, guess)?.f)
    }

    /// Class probabilities of new items are not available: always `None`.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = K::Elem>, Ix2>) -> Option<Array2<F>> {
        warn!(
            "Multi-class GP prediction is not available ({} items requested)",
            x.nrows()
        );
        None
    }

    /// Optimized hyperparameters, concatenation of the per-class vectors
    pub fn hypers(&self) -> &Array1<F> {
        &self.hypers
    }

    /// Per-class views of the optimized hyperparameters
    pub fn class_hypers(&self) -> Result<Vec<Array1<F>>> {
        split_hypers(&self.hypers, &self.sizes)
    }

    /// Negative approximate log marginal likelihood at the optimum
    pub fn ml(&self) -> F {
        self.mode.logq
    }

    /// Latent mode (n, C) at training points
    pub fn f_hat(&self) -> &Array2<F> {
        &self.mode.f
    }

    /// Class probabilities (n, C) at training points
    pub fn training_probabilities(&self) -> Array2<F> {
        softmax(&self.mode.f)
    }

    /// Fitted per-class kernels
    pub fn kernels(&self) -> &[K] {
        &self.kernels
    }

    /// Parameters used to fit the model
    pub fn params_used(&self) -> &GpMultiClassifierValidParams<F, K> {
        &self.params
    }
}

impl<F, K, D, DT> Fit<ArrayBase<D, Ix2>, ArrayBase<DT, Ix2>, GpError> for GpMultiClassifierValidParams<F, K>
where
    F: Float,
    K: Kernel<F>,
    D: Data<Elem = K::Elem>,
    DT: Data<Elem = F>,
{
    type Object = GpMultiClassifier<F, K>;

    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<DT, Ix2>>) -> Result<Self::Object> {
        let (x, y) = (dataset.records(), dataset.targets());
        check_one_hot(y, self.kernels.len())?;
        if x.nrows() != y.nrows() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} labels",
                x.nrows(),
                y.nrows()
            )));
        }
        let mut kernels = self.kernels.clone();
        let sizes: Vec<usize> = kernels.iter_mut().map(|k| k.fit(x)).collect();
        let guesses = initial_hypers(self.guesses.as_ref(), sizes.iter().sum())?;
        let (xt, yt) = (x.to_owned(), y.to_owned());

        let problem = MultiClassificationProblem {
            kernels: &kernels,
            sizes: &sizes,
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
        info!(
            "GP multi-class classifier fitted with hypers = {hypers}, neg_logq = {}",
            mode.logq
        );

        Ok(GpMultiClassifier {
            hypers,
            sizes,
            mode,
            xt,
            yt,
            kernels,
            params: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier_algorithm::LAPLACE_MAX_ITER;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Dataset;
    use linfa::ParamGuard;
    use ndarray::{array, Array2};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use ndarray_stats::QuantileExt;
    use rand_xoshiro::Xoshiro256Plus;
    use seqgp_kernels::IdentityKernel;

    fn toy() -> (Array2<char>, Array2<f64>) {
        let seqs = ["AAAA", "AAAB", "BBBB", "BBBA", "CCCC", "CCCA"];
        let flat: Vec<char> = seqs.iter().flat_map(|s| s.chars()).collect();
        let mut y = Array2::zeros((6, 3));
        for i in 0..6 {
            y[[i, i / 2]] = 1.;
        }
        (Array2::from_shape_vec((6, 4), flat).unwrap(), y)
    }

    fn kernels() -> Vec<IdentityKernel<char>> {
        vec![IdentityKernel::new(); 3]
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let f = Array2::random_using((10, 4), Normal::new(0., 50.).unwrap(), &mut rng);
        let p = softmax(&f);
        assert_abs_diff_eq!(p.sum_axis(Axis(1)), Array1::ones(10), epsilon = 1e-12);
        let extreme = softmax(&array![[1000f64, -1000., 0.], [-800., -800., -800.]]);
        assert!(extreme.iter().all(|v| v.is_finite()));
        assert_abs_diff_eq!(extreme.row(0).to_owned(), array![1., 0., 0.], epsilon = 1e-12);
        assert_abs_diff_eq!(extreme.row(1).to_owned(), Array1::from_elem(3, 1. / 3.), epsilon = 1e-12);
    }

    #[test]
    fn test_block_views() {
        let m = array![[1., 2.], [3., 4.], [5., 6.]];
        let v = stack(&m);
        assert_eq!(v, array![1., 3., 5., 2., 4., 6.]);
        assert_eq!(unstack(&v, 2), m);
        let big = expand(&[array![[1., 2.], [3., 4.]], array![[5.]]]);
        assert_eq!(big, array![[1., 2., 0.], [3., 4., 0.], [0., 0., 5.]]);
        let parts = split_hypers(&array![1., 2., 3.], &[1, 2]).unwrap();
        assert_eq!(parts, vec![array![1.], array![2., 3.]]);
        assert!(matches!(
            split_hypers(&array![1., 2.], &[1, 2]),
            Err(GpError::LengthMismatch(_))
        ));
    }

    #[test]
    fn test_find_f() {
        let (xt, yt) = toy();
        let kernels = kernels();
        let problem = MultiClassificationProblem {
            kernels: &kernels,
            sizes: &[1, 1, 1],
            x: xt.view(),
            y: yt.view(),
            max_iterations: LAPLACE_MAX_ITER,
        };
        let mode = problem.find_f(&array![1., 1., 1.], None).unwrap();
        assert!(mode.logq.is_finite());
        let p = softmax(&mode.f);
        for i in 0..6 {
            assert_eq!(p.row(i).argmax().unwrap(), i / 2);
        }
        assert!(matches!(
            problem.find_f(&array![1., 1., 1.], Some(&Array2::zeros((2, 3)))),
            Err(GpError::LengthMismatch(_))
        ));
    }

    #[test]
    fn test_fit() {
        let (xt, yt) = toy();
        let gpc = GpMultiClassifier::params(kernels())
            .max_eval(30)
            .fit(&Dataset::new(xt.clone(), yt))
            .expect("multi-class GP fitted");
        assert_eq!(gpc.hypers().len(), 3);
        assert_eq!(gpc.class_hypers().unwrap().len(), 3);
        assert!(gpc.ml().is_finite());
        let p = gpc.training_probabilities();
        for i in 0..6 {
            assert_eq!(p.row(i).argmax().unwrap(), i / 2);
        }
        assert!(gpc.predict(&xt).is_none());
    }

    #[test]
    fn test_invalid_labels() {
        let (xt, mut yt) = toy();
        let params = GpMultiClassifier::params(kernels()).fixed_hypers(array![1., 1., 1.]);
        assert!(matches!(
            params.fit(&Dataset::new(xt.clone(), yt.slice(s![.., 0..2]).to_owned())),
            Err(GpError::LengthMismatch(_))
        ));
        yt[[0, 1]] = 1.;
        assert!(matches!(
            params.fit(&Dataset::new(xt.clone(), yt.clone())),
            Err(GpError::InvalidLabel(_))
        ));
        yt[[0, 0]] = 0.5;
        yt[[0, 1]] = 0.5;
        assert!(matches!(
            params.fit(&Dataset::new(xt, yt)),
            Err(GpError::InvalidLabel(_))
        ));
        assert!(matches!(
            GpMultiClassifier::<f64, _>::params(vec![IdentityKernel::<char>::new()]).check(),
            Err(GpError::ConfigError(_))
        ));
    }

    #[test]
    fn test_mode_finding_budget() {
        let (xt, yt) = toy();
        let res = GpMultiClassifier::params(kernels())
            .fixed_hypers(array![1., 1., 1.])
            .max_iterations(3)
            .fit(&Dataset::new(xt.clone(), yt.clone()));
        assert!(matches!(
            res,
            Err(GpError::NonConvergence {
                max_iterations: 3,
                ..
            })
        ));
        let err = GpMultiClassifier::<f64, _>::params(kernels())
            .max_iterations(0)
            .check()
            .unwrap_err();
        assert!(matches!(err, GpError::ConfigError(_)));
    }
}
