use crate::errors::Result;
use finitediff::FiniteDiff;
use linfa::Float;
use log::{debug, warn};
use ndarray::{arr1, Array1, Array2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Lower bound of every hyperparameter
pub const HYPERS_LOWER_BOUND: f64 = 1e-5;
/// Upper bound of every hyperparameter
pub const HYPERS_UPPER_BOUND: f64 = 1e8;
/// Default maximum number of objective evaluations during one optimization
pub const GP_OPTIM_MAX_EVAL: usize = 500;

/// Log10 box random restarts are drawn from
const RESTART_LOG10_BOX: (f64, f64) = (-3., 2.);

/// Optimizer used to tune hyperparameters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Algorithm {
    /// Bounded quasi-Newton (SLSQP) with central finite difference gradient
    #[default]
    Slsqp,
    /// Derivative free linear approximations (COBYLA)
    Cobyla,
}

pub(crate) struct OptimParams {
    pub algorithm: Algorithm,
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub max_eval: usize,
}

impl Default for OptimParams {
    fn default() -> Self {
        OptimParams {
            algorithm: Algorithm::Slsqp,
            rhobeg: 0.5,
            ftol_rel: 1e-6,
            max_eval: GP_OPTIM_MAX_EVAL,
        }
    }
}

/// Initial points of the optimizations and bounds, in log10 space
///
/// The first start is the given `hypers0`, the `n_start` others are drawn
/// uniformly with a fixed seed so that fits are reproducible.
pub(crate) fn prepare_multistart<F: Float>(
    n_start: usize,
    hypers0: &Array1<F>,
) -> (Array2<f64>, Vec<(f64, f64)>) {
    let (lo, up) = (HYPERS_LOWER_BOUND.log10(), HYPERS_UPPER_BOUND.log10());
    let bounds = vec![(lo, up); hypers0.len()];

    let mut starts = Array2::zeros((n_start + 1, hypers0.len()));
    starts
        .row_mut(0)
        .assign(&hypers0.mapv(|v| into_f64(v).log10().clamp(lo, up)));
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    for mut row in starts.rows_mut().into_iter().skip(1) {
        row.mapv_inplace(|_| rng.gen_range(RESTART_LOG10_BOX.0..RESTART_LOG10_BOX.1));
    }
    (starts, bounds)
}

/// Minimize `objective` over positive hyperparameters starting from `hypers0`
///
/// Optimization runs on log10 values within
/// [[HYPERS_LOWER_BOUND], [HYPERS_UPPER_BOUND]]. A failed evaluation
/// (error or NaN) scores `+inf`.
pub(crate) fn optimize_hypers<F, ObjF>(
    objective: ObjF,
    hypers0: &Array1<F>,
    n_start: usize,
    optim: &OptimParams,
) -> Array1<F>
where
    F: Float,
    ObjF: Fn(&Array1<F>) -> Result<F> + Sync,
{
    let base: f64 = 10.;
    let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
        let hypers: Array1<F> = x.iter().map(|v| F::cast(base.powf(*v))).collect();
        if hypers.iter().any(|v| !v.is_finite()) {
            return f64::INFINITY;
        }
        match objective(&hypers) {
            Ok(v) => nan_to_inf(into_f64(v)),
            Err(err) => {
                debug!("Objective evaluation failed at {hypers}: {err}");
                f64::INFINITY
            }
        }
    };

    let (starts, bounds) = prepare_multistart(n_start, hypers0);
    debug!("Optimize with multistart hypers = {starts:?} and bounds = {bounds:?}");
    let now = Instant::now();
    let best = (0..starts.nrows())
        .into_par_iter()
        .map(|i| optimize_params(&objfn, &starts.row(i).to_owned(), &bounds, optim))
        .reduce(
            || (f64::INFINITY, starts.row(0).to_owned()),
            |a, b| if b.0 < a.0 { b } else { a },
        );
    debug!("elapsed optim = {:?}", now.elapsed().as_millis());
    best.1.mapv(|v| F::cast(base.powf(v)))
}

/// Minimize `objfn` from `param0` within `bounds`, returns (fmin, xmin)
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    optim: &OptimParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
{
    let xinit = param0.to_vec();
    let res = match optim.algorithm {
        Algorithm::Slsqp => {
            let fun = |x: &[f64], gradient: Option<&mut [f64]>, u: &mut ()| -> f64 {
                if let Some(grad) = gradient {
                    let f = |x: &Vec<f64>| -> f64 { objfn(x.as_slice(), None, &mut ()) };
                    grad[..].copy_from_slice(&x.to_vec().central_diff(&f));
                }
                objfn(x, None, u)
            };
            let cons: Vec<fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64> = vec![];
            slsqp::minimize(
                fun,
                &xinit,
                bounds,
                &cons,
                (),
                optim.max_eval,
                Some(slsqp::StopTols {
                    ftol_rel: optim.ftol_rel,
                    ..slsqp::StopTols::default()
                }),
            )
            .map(|(_, x_opt, fval)| (fval, x_opt))
            .map_err(|(_, x_opt, _)| x_opt)
        }
        Algorithm::Cobyla => {
            let cons: Vec<&dyn cobyla::Func<()>> = vec![];
            cobyla::minimize(
                |x: &[f64], u: &mut ()| objfn(x, None, u),
                &xinit,
                bounds,
                &cons,
                (),
                optim.max_eval,
                cobyla::RhoBeg::All(optim.rhobeg),
                Some(cobyla::StopTols {
                    ftol_rel: optim.ftol_rel,
                    ..cobyla::StopTols::default()
                }),
            )
            .map(|(_, x_opt, fval)| (fval, x_opt))
            .map_err(|(_, x_opt, _)| x_opt)
        }
    };
    match res {
        Ok((fval, x_opt)) => (nan_to_inf(fval), arr1(&x_opt)),
        Err(x_opt) => {
            warn!("{:?} optimizer stopped early at {x_opt:?}", optim.algorithm);
            (nan_to_inf(objfn(x_opt.as_slice(), None, &mut ())), arr1(&x_opt))
        }
    }
}

fn nan_to_inf(v: f64) -> f64 {
    if v.is_nan() {
        f64::INFINITY
    } else {
        v
    }
}

#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_multistart_is_reproducible() {
        let (s1, bounds) = prepare_multistart(3, &array![1e-7, 10.]);
        let (s2, _) = prepare_multistart(3, &array![1e-7, 10.]);
        assert_eq!(s1, s2);
        assert_eq!(s1.dim(), (4, 2));
        // initial guess is clamped within bounds
        assert_abs_diff_eq!(s1[[0, 0]], -5., epsilon = 1e-12);
        assert_abs_diff_eq!(s1[[0, 1]], 1., epsilon = 1e-12);
        assert_eq!(bounds.len(), 2);
        assert_abs_diff_eq!(bounds[1].0, -5., epsilon = 1e-12);
        assert_abs_diff_eq!(bounds[1].1, 8., epsilon = 1e-12);
        // restarts are drawn in a box of plausible values
        assert!(s1.iter().skip(2).all(|v| (-3. ..2.).contains(v)));
    }

    #[test]
    fn test_optimize_hypers() {
        let objective = |h: &Array1<f64>| -> Result<f64> {
            Ok((h[0].ln() - 2f64.ln()).powi(2) + (h[1] - 0.3).powi(2))
        };
        for algorithm in [Algorithm::Slsqp, Algorithm::Cobyla] {
            let optim = OptimParams {
                algorithm,
                ..OptimParams::default()
            };
            let h = optimize_hypers(objective, &array![1., 1.], 1, &optim);
            assert_abs_diff_eq!(h, array![2., 0.3], epsilon = 5e-2);
        }
    }

    #[test]
    fn test_optimize_at_lower_bound() {
        let objective = |h: &Array1<f64>| -> Result<f64> { Ok(h[0]) };
        let h = optimize_hypers(objective, &array![0.5], 0, &OptimParams::default());
        assert_abs_diff_eq!(h[0], HYPERS_LOWER_BOUND, epsilon = 1e-6);
    }
}
