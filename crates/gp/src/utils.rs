use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Mean and standard deviation of regression targets
///
/// The standard deviation is the sample one (`ddof = 1`). A zero (or
/// undefined) standard deviation is replaced by one.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Normalization<F> {
    /// Mean of the targets
    pub mean: F,
    /// Standard deviation of the targets
    pub std: F,
}

impl<F: Float> Normalization<F> {
    /// Compute normalization constants of `y`
    pub fn new(y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Self {
        let mean = y.mean().unwrap_or_else(F::zero);
        let std = if y.len() > 1 {
            y.std(F::one())
        } else {
            F::one()
        };
        let std = if std == F::zero() || !std.is_finite() {
            F::one()
        } else {
            std
        };
        Normalization { mean, std }
    }

    /// `(y - mean) / std`
    pub fn normalize(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F> {
        y.mapv(|v| (v - self.mean) / self.std)
    }

    /// `y * std + mean`
    pub fn denormalize(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F> {
        y.mapv(|v| v * self.std + self.mean)
    }
}

/// Logistic function evaluated without overflow
pub(crate) fn sigmoid<F: Float>(z: F) -> F {
    if z >= F::zero() {
        F::one() / (F::one() + (-z).exp())
    } else {
        let e = z.exp();
        e / (F::one() + e)
    }
}

/// `log(1 + exp(z))` evaluated without overflow
pub(crate) fn softplus<F: Float>(z: F) -> F {
    let twenty = F::cast(20.);
    if z > twenty {
        z + (-z).exp()
    } else if z < -twenty {
        z.exp()
    } else {
        z.exp().ln_1p()
    }
}

/// `log(sigmoid(z))`
pub(crate) fn log_sigmoid<F: Float>(z: F) -> F {
    -softplus(-z)
}

/// Adaptive Simpson quadrature of `f` over `[a, b]`
pub(crate) fn integrate<F: Float>(f: impl Fn(F) -> F, a: F, b: F, tol: F) -> F {
    let m = (a + b) / F::cast(2.);
    let (fa, fm, fb) = (f(a), f(m), f(b));
    let whole = simpson(a, b, fa, fm, fb);
    adaptive_simpson(&f, a, b, fa, fm, fb, whole, tol, 50)
}

fn simpson<F: Float>(a: F, b: F, fa: F, fm: F, fb: F) -> F {
    (b - a) / F::cast(6.) * (fa + F::cast(4.) * fm + fb)
}

#[allow(clippy::too_many_arguments)]
fn adaptive_simpson<F: Float>(
    f: &impl Fn(F) -> F,
    a: F,
    b: F,
    fa: F,
    fm: F,
    fb: F,
    whole: F,
    tol: F,
    depth: usize,
) -> F {
    let two = F::cast(2.);
    let m = (a + b) / two;
    let (lm, rm) = ((a + m) / two, (m + b) / two);
    let (flm, frm) = (f(lm), f(rm));
    let left = simpson(a, m, fa, flm, fm);
    let right = simpson(m, b, fm, frm, fb);
    let delta = left + right - whole;
    if depth == 0 || delta.abs() <= F::cast(15.) * tol {
        left + right + delta / F::cast(15.)
    } else {
        adaptive_simpson(f, a, m, fa, flm, fm, left, tol / two, depth - 1)
            + adaptive_simpson(f, m, b, fm, frm, fb, right, tol / two, depth - 1)
    }
}
