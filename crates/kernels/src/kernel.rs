use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2};
use std::fmt;

/// A covariance function between encoded items (one item per row).
///
/// `fit` is called once at the start of every training call, before any
/// covariance is requested for the training inputs. It does not fit anything
/// in the statistical sense: it registers the inputs (a kernel may cache a
/// derived representation of each of them) and tells the caller how many
/// hyperparameters [Kernel::cov] expects.
pub trait Kernel<F: Float>: Clone + fmt::Debug + fmt::Display + Send + Sync {
    /// Type of one encoded position (residue symbol, numeric feature, ...)
    type Elem: Clone + PartialEq + fmt::Debug + Send + Sync;

    /// Register the training inputs `x` as a (n, L) matrix and return
    /// the number of hyperparameters required.
    fn fit(&mut self, x: &ArrayBase<impl Data<Elem = Self::Elem>, Ix2>) -> usize;

    /// Number of hyperparameters expected by [Kernel::cov]
    fn n_hypers(&self) -> usize;

    /// Covariance matrix (na, nb) between the rows of `xa` and the rows of `xb`
    /// given positive `hypers` of length [Kernel::n_hypers].
    fn cov(
        &self,
        xa: &ArrayBase<impl Data<Elem = Self::Elem>, Ix2>,
        xb: &ArrayBase<impl Data<Elem = Self::Elem>, Ix2>,
        hypers: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F>;

    /// Covariance matrix (n, n) of the rows of `x` with themselves
    fn self_cov(
        &self,
        x: &ArrayBase<impl Data<Elem = Self::Elem>, Ix2>,
        hypers: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        self.cov(x, x, hypers)
    }
}
