use crate::Kernel;
use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Linear kernel over numeric features
///
/// `k(x1, x2) = var * <x1, x2>`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LinearKernel();

impl fmt::Display for LinearKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Linear")
    }
}

impl<F: Float> Kernel<F> for LinearKernel {
    type Elem = F;

    fn fit(&mut self, _x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> usize {
        1
    }

    fn n_hypers(&self) -> usize {
        1
    }

    fn cov(
        &self,
        xa: &ArrayBase<impl Data<Elem = F>, Ix2>,
        xb: &ArrayBase<impl Data<Elem = F>, Ix2>,
        hypers: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        xa.dot(&xb.t()) * hypers[0]
    }
}
