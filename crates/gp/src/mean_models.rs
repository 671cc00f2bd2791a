//! A module for prior mean models of the GP regression.
//!
//! The mean model is fitted on the normalized targets before the GP, the GP
//! then models the residuals. The following models are implemented:
//! * zero (default), usable with any kind of input,
//! * constant, usable with any kind of input,
//! * linear, for numeric feature inputs.

use crate::errors::{GpError, Result};
use crate::linalg::StabilizedCholesky;
use linfa::Float;
use ndarray::{concatenate, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait for prior mean models used in GP regression over inputs of type `A`
pub trait PriorMean<F: Float, A>: Clone + Default + fmt::Debug + fmt::Display + Send + Sync {
    /// Fit the model on training inputs `x` and normalized targets `y`
    fn fit(
        &mut self,
        x: &ArrayBase<impl Data<Elem = A>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()>;

    /// Mean value at every row of `x`
    fn value(&self, x: &ArrayBase<impl Data<Elem = A>, Ix2>) -> Array1<F>;
}

/// A null function as mean of the GP
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ZeroMean();

impl<F: Float, A> PriorMean<F, A> for ZeroMean {
    fn fit(
        &mut self,
        _x: &ArrayBase<impl Data<Elem = A>, Ix2>,
        _y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        Ok(())
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = A>, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

impl fmt::Display for ZeroMean {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Zero")
    }
}

/// A constant function as mean of the GP, the mean of the targets it is fitted on
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ConstantMean<F> {
    constant: F,
}

impl<F: Float> ConstantMean<F> {
    /// Fitted constant, zero before fitting
    pub fn constant(&self) -> F {
        self.constant
    }
}

impl<F: Float, A> PriorMean<F, A> for ConstantMean<F> {
    fn fit(
        &mut self,
        x: &ArrayBase<impl Data<Elem = A>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} targets",
                x.nrows(),
                y.len()
            )));
        }
        self.constant = y.mean().unwrap_or_else(F::zero);
        Ok(())
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = A>, Ix2>) -> Array1<F> {
        Array1::from_elem(x.nrows(), self.constant)
    }
}

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Constant")
    }
}

/// An affine function of numeric features as mean of the GP,
/// fitted by least squares.
///
/// mean(x) = w_0 + w_1 * x_1 + ... + w_nx * x_nx
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LinearMean<F> {
    weights: Array1<F>,
}

impl<F: Float> LinearMean<F> {
    /// Fitted weights `[w_0, w_1, ..., w_nx]`, empty before fitting
    pub fn weights(&self) -> &Array1<F> {
        &self.weights
    }

    fn design(x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        concatenate![Axis(1), Array2::ones((x.nrows(), 1)), x.to_owned()]
    }
}

impl<F: Float> PriorMean<F, F> for LinearMean<F> {
    fn fit(
        &mut self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(GpError::LengthMismatch(format!(
                "{} inputs given for {} targets",
                x.nrows(),
                y.len()
            )));
        }
        let a = Self::design(x);
        let normal = StabilizedCholesky::factorize(&a.t().dot(&a))?;
        self.weights = normal.solve(&a.t().dot(y))?;
        Ok(())
    }

    fn value(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
        if self.weights.is_empty() {
            Array1::zeros(x.nrows())
        } else {
            Self::design(x).dot(&self.weights)
        }
    }
}

impl<F: Float> fmt::Display for LinearMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Linear")
    }
}
