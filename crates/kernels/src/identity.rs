use crate::Kernel;
use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

/// Identity (Hamming similarity) kernel
///
/// `k(s1, s2) = var * #{ i | s1[i] == s2[i] }`
///
/// Sequences have to be aligned: items are compared position by position
/// so every row must have the same length.
#[derive(Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct IdentityKernel<A> {
    #[cfg_attr(feature = "serializable", serde(skip))]
    symbol: PhantomData<A>,
}

impl<A> IdentityKernel<A> {
    /// Constructor
    pub fn new() -> Self {
        IdentityKernel {
            symbol: PhantomData,
        }
    }
}

impl<A> Default for IdentityKernel<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for IdentityKernel<A> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<A> PartialEq for IdentityKernel<A> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<A> fmt::Display for IdentityKernel<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Identity")
    }
}

impl<F, A> Kernel<F> for IdentityKernel<A>
where
    F: Float,
    A: Clone + PartialEq + fmt::Debug + Send + Sync,
{
    type Elem = A;

    fn fit(&mut self, _x: &ArrayBase<impl Data<Elem = A>, Ix2>) -> usize {
        <Self as Kernel<F>>::n_hypers(self)
    }

    fn n_hypers(&self) -> usize {
        1
    }

    fn cov(
        &self,
        xa: &ArrayBase<impl Data<Elem = A>, Ix2>,
        xb: &ArrayBase<impl Data<Elem = A>, Ix2>,
        hypers: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let var = hypers[0];
        let mut k = Array2::zeros((xa.nrows(), xb.nrows()));
        Zip::from(k.rows_mut())
            .and(xa.rows())
            .for_each(|mut krow, sa| {
                Zip::from(&mut krow).and(xb.rows()).for_each(|kij, sb| {
                    let same = sa.iter().zip(sb.iter()).filter(|(a, b)| a == b).count();
                    *kij = var * F::cast(same);
                })
            });
        k
    }
}
