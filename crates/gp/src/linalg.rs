//! Numerically stable dense linear algebra used by the GP models.
//!
//! Covariance matrices built from sequence kernels are often singular
//! (duplicated sequences) or slightly indefinite (round-off), so every model
//! goes through the modified Cholesky factorization of Gill, Murray and Wright
//! with symmetric pivoting rather than a plain Cholesky decomposition.
use crate::errors::{GpError, Result};
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*, LinalgError};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use std::cmp::Ordering;

/// Modified Cholesky factorization `P (A + E) P^T = L L^T`
///
/// where `P` is a permutation, `E` a non negative diagonal perturbation
/// (zero for a well conditioned positive definite `A`) and `L` lower triangular
/// with a strictly positive diagonal.
#[derive(Clone, Debug)]
pub struct StabilizedCholesky<F: Float> {
    l: Array2<F>,
    perm: Vec<usize>,
    max_perturbation: F,
}

impl<F: Float> StabilizedCholesky<F> {
    /// Factorize the symmetric matrix `a`
    pub fn factorize(a: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Self> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(LinalgError::NotSquare {
                rows: n,
                cols: a.ncols(),
            }
            .into());
        }
        let mut a = a.to_owned();
        let eps = F::epsilon();

        let gamma = a.diag().fold(F::zero(), |m, v| m.max(v.abs()));
        let mut xi = F::zero();
        for ((i, j), v) in a.indexed_iter() {
            if i != j {
                xi = xi.max(v.abs());
            }
        }
        let nu = if n > 1 {
            F::cast(n * n - 1).sqrt().max(F::one())
        } else {
            F::one()
        };
        let beta2 = gamma.max(xi / nu).max(eps);
        let delta = eps * (gamma + xi).max(F::one());

        let mut perm: Vec<usize> = (0..n).collect();
        let mut l = Array2::<F>::eye(n);
        let mut d = Array1::<F>::zeros(n);
        let mut cdiag = a.diag().to_owned();
        let mut c = Array1::<F>::zeros(n);
        let mut max_perturbation = F::zero();

        for j in 0..n {
            let q = (j..n)
                .max_by(|&p, &r| {
                    cdiag[p]
                        .abs()
                        .partial_cmp(&cdiag[r].abs())
                        .unwrap_or(Ordering::Equal)
                })
                .unwrap_or(j);
            if q != j {
                for k in 0..n {
                    a.swap([j, k], [q, k]);
                }
                for k in 0..n {
                    a.swap([k, j], [k, q]);
                }
                for s in 0..j {
                    l.swap([j, s], [q, s]);
                }
                cdiag.swap(j, q);
                perm.swap(j, q);
            }

            let mut theta = F::zero();
            for i in j + 1..n {
                let mut cij = a[[i, j]];
                for s in 0..j {
                    cij -= d[s] * l[[i, s]] * l[[j, s]];
                }
                c[i] = cij;
                theta = theta.max(cij.abs());
            }
            let cjj = cdiag[j];
            let dj = cjj.abs().max(theta * theta / beta2).max(delta);
            max_perturbation = max_perturbation.max(dj - cjj);
            d[j] = dj;
            for i in j + 1..n {
                l[[i, j]] = c[i] / dj;
                cdiag[i] -= l[[i, j]] * c[i];
            }
        }

        for (mut col, dj) in l.axis_iter_mut(Axis(1)).zip(d.iter()) {
            let sd = dj.sqrt();
            col.mapv_inplace(|v| v * sd);
        }

        Ok(StabilizedCholesky {
            l,
            perm,
            max_perturbation,
        })
    }

    /// Lower triangular factor
    pub fn l(&self) -> &Array2<F> {
        &self.l
    }

    /// Permutation: row `i` of the factorized matrix is row `perm[i]` of `A`
    pub fn perm(&self) -> &[usize] {
        &self.perm
    }

    /// Largest diagonal perturbation added to `A`
    pub fn max_perturbation(&self) -> F {
        self.max_perturbation
    }

    /// Consume the factorization into (L, permutation, largest perturbation)
    pub fn into_parts(self) -> (Array2<F>, Vec<usize>, F) {
        (self.l, self.perm, self.max_perturbation)
    }

    /// `sum(log(diag(L)))`, half the log determinant of the factorized matrix
    pub fn sum_log_diag(&self) -> F {
        self.l.diag().mapv(|v| v.ln()).sum()
    }

    /// Rows of `b` in factorization order, `P b`
    fn permuted(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        if b.nrows() != self.perm.len() {
            return Err(GpError::LengthMismatch(format!(
                "right hand side with {} rows given for a ({n}, {n}) factorization",
                b.nrows(),
                n = self.perm.len()
            )));
        }
        Ok(b.select(Axis(0), &self.perm))
    }

    /// Solve `A x = b`
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let x = self.solve_mat(&b.view().insert_axis(Axis(1)))?;
        Ok(x.index_axis_move(Axis(1), 0))
    }

    /// Solve `A X = B`
    pub fn solve_mat(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let v = self.triangular_solve_mat(b)?;
        // L^T z = v
        let z = self.l.t().solve_triangular(&v, UPLO::Upper)?;
        let mut x = Array2::zeros(z.raw_dim());
        for (zrow, &p) in z.rows().into_iter().zip(&self.perm) {
            x.row_mut(p).assign(&zrow);
        }
        Ok(x)
    }

    /// Solve `L v = P b`
    pub fn triangular_solve(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let v = self.triangular_solve_mat(&b.view().insert_axis(Axis(1)))?;
        Ok(v.index_axis_move(Axis(1), 0))
    }

    /// Solve `L V = P B`
    pub fn triangular_solve_mat(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        Ok(self.l.solve_triangular(&self.permuted(b)?, UPLO::Lower)?)
    }
}

/// Explicit inverse `L^-T L^-1` of a symmetric positive definite matrix `A = L L^T`
///
/// Unlike [StabilizedCholesky], no perturbation is applied: a singular
/// matrix is an error.
pub fn inverse<F: Float>(a: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
    let l = a.cholesky()?;
    if l.diag().iter().any(|&v| !(v > F::zero() && v.is_finite())) {
        return Err(LinalgError::NotPositiveDefinite.into());
    }
    let linv = l.solve_triangular(&Array2::eye(l.nrows()), UPLO::Lower)?;
    Ok(linv.t().dot(&linv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn reconstruct(chol: &StabilizedCholesky<f64>, a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
        let p = chol.perm();
        let pa = Array2::from_shape_fn(a.dim(), |(i, j)| a[[p[i], p[j]]]);
        (pa, chol.l().dot(&chol.l().t()))
    }

    #[test]
    fn test_positive_definite_is_exact() {
        let a = array![[4., 1., 0.5], [1., 3., 0.2], [0.5, 0.2, 2.]];
        let chol = StabilizedCholesky::factorize(&a).unwrap();
        let (pa, llt) = reconstruct(&chol, &a);
        assert_abs_diff_eq!(pa, llt, epsilon = 1e-12);
        assert_abs_diff_eq!(chol.max_perturbation(), 0.);
        // lower triangular
        assert_abs_diff_eq!(chol.l()[[0, 2]], 0.);
        // largest diagonal element first
        assert_eq!(chol.perm()[0], 0);
    }

    #[test]
    fn test_solve() {
        let a = array![[4., 1.], [1., 3.]];
        let chol = StabilizedCholesky::factorize(&a).unwrap();
        let x = chol.solve(&array![1., 2.]).unwrap();
        assert_abs_diff_eq!(x, array![1. / 11., 7. / 11.], epsilon = 1e-12);
        let xs = chol.solve_mat(&array![[1., 0.], [2., 1.]]).unwrap();
        assert_abs_diff_eq!(xs.column(0).to_owned(), x, epsilon = 1e-12);
        assert_abs_diff_eq!(a.dot(&xs), array![[1., 0.], [2., 1.]], epsilon = 1e-12);
        assert_abs_diff_eq!(chol.sum_log_diag(), 0.5 * 11f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_triangular_solve() {
        let a = array![[2., 1., 0.], [1., 5., 1.], [0., 1., 3.]];
        let chol = StabilizedCholesky::factorize(&a).unwrap();
        let b = array![1., -1., 2.];
        let v = chol.triangular_solve(&b).unwrap();
        // v^T v = b^T A^-1 b
        assert_abs_diff_eq!(v.dot(&v), b.dot(&chol.solve(&b).unwrap()), epsilon = 1e-12);
        let vs = chol.triangular_solve_mat(&b.clone().insert_axis(Axis(1))).unwrap();
        assert_abs_diff_eq!(vs.column(0).to_owned(), v, epsilon = 1e-12);
        assert!(matches!(
            chol.triangular_solve(&array![1., 2.]),
            Err(GpError::LengthMismatch(_))
        ));
    }

    #[test]
    fn test_singular_is_stabilized() {
        // duplicated items give a rank one covariance
        let a = array![[4., 4., 4.], [4., 4., 4.], [4., 4., 4.]];
        let chol = StabilizedCholesky::factorize(&a).unwrap();
        assert!(chol.l().diag().iter().all(|&v| v > 0.));
        assert!(chol.max_perturbation() > 0.);
        let (pa, llt) = reconstruct(&chol, &a);
        // only the diagonal may be perturbed
        for i in 0..3 {
            for j in 0..3 {
                if i != j {
                    assert_abs_diff_eq!(pa[[i, j]], llt[[i, j]], epsilon = 1e-10);
                } else {
                    assert!(llt[[i, i]] >= pa[[i, i]] - 1e-10);
                }
            }
        }
        assert!(chol
            .solve(&array![1., 1., 1.])
            .unwrap()
            .iter()
            .all(|v| v.is_finite()));
    }

    #[test]
    fn test_indefinite_is_stabilized() {
        let a = array![[1f64, 1. + 1e-9], [1. + 1e-9, 1.]];
        let chol = StabilizedCholesky::factorize(&a).unwrap();
        assert!(chol.l().diag().iter().all(|&v| v > 0.));
        assert!(chol.sum_log_diag().is_finite());
    }

    #[test]
    fn test_inverse() {
        let a = array![[4., 1., 0.5], [1., 3., 0.2], [0.5, 0.2, 2.]];
        let inv = inverse(&a).unwrap();
        assert_abs_diff_eq!(a.dot(&inv), Array2::eye(3), epsilon = 1e-12);
        assert_abs_diff_eq!(inv, inv.t(), epsilon = 1e-12);
        assert!(matches!(
            inverse(&array![[1., 2.], [2., 4.]]),
            Err(GpError::LinalgError(_))
        ));
        assert!(matches!(
            StabilizedCholesky::factorize(&array![[1., 2.]]),
            Err(GpError::LinalgError(LinalgError::NotSquare { rows: 1, cols: 2 }))
        ));
    }
}
