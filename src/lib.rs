//! Gaussian process regression and classification over biological sequences.
//!
//! `seqgp` bundles two crates:
//! * [kernels]: covariance functions over encoded sequences (`(n, L)` matrices
//!   of residues) such as the [identity](kernels::IdentityKernel) and
//!   [contact](kernels::ContactKernel) kernels,
//! * [gp]: the models trained with those kernels, namely
//!   [regression](gp::GpRegressor), [binary](gp::GpClassifier) and
//!   [multi-class](gp::GpMultiClassifier) Laplace classification, and
//!   [regression on L1 selected features](gp::LassoGpRegressor).
//!
//! # Example
//!
//! ```
//! use seqgp::gp::{mean_models::ZeroMean, GpRegressor};
//! use seqgp::kernels::IdentityKernel;
//! use linfa::prelude::*;
//! use ndarray::{array, Array2};
//!
//! let seqs: Vec<char> = "AAAABAAAABAAAABAAAAB".chars().collect();
//! let xt = Array2::from_shape_vec((5, 4), seqs).unwrap();
//! let yt = array![0.5, 1.5, -0.2, 0.9, -1.3];
//!
//! let gp = GpRegressor::params(ZeroMean(), IdentityKernel::new())
//!     .fit(&Dataset::new(xt.clone(), yt))
//!     .expect("GP fitted");
//! let (mean, cov) = gp.predict(&xt).expect("GP prediction");
//! assert_eq!(mean.len(), 5);
//! assert_eq!(cov.dim(), (5, 5));
//! ```
pub use seqgp_gp as gp;
pub use seqgp_kernels as kernels;
