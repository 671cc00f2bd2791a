//! Covariance functions over encoded biological sequences.
//!
//! An encoded set of sequences is a `(n, L)` matrix: one row per sequence,
//! one column per position. A [Kernel] maps two such matrices plus a vector of
//! hyperparameters to a `(na, nb)` covariance matrix and knows nothing about
//! optimization or inference.
//!
//! The following kernels are implemented:
//! * [IdentityKernel]: number of positions holding the same symbol,
//! * [ContactKernel]: number of shared structural contact terms,
//! * [LinearKernel]: dot product of numeric feature rows.
//!
//! Every kernel is scaled by a single variance hyperparameter.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod contact;
mod errors;
mod identity;
mod kernel;
mod linear;

pub use contact::*;
pub use errors::*;
pub use identity::*;
pub use kernel::*;
pub use linear::*;
