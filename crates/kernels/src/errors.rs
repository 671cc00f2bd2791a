use thiserror::Error;

/// A result type for kernel construction
pub type Result<T> = std::result::Result<T, KernelError>;

/// An error when building a [`Kernel`](crate::Kernel)
#[derive(Error, Debug)]
pub enum KernelError {
    /// When a kernel is given an inconsistent definition
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
