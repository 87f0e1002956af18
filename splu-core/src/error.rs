//! Error types.

use thiserror::Error;

pub use crate::linalg::backend::FactorizationError;
pub use crate::linalg::ordering::OrderingError;
pub use crate::linalg::persist::PersistError;
pub use crate::linalg::solve::SolveError;
pub use crate::linalg::sparse::SparseError;

/// Any error raised by this crate.
#[derive(Error, Debug)]
pub enum SpluError {
    #[error(transparent)]
    Sparse(#[from] SparseError),

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Factorization(#[from] FactorizationError),

    #[error(transparent)]
    Solve(#[from] SolveError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    /// A labelled matrix was solved before `factorize`
    #[error("Matrix has not been factorized")]
    NotFactorized,

    /// A label is not present in the matrix or vector mapping
    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    /// Two labelled operands do not share the same label mapping
    #[error("Label mismatch: {0}")]
    LabelMismatch(String),
}

/// Result type for crate operations.
pub type SpluResult<T> = Result<T, SpluError>;
