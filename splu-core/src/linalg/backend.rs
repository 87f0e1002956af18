//! Factorization service seam.
//!
//! A backend turns a sparse matrix into a symbolic analysis (column
//! ordering) and a numeric factorization (`L`, `U`, row pivots). The solve
//! pipeline only sees the factor views defined here, so backends can be
//! swapped without touching it.

use thiserror::Error;

use super::ordering::{ColumnOrdering, OrderingError};
use super::sparse::{SparseCsc, SparseError};

#[derive(Debug, Error)]
pub enum FactorizationError {
    #[error("Matrix must be square, got {nrows}x{ncols}")]
    NotSquare { nrows: usize, ncols: usize },

    /// No candidate pivot exists in this column of the reordered matrix.
    #[error("Matrix is structurally singular: no pivot candidate in column {column}")]
    StructurallySingular { column: usize },

    /// Every candidate pivot in this column is zero.
    #[error("Matrix is numerically singular: zero pivot in column {column}")]
    NumericallySingular { column: usize },

    #[error("Invalid pivot tolerance {0}: must lie in (0, 1]")]
    InvalidPivotTolerance(f64),

    #[error("Dimension mismatch: symbolic analysis is for n = {expected}, matrix has n = {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Sparse(#[from] SparseError),

    #[error("{0}")]
    Backend(String),
}

/// Result of symbolic analysis.
pub trait SymbolicFactor {
    /// Dimension of the analysed matrix.
    fn dim(&self) -> usize;

    /// Column permutation `q`: column `q[k]` of `A` is the `k`-th pivot column.
    fn column_permutation(&self) -> &[usize];
}

/// Result of numeric factorization, `A(pinv, q) = L U` in permuted order.
pub trait NumericFactor {
    fn dim(&self) -> usize;

    /// Inverse row permutation: row `i` of `A` is the `pinv[i]`-th pivot row.
    fn row_permutation_inverse(&self) -> &[usize];

    /// Lower triangular factor. A missing diagonal entry means a unit diagonal.
    fn lower(&self) -> &SparseCsc;

    /// Upper triangular factor with an explicit diagonal.
    fn upper(&self) -> &SparseCsc;
}

/// A sparse LU factorization service.
pub trait FactorizationBackend {
    type Symbolic: SymbolicFactor;
    type Numeric: NumericFactor;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Compute the column ordering for the sparsity pattern of `a`.
    fn analyze(
        &self,
        a: &SparseCsc,
        ordering: ColumnOrdering,
    ) -> Result<Self::Symbolic, FactorizationError>;

    /// Compute `L`, `U` and row pivots for the values of `a`.
    ///
    /// `pivot_tolerance` in `(0, 1]`: the diagonal candidate is kept as pivot
    /// when its magnitude is at least `pivot_tolerance` times the largest
    /// candidate in its column.
    fn factorize(
        &self,
        a: &SparseCsc,
        symbolic: &Self::Symbolic,
        pivot_tolerance: f64,
    ) -> Result<Self::Numeric, FactorizationError>;
}

pub(crate) fn check_square(a: &SparseCsc) -> Result<usize, FactorizationError> {
    if a.rows() != a.cols() {
        return Err(FactorizationError::NotSquare {
            nrows: a.rows(),
            ncols: a.cols(),
        });
    }
    Ok(a.rows())
}

pub(crate) fn check_pivot_tolerance(tol: f64) -> Result<(), FactorizationError> {
    if !(tol > 0.0 && tol <= 1.0) {
        return Err(FactorizationError::InvalidPivotTolerance(tol));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::from_triplets;

    #[test]
    fn test_check_square() {
        let a = from_triplets(2, 3, vec![(0, 0, 1.0)]);
        assert!(matches!(
            check_square(&a),
            Err(FactorizationError::NotSquare { nrows: 2, ncols: 3 })
        ));
        assert_eq!(check_square(&from_triplets(3, 3, vec![])).unwrap(), 3);
    }

    #[test]
    fn test_check_pivot_tolerance() {
        assert!(check_pivot_tolerance(1.0).is_ok());
        assert!(check_pivot_tolerance(1e-12).is_ok());
        assert!(check_pivot_tolerance(0.0).is_err());
        assert!(check_pivot_tolerance(1.5).is_err());
        assert!(check_pivot_tolerance(f64::NAN).is_err());
    }
}
