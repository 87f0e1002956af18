//! Sparse matrix types and operations.
//!
//! Matrices are stored in CSC (Compressed Sparse Column) format, which is
//! the layout every factorization backend in this crate consumes.

use sprs::{CsMat, TriMat};
use thiserror::Error;

/// Sparse matrix in CSC format.
pub type SparseCsc = CsMat<f64>;

/// Triplet format sparse matrix builder.
pub type SparseTriMat = TriMat<f64>;

/// Errors raised by sparse matrix operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SparseError {
    /// A vector or matrix does not have the expected size.
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected length or dimension
        expected: usize,
        /// Actual length or dimension
        actual: usize,
        /// Which operand disagreed
        context: &'static str,
    },

    /// The compressed structure is inconsistent.
    #[error("Malformed sparse matrix: {0}")]
    Malformed(String),
}

/// Build a sparse CSC matrix from triplets (row, col, value).
///
/// Duplicate entries are summed.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// Build a square CSC matrix from dense row-major data, dropping zeros.
pub fn from_dense_rows(rows: &[&[f64]]) -> SparseCsc {
    let n = rows.len();
    let triplets = rows.iter().enumerate().flat_map(|(i, row)| {
        row.iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0.0)
            .map(move |(j, &v)| (i, j, v))
    });
    from_triplets(n, rows.first().map_or(0, |r| r.len()), triplets)
}

/// Create a diagonal matrix in CSC format.
pub fn diagonal(diag: &[f64]) -> SparseCsc {
    let n = diag.len();
    let triplets = diag.iter().enumerate().map(|(i, &v)| (i, i, v));
    from_triplets(n, n, triplets)
}

/// Create an identity matrix in CSC format.
pub fn identity(n: usize) -> SparseCsc {
    diagonal(&vec![1.0; n])
}

/// Check that `a` is stored column-major with a consistent structure.
pub fn check_csc(a: &SparseCsc) -> Result<(), SparseError> {
    if !a.is_csc() {
        return Err(SparseError::Malformed("expected CSC storage".to_string()));
    }
    let indptr = a.indptr();
    let col_ptr = indptr.raw_storage();
    if col_ptr.len() != a.cols() + 1 {
        return Err(SparseError::Malformed(format!(
            "column pointer length {} != ncols + 1 = {}",
            col_ptr.len(),
            a.cols() + 1
        )));
    }
    if col_ptr.windows(2).any(|w| w[0] > w[1]) {
        return Err(SparseError::Malformed(
            "column pointers are not monotone".to_string(),
        ));
    }
    if let Some(&row) = a.indices().iter().find(|&&row| row >= a.rows()) {
        return Err(SparseError::Malformed(format!(
            "row index {} out of range for {} rows",
            row,
            a.rows()
        )));
    }
    Ok(())
}

/// Accumulating sparse matrix-vector product: `y += A * x`.
///
/// Returns the actual status of the product: a malformed structure or
/// operands of the wrong length are reported, never masked.
pub fn matrix_vector_product(a: &SparseCsc, x: &[f64], y: &mut [f64]) -> Result<(), SparseError> {
    check_csc(a)?;
    if x.len() != a.cols() {
        return Err(SparseError::DimensionMismatch {
            expected: a.cols(),
            actual: x.len(),
            context: "matrix_vector_product x",
        });
    }
    if y.len() != a.rows() {
        return Err(SparseError::DimensionMismatch {
            expected: a.rows(),
            actual: y.len(),
            context: "matrix_vector_product y",
        });
    }

    for (col, col_view) in a.outer_iterator().enumerate() {
        let xj = x[col];
        for (row, &val) in col_view.iter() {
            y[row] += val * xj;
        }
    }
    Ok(())
}

/// Residual of a candidate solution of `A x = b`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    /// `||A x - b||_inf`
    pub abs: f64,
    /// `||A x - b||_inf / max(||b||_inf, 1)`
    pub rel: f64,
}

/// Compute the infinity-norm residual of `x` for `A x = b`.
pub fn residual_norm(a: &SparseCsc, x: &[f64], b: &[f64]) -> Result<Residual, SparseError> {
    if b.len() != a.rows() {
        return Err(SparseError::DimensionMismatch {
            expected: a.rows(),
            actual: b.len(),
            context: "residual b",
        });
    }
    let mut r: Vec<f64> = b.iter().map(|v| -v).collect();
    matrix_vector_product(a, x, &mut r)?;

    let abs = r.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let b_norm = b.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    Ok(Residual {
        abs,
        rel: abs / b_norm.max(1.0),
    })
}

/// Transpose of a CSC matrix, returned in CSC storage.
pub fn transpose(a: &SparseCsc) -> SparseCsc {
    a.transpose_view().to_csc()
}

/// Nonzero pattern of `A + A^T` with magnitudes, so values never cancel.
///
/// Orderings that need a symmetric structure run on this matrix.
pub fn symmetric_pattern(a: &SparseCsc) -> SparseCsc {
    let n = a.rows().max(a.cols());
    let mut tri = TriMat::with_capacity((n, n), 2 * a.nnz());
    for (val, (row, col)) in a.iter() {
        let mag = val.abs().max(1.0);
        tri.add_triplet(row, col, mag);
        if row != col {
            tri.add_triplet(col, row, mag);
        }
    }
    tri.to_csc()
}

/// Relabel rows and columns: entry `(i, j)` of `a` moves to
/// `(row_map[i], col_map[j])`.
pub fn permute(
    a: &SparseCsc,
    row_map: &[usize],
    col_map: &[usize],
) -> Result<SparseCsc, SparseError> {
    if row_map.len() != a.rows() {
        return Err(SparseError::DimensionMismatch {
            expected: a.rows(),
            actual: row_map.len(),
            context: "permute row_map",
        });
    }
    if col_map.len() != a.cols() {
        return Err(SparseError::DimensionMismatch {
            expected: a.cols(),
            actual: col_map.len(),
            context: "permute col_map",
        });
    }
    if !is_permutation(row_map) || !is_permutation(col_map) {
        return Err(SparseError::Malformed(
            "relabelling maps must be permutations".to_string(),
        ));
    }
    let triplets = a
        .iter()
        .map(|(&val, (row, col))| (row_map[row], col_map[col], val));
    Ok(from_triplets(a.rows(), a.cols(), triplets))
}

/// Sparse matrix product `A * B`.
pub fn matmat(a: &SparseCsc, b: &SparseCsc) -> Result<SparseCsc, SparseError> {
    if a.cols() != b.rows() {
        return Err(SparseError::DimensionMismatch {
            expected: a.cols(),
            actual: b.rows(),
            context: "matmat inner dimension",
        });
    }
    check_csc(a)?;
    check_csc(b)?;
    let product: SparseCsc = a * b;
    Ok(product)
}

/// True when `p` holds each of `0..p.len()` exactly once.
pub fn is_permutation(p: &[usize]) -> bool {
    let mut seen = vec![false; p.len()];
    for &i in p {
        if i >= p.len() || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}

/// Inverse of a permutation vector.
pub fn invert_permutation(p: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; p.len()];
    for (k, &i) in p.iter().enumerate() {
        inv[i] = k;
    }
    inv
}

/// Assemble an `n x n` CSC matrix from column-wise arrays whose row indices
/// may be in any order inside a column.
///
/// Columns are sorted by row index, which is the layout `sprs` requires.
pub(crate) fn csc_from_unsorted(
    n: usize,
    col_ptr: Vec<usize>,
    mut row_idx: Vec<usize>,
    mut values: Vec<f64>,
) -> Result<SparseCsc, SparseError> {
    if col_ptr.len() != n + 1 || col_ptr[0] != 0 {
        return Err(SparseError::Malformed(format!(
            "column pointer array of length {} for n = {}",
            col_ptr.len(),
            n
        )));
    }
    if col_ptr.windows(2).any(|w| w[0] > w[1]) || col_ptr[n] != row_idx.len() {
        return Err(SparseError::Malformed(
            "column pointers are not monotone or do not cover the entries".to_string(),
        ));
    }
    if row_idx.len() != values.len() {
        return Err(SparseError::Malformed(format!(
            "{} row indices but {} values",
            row_idx.len(),
            values.len()
        )));
    }

    let mut pairs: Vec<(usize, f64)> = Vec::new();
    for j in 0..n {
        let (start, end) = (col_ptr[j], col_ptr[j + 1]);
        pairs.clear();
        pairs.extend(
            row_idx[start..end]
                .iter()
                .copied()
                .zip(values[start..end].iter().copied()),
        );
        pairs.sort_unstable_by_key(|&(row, _)| row);
        for (w, pair) in pairs.windows(2).enumerate() {
            if pair[0].0 == pair[1].0 {
                return Err(SparseError::Malformed(format!(
                    "duplicate row index {} in column {} (entry {})",
                    pair[0].0,
                    j,
                    start + w
                )));
            }
        }
        if let Some(&(row, _)) = pairs.last() {
            if row >= n {
                return Err(SparseError::Malformed(format!(
                    "row index {} out of range in column {}",
                    row, j
                )));
            }
        }
        for (offset, &(row, val)) in pairs.iter().enumerate() {
            row_idx[start + offset] = row;
            values[start + offset] = val;
        }
    }

    Ok(CsMat::new_csc((n, n), col_ptr, row_idx, values))
}
