//! Fill-reducing column orderings.
//!
//! An ordering produces the column permutation `q` of a symbolic analysis:
//! `q[k] = j` means original column `j` is eliminated `k`-th. Every ordering
//! except `Natural` works on the symmetric pattern of `A + A^T`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sparse::{self, SparseCsc};

/// Column ordering strategy used by symbolic analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColumnOrdering {
    /// No reordering (identity permutation).
    Natural,
    /// Reverse Cuthill-McKee on `A + A^T` (bandwidth reduction, always available).
    #[default]
    ReverseCuthillMcKee,
    /// Approximate Minimum Degree on `A + A^T` (requires the `suitesparse` feature).
    Amd,
}

/// Ordering errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderingError {
    /// The ordering was not compiled into this build.
    #[error("Ordering {0} is not available in this build")]
    Unavailable(ColumnOrdering),

    /// The underlying ordering routine failed.
    #[error("Ordering failed: {0}")]
    Failed(String),

    /// The routine returned something that is not a permutation of `0..n`.
    #[error("Ordering returned an invalid permutation of length {len} for n = {n}")]
    InvalidPermutation {
        /// Matrix dimension
        n: usize,
        /// Length of the returned vector
        len: usize,
    },

    /// The name given in a configuration string is unknown.
    #[error("Unknown ordering '{0}' (expected natural, rcm or amd)")]
    UnknownName(String),
}

impl fmt::Display for ColumnOrdering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnOrdering::Natural => "natural",
            ColumnOrdering::ReverseCuthillMcKee => "rcm",
            ColumnOrdering::Amd => "amd",
        };
        f.write_str(name)
    }
}

impl FromStr for ColumnOrdering {
    type Err = OrderingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "natural" | "none" => Ok(ColumnOrdering::Natural),
            "rcm" | "reverse-cuthill-mckee" => Ok(ColumnOrdering::ReverseCuthillMcKee),
            "amd" => Ok(ColumnOrdering::Amd),
            other => Err(OrderingError::UnknownName(other.to_string())),
        }
    }
}

/// Compute the column permutation of a square matrix.
pub fn column_permutation(
    a: &SparseCsc,
    ordering: ColumnOrdering,
) -> Result<Vec<usize>, OrderingError> {
    let n = a.cols();
    let q = match ordering {
        ColumnOrdering::Natural => (0..n).collect(),
        ColumnOrdering::ReverseCuthillMcKee => rcm_permutation(a),
        ColumnOrdering::Amd => amd_permutation(a)?,
    };

    if q.len() != n || !sparse::is_permutation(&q) {
        return Err(OrderingError::InvalidPermutation { n, len: q.len() });
    }
    Ok(q)
}

fn rcm_permutation(a: &SparseCsc) -> Vec<usize> {
    if a.cols() == 0 {
        return Vec::new();
    }
    let pattern = sparse::symmetric_pattern(a);
    let ordering = sprs::linalg::reverse_cuthill_mckee(pattern.view());
    ordering.perm.vec()
}

#[cfg(feature = "suitesparse")]
fn amd_permutation(a: &SparseCsc) -> Result<Vec<usize>, OrderingError> {
    use sprs_suitesparse_camd::try_camd;

    if a.cols() == 0 {
        return Ok(Vec::new());
    }
    let pattern = sparse::symmetric_pattern(a);
    let perm = try_camd(pattern.structure_view())
        .map_err(|e| OrderingError::Failed(e.to_string()))?;
    Ok(perm.vec())
}

#[cfg(not(feature = "suitesparse"))]
fn amd_permutation(_a: &SparseCsc) -> Result<Vec<usize>, OrderingError> {
    Err(OrderingError::Unavailable(ColumnOrdering::Amd))
}
