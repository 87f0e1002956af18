//! Sparse solve orchestrator.
//!
//! Given a symbolic analysis and numeric factorization with
//! `A(p, q) = L U`, a solve of `A x = b` is always the same four steps:
//!
//! 1. `y[pinv[i]] = b[i]` (row pivoting)
//! 2. `L y' = y` (forward substitution)
//! 3. `U z = y'` (back substitution)
//! 4. `x[q[k]] = z[k]` (back to the caller's column order)
//!
//! All intermediate work happens in a scratch vector; the output slice is
//! only written after the triangular solves succeed, so every error leaves it
//! untouched.

use thiserror::Error;

use super::backend::{NumericFactor, SymbolicFactor};
use super::scratch::{HeapAllocator, ScratchAllocator, ScratchBuffer};
use super::sparse::SparseCsc;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("Could not allocate scratch vector of length {len}")]
    AllocationFailure { len: usize },

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: &'static str,
    },

    #[error("Malformed factorization: {0}")]
    MalformedFactor(String),
}

fn check_len(expected: usize, actual: usize, context: &'static str) -> Result<(), SolveError> {
    if expected != actual {
        return Err(SolveError::DimensionMismatch {
            expected,
            actual,
            context,
        });
    }
    Ok(())
}

fn check_factor(name: &str, m: &SparseCsc, n: usize) -> Result<(), SolveError> {
    if m.shape() != (n, n) {
        return Err(SolveError::MalformedFactor(format!(
            "{} has shape {:?}, expected ({}, {})",
            name,
            m.shape(),
            n,
            n
        )));
    }
    if !m.is_csc() {
        return Err(SolveError::MalformedFactor(format!("{} is not stored column-major", name)));
    }
    Ok(())
}

fn check_indices(name: &str, perm: &[usize], n: usize) -> Result<(), SolveError> {
    if let Some(&bad) = perm.iter().find(|&&i| i >= n) {
        return Err(SolveError::MalformedFactor(format!(
            "{} entry {} out of range for n = {}",
            name, bad, n
        )));
    }
    Ok(())
}

/// Validate every length involved in a solve of dimension `n`.
fn check_dimensions<S, N>(symbolic: &S, numeric: &N, n: usize) -> Result<(), SolveError>
where
    S: SymbolicFactor + ?Sized,
    N: NumericFactor + ?Sized,
{
    check_len(n, symbolic.dim(), "symbolic analysis")?;
    check_len(n, numeric.dim(), "numeric factorization")?;

    let q = symbolic.column_permutation();
    let pinv = numeric.row_permutation_inverse();
    check_len(n, q.len(), "column permutation")?;
    check_len(n, pinv.len(), "row permutation")?;
    check_indices("column permutation", q, n)?;
    check_indices("row permutation", pinv, n)?;

    check_factor("L", numeric.lower(), n)?;
    check_factor("U", numeric.upper(), n)?;
    Ok(())
}

/// Solve `L x = b` in place. A column without a stored diagonal is taken to
/// have a unit diagonal.
fn lower_solve(l: &SparseCsc, x: &mut [f64]) -> Result<(), SolveError> {
    for (j, col) in l.outer_iterator().enumerate() {
        let mut diag = 1.0;
        for (row, &val) in col.iter() {
            if row < j {
                return Err(SolveError::MalformedFactor(format!(
                    "L has an entry above the diagonal at ({}, {})",
                    row, j
                )));
            }
            if row == j {
                diag = val;
            }
        }
        if diag == 0.0 {
            return Err(SolveError::MalformedFactor(format!(
                "L has a zero diagonal in column {}",
                j
            )));
        }
        x[j] /= diag;
        let xj = x[j];
        for (row, &val) in col.iter() {
            if row > j {
                x[row] -= val * xj;
            }
        }
    }
    Ok(())
}

/// Solve `U x = b` in place.
fn upper_solve(u: &SparseCsc, x: &mut [f64]) -> Result<(), SolveError> {
    for j in (0..u.cols()).rev() {
        let col = match u.outer_view(j) {
            Some(col) => col,
            None => continue,
        };
        let mut diag = None;
        for (row, &val) in col.iter() {
            if row > j {
                return Err(SolveError::MalformedFactor(format!(
                    "U has an entry below the diagonal at ({}, {})",
                    row, j
                )));
            }
            if row == j {
                diag = Some(val);
            }
        }
        match diag {
            Some(d) if d != 0.0 => x[j] /= d,
            _ => {
                return Err(SolveError::MalformedFactor(format!(
                    "U has a missing or zero diagonal in column {}",
                    j
                )))
            }
        }
        let xj = x[j];
        for (row, &val) in col.iter() {
            if row < j {
                x[row] -= val * xj;
            }
        }
    }
    Ok(())
}

/// Steps 1-3 of the pipeline. Returns the solution in pivot column order.
fn permuted_solve<A, S, N>(
    allocator: &A,
    symbolic: &S,
    numeric: &N,
    n: usize,
    rhs: &[f64],
) -> Result<ScratchBuffer, SolveError>
where
    A: ScratchAllocator + ?Sized,
    S: SymbolicFactor + ?Sized,
    N: NumericFactor + ?Sized,
{
    check_dimensions(symbolic, numeric, n)?;
    check_len(n, rhs.len(), "right-hand side")?;

    let mut work = allocator
        .allocate(n)
        .map_err(|e| SolveError::AllocationFailure { len: e.len })?;
    check_len(n, work.len(), "scratch vector")?;

    for (&pi, &bi) in numeric.row_permutation_inverse().iter().zip(rhs) {
        work[pi] = bi;
    }
    lower_solve(numeric.lower(), &mut work)?;
    upper_solve(numeric.upper(), &mut work)?;
    Ok(work)
}

/// Step 4: `out[q[k]] = z[k]`.
fn scatter(q: &[usize], z: &[f64], out: &mut [f64]) {
    for (&qk, &zk) in q.iter().zip(z) {
        out[qk] = zk;
    }
}

/// Solve `A x = rhs` into `out` using heap scratch.
pub fn solve<S, N>(
    symbolic: &S,
    numeric: &N,
    n: usize,
    rhs: &[f64],
    out: &mut [f64],
) -> Result<(), SolveError>
where
    S: SymbolicFactor + ?Sized,
    N: NumericFactor + ?Sized,
{
    solve_with(&HeapAllocator, symbolic, numeric, n, rhs, out)
}

/// Solve `A x = rhs` into `out`, taking scratch from `allocator`.
///
/// On error `out` is left exactly as it was.
pub fn solve_with<A, S, N>(
    allocator: &A,
    symbolic: &S,
    numeric: &N,
    n: usize,
    rhs: &[f64],
    out: &mut [f64],
) -> Result<(), SolveError>
where
    A: ScratchAllocator + ?Sized,
    S: SymbolicFactor + ?Sized,
    N: NumericFactor + ?Sized,
{
    check_len(n, out.len(), "output vector")?;
    let z = permuted_solve(allocator, symbolic, numeric, n, rhs)?;
    scatter(symbolic.column_permutation(), &z, out);
    Ok(())
}

/// Solve `A x = b`, overwriting `b` with `x`.
pub fn solve_in_place<S, N>(symbolic: &S, numeric: &N, b: &mut [f64]) -> Result<(), SolveError>
where
    S: SymbolicFactor + ?Sized,
    N: NumericFactor + ?Sized,
{
    let z = permuted_solve(&HeapAllocator, symbolic, numeric, b.len(), b)?;
    scatter(symbolic.column_permutation(), &z, b);
    Ok(())
}

/// Solve against several right-hand sides, one scratch vector per solve.
pub fn solve_many<S, N, R>(
    symbolic: &S,
    numeric: &N,
    rhs: &[R],
) -> Result<Vec<Vec<f64>>, SolveError>
where
    S: SymbolicFactor + ?Sized,
    N: NumericFactor + ?Sized,
    R: AsRef<[f64]>,
{
    let n = numeric.dim();
    rhs.iter()
        .map(|b| {
            let mut x = vec![0.0; n];
            solve(symbolic, numeric, n, b.as_ref(), &mut x)?;
            Ok(x)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::backend::FactorizationBackend;
    use crate::linalg::lu::NativeLu;
    use crate::linalg::ordering::ColumnOrdering;
    use crate::linalg::scratch::ScratchUnavailable;
    use crate::linalg::sparse::{from_dense_rows, from_triplets, identity};

    /// Hand-built factors, so the pipeline is tested apart from any backend.
    struct Factors {
        q: Vec<usize>,
        pinv: Vec<usize>,
        l: SparseCsc,
        u: SparseCsc,
    }

    impl SymbolicFactor for Factors {
        fn dim(&self) -> usize {
            self.q.len()
        }
        fn column_permutation(&self) -> &[usize] {
            &self.q
        }
    }

    impl NumericFactor for Factors {
        fn dim(&self) -> usize {
            self.pinv.len()
        }
        fn row_permutation_inverse(&self) -> &[usize] {
            &self.pinv
        }
        fn lower(&self) -> &SparseCsc {
            &self.l
        }
        fn upper(&self) -> &SparseCsc {
            &self.u
        }
    }

    fn swapped_2x2() -> Factors {
        Factors {
            q: vec![1, 0],
            pinv: vec![1, 0],
            // Unit diagonal left implicit.
            l: from_triplets(2, 2, vec![(1, 0, 0.5)]),
            u: from_triplets(2, 2, vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 4.0)]),
        }
    }

    struct FailingAllocator;

    impl ScratchAllocator for FailingAllocator {
        fn allocate(&self, len: usize) -> Result<ScratchBuffer, ScratchUnavailable> {
            Err(ScratchUnavailable { len })
        }
    }

    #[test]
    fn test_pipeline_order() {
        let f = swapped_2x2();
        let mut x = vec![0.0; 2];
        solve(&f, &f, 2, &[4.0, 2.0], &mut x).unwrap();
        assert!((x[0] - 0.75).abs() < 1e-15);
        assert!((x[1] - 0.625).abs() < 1e-15);
    }

    #[test]
    fn test_identity_factors() {
        let f = Factors {
            q: vec![0, 1, 2],
            pinv: vec![0, 1, 2],
            l: identity(3),
            u: identity(3),
        };
        let b = [3.0, -1.0, 0.5];
        let mut x = vec![0.0; 3];
        solve(&f, &f, 3, &b, &mut x).unwrap();
        assert_eq!(x, b);
    }

    #[test]
    fn test_three_by_three_scenario() {
        let a = from_dense_rows(&[&[4.0, 1.0, 0.0], &[1.0, 3.0, 0.0], &[0.0, 0.0, 2.0]]);
        let backend = NativeLu::new();
        let symbolic = backend.analyze(&a, ColumnOrdering::Natural).unwrap();
        let numeric = backend.factorize(&a, &symbolic, 1.0).unwrap();

        let mut x = vec![0.0; 3];
        solve(&symbolic, &numeric, 3, &[1.0, 2.0, 4.0], &mut x).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
        assert!((x[2] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rhs_not_modified() {
        let f = swapped_2x2();
        let b = vec![4.0, 2.0];
        let copy = b.clone();
        let mut x = vec![0.0; 2];
        solve(&f, &f, 2, &b, &mut x).unwrap();
        assert_eq!(b, copy);
    }

    #[test]
    fn test_allocation_failure_leaves_output() {
        let f = swapped_2x2();
        let mut x = vec![7.0, -3.0];
        let err = solve_with(&FailingAllocator, &f, &f, 2, &[4.0, 2.0], &mut x).unwrap_err();
        assert_eq!(err, SolveError::AllocationFailure { len: 2 });
        assert_eq!(x[0].to_bits(), 7.0f64.to_bits());
        assert_eq!(x[1].to_bits(), (-3.0f64).to_bits());
    }

    #[test]
    fn test_dimension_mismatch() {
        let f = swapped_2x2();
        let mut x = vec![0.0; 3];
        assert!(matches!(
            solve(&f, &f, 2, &[1.0, 2.0], &mut x),
            Err(SolveError::DimensionMismatch { context: "output vector", .. })
        ));
        let mut x = vec![0.0; 2];
        assert!(matches!(
            solve(&f, &f, 2, &[1.0], &mut x),
            Err(SolveError::DimensionMismatch { context: "right-hand side", .. })
        ));
        assert!(matches!(
            solve(&f, &f, 3, &[1.0, 2.0, 3.0], &mut [0.0; 3]),
            Err(SolveError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_malformed_factors_rejected() {
        let mut f = swapped_2x2();
        f.u = from_triplets(2, 2, vec![(0, 0, 2.0), (1, 1, 0.0)]);
        let mut x = vec![1.0, 1.0];
        assert!(matches!(
            solve(&f, &f, 2, &[1.0, 1.0], &mut x),
            Err(SolveError::MalformedFactor(_))
        ));
        assert_eq!(x, vec![1.0, 1.0]);

        let mut f = swapped_2x2();
        f.l = from_triplets(2, 2, vec![(0, 1, 0.5)]);
        assert!(matches!(
            solve(&f, &f, 2, &[1.0, 1.0], &mut x),
            Err(SolveError::MalformedFactor(_))
        ));

        let mut f = swapped_2x2();
        f.pinv = vec![0, 2];
        assert!(matches!(
            solve(&f, &f, 2, &[1.0, 1.0], &mut x),
            Err(SolveError::MalformedFactor(_))
        ));
    }

    #[test]
    fn test_solve_in_place_and_many() {
        let f = swapped_2x2();
        let mut b = vec![4.0, 2.0];
        solve_in_place(&f, &f, &mut b).unwrap();
        assert!((b[0] - 0.75).abs() < 1e-15);

        let xs = solve_many(&f, &f, &[vec![4.0, 2.0], vec![0.0, 0.0]]).unwrap();
        assert_eq!(xs.len(), 2);
        assert!((xs[0][1] - 0.625).abs() < 1e-15);
        assert_eq!(xs[1], vec![0.0, 0.0]);
    }

    #[test]
    fn test_empty_system() {
        let f = Factors {
            q: vec![],
            pinv: vec![],
            l: identity(0),
            u: identity(0),
        };
        let mut x: Vec<f64> = vec![];
        solve(&f, &f, 0, &[], &mut x).unwrap();
    }
}
