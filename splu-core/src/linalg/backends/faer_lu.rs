//! faer simplicial LU backend.
//!
//! COLAMD column ordering and left-looking simplicial LU from faer. The
//! factors are copied back into `sprs` storage so the regular solve pipeline
//! and persistence work on them unchanged.

use faer::dyn_stack::{MemBuffer, MemStack};
use faer::perm::Perm;
use faer::sparse::linalg::lu::simplicial::{self, SimplicialLu};
use faer::sparse::linalg::{colamd, LuError};
use faer::sparse::{SparseColMatRef, SymbolicSparseColMatRef};

use crate::linalg::backend::{
    check_pivot_tolerance, check_square, FactorizationBackend, FactorizationError, SymbolicFactor,
};
use crate::linalg::lu::{LuNumeric, LuSymbolic};
use crate::linalg::ordering::ColumnOrdering;
use crate::linalg::sparse::{self, SparseCsc};

/// faer-backed LU. Pivoting is plain partial pivoting; the pivot tolerance is
/// validated but otherwise unused.
#[derive(Debug, Default, Clone, Copy)]
pub struct FaerLu;

impl FaerLu {
    pub fn new() -> Self {
        Self
    }
}

fn symbolic_view(
    a: &SparseCsc,
) -> Result<SymbolicSparseColMatRef<'_, usize>, FactorizationError> {
    let col_ptr = a.indptr().raw_storage();
    SymbolicSparseColMatRef::new_checked(a.rows(), a.cols(), col_ptr, None, a.indices())
        .map_err(|e| {
            FactorizationError::Backend(format!("faer rejected matrix structure: {:?}", e))
        })
}

/// Copy a faer factor with possibly unsorted columns into `sprs` storage.
fn to_csc(
    n: usize,
    factor: SparseColMatRef<'_, usize, f64>,
    unit_diagonal: bool,
) -> Result<SparseCsc, FactorizationError> {
    let col_ptr = factor.symbolic().col_ptr();
    let row_idx = factor.symbolic().row_idx();
    let values = factor.val();

    let mut p = Vec::with_capacity(n + 1);
    let mut rows = Vec::with_capacity(col_ptr[n]);
    let mut vals = Vec::with_capacity(col_ptr[n]);
    p.push(0);
    for j in 0..n {
        if unit_diagonal {
            rows.push(j);
            vals.push(1.0);
        }
        for k in col_ptr[j]..col_ptr[j + 1] {
            if unit_diagonal && row_idx[k] == j {
                continue;
            }
            rows.push(row_idx[k]);
            vals.push(values[k]);
        }
        p.push(rows.len());
    }
    Ok(sparse::csc_from_unsorted(n, p, rows, vals)?)
}

impl FactorizationBackend for FaerLu {
    type Symbolic = LuSymbolic;
    type Numeric = LuNumeric;

    fn name(&self) -> &'static str {
        "faer"
    }

    /// `Natural` keeps the identity; every other ordering runs COLAMD.
    fn analyze(
        &self,
        a: &SparseCsc,
        ordering: ColumnOrdering,
    ) -> Result<LuSymbolic, FactorizationError> {
        let n = check_square(a)?;
        sparse::check_csc(a)?;
        if ordering == ColumnOrdering::Natural || n == 0 {
            return LuSymbolic::from_permutation((0..n).collect(), ordering);
        }

        let mut perm = vec![0usize; n];
        let mut perm_inv = vec![0usize; n];
        let scratch = colamd::order_scratch::<usize>(n, n, a.nnz());
        let mut mem = MemBuffer::try_new(scratch).map_err(|_| {
            FactorizationError::Backend("failed to allocate COLAMD workspace".to_string())
        })?;
        colamd::order(
            &mut perm,
            &mut perm_inv,
            symbolic_view(a)?,
            colamd::Control::default(),
            MemStack::new(&mut mem),
        )
        .map_err(|e| FactorizationError::Backend(format!("COLAMD ordering failed: {:?}", e)))?;

        LuSymbolic::from_permutation(perm, ordering)
    }

    fn factorize(
        &self,
        a: &SparseCsc,
        symbolic: &LuSymbolic,
        pivot_tolerance: f64,
    ) -> Result<LuNumeric, FactorizationError> {
        let n = check_square(a)?;
        sparse::check_csc(a)?;
        check_pivot_tolerance(pivot_tolerance)?;
        if symbolic.dim() != n {
            return Err(FactorizationError::DimensionMismatch {
                expected: symbolic.dim(),
                actual: n,
            });
        }

        let q = symbolic.column_permutation();
        // SAFETY: q was validated as a permutation when the analysis was built.
        let col_perm = unsafe {
            Perm::new_unchecked(
                q.to_vec().into_boxed_slice(),
                sparse::invert_permutation(q).into_boxed_slice(),
            )
        };

        let mut row_perm = vec![0usize; n];
        let mut row_perm_inv = vec![0usize; n];
        let mut lu = SimplicialLu::<usize, f64>::new();
        let scratch = simplicial::factorize_simplicial_numeric_lu_scratch::<usize, f64>(n, n);
        let mut mem = MemBuffer::try_new(scratch).map_err(|_| {
            FactorizationError::Backend("failed to allocate LU workspace".to_string())
        })?;
        let mut stack = MemStack::new(&mut mem);

        let mat = SparseColMatRef::new(symbolic_view(a)?, a.data());
        simplicial::factorize_simplicial_numeric_lu::<usize, f64>(
            &mut row_perm,
            &mut row_perm_inv,
            &mut lu,
            mat,
            col_perm.as_ref(),
            &mut stack,
        )
        .map_err(|e| match e {
            LuError::SymbolicSingular { index } => {
                FactorizationError::StructurallySingular { column: index }
            }
            other => FactorizationError::Backend(format!("faer LU failed: {:?}", other)),
        })?;

        let l = to_csc(n, lu.l_factor_unsorted(), true)?;
        let u = to_csc(n, lu.u_factor_unsorted(), false)?;
        for k in 0..n {
            if u.get(k, k).map_or(true, |&d| d == 0.0) {
                return Err(FactorizationError::NumericallySingular { column: k });
            }
        }

        LuNumeric::from_parts(row_perm_inv, l, u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::lu::NativeLu;
    use crate::linalg::solve::solve;
    use crate::linalg::sparse::{from_triplets, residual_norm};

    fn tridiagonal(n: usize) -> SparseCsc {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 4.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -2.0));
            }
        }
        from_triplets(n, n, triplets)
    }

    #[test]
    fn test_faer_solve_matches_native() {
        let a = tridiagonal(12);
        let b: Vec<f64> = (0..12).map(|i| (i + 1) as f64).collect();

        let faer = FaerLu::new();
        let s = faer.analyze(&a, ColumnOrdering::ReverseCuthillMcKee).unwrap();
        let f = faer.factorize(&a, &s, 1.0).unwrap();
        let mut x_faer = vec![0.0; 12];
        solve(&s, &f, 12, &b, &mut x_faer).unwrap();

        let native = NativeLu::new();
        let s = native.analyze(&a, ColumnOrdering::Natural).unwrap();
        let f = native.factorize(&a, &s, 1.0).unwrap();
        let mut x_native = vec![0.0; 12];
        solve(&s, &f, 12, &b, &mut x_native).unwrap();

        assert!(residual_norm(&a, &x_faer, &b).unwrap().rel < 1e-12);
        for (x, y) in x_faer.iter().zip(&x_native) {
            assert!((x - y).abs() < 1e-10);
        }
    }

    #[test]
    fn test_faer_structurally_singular() {
        let a = from_triplets(3, 3, vec![(0, 0, 1.0), (1, 2, 1.0), (2, 2, 1.0)]);
        let faer = FaerLu::new();
        let s = faer.analyze(&a, ColumnOrdering::Natural).unwrap();
        assert!(faer.factorize(&a, &s, 1.0).is_err());
    }
}
