//! Factorization diagnostics.
//!
//! Nothing in the solve path logs on its own; callers decide when to report.

use crate::linalg::backend::NumericFactor;
use crate::settings::verbose_enabled;

/// Fill and conditioning summary of a numeric factorization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FactorDiagnostics {
    pub n: usize,
    /// Stored entries of L (including a stored unit diagonal)
    pub lnz: usize,
    /// Stored entries of U
    pub unz: usize,
    /// Smallest pivot magnitude
    pub min_pivot: f64,
    /// Largest pivot magnitude
    pub max_pivot: f64,
    /// Reciprocal condition estimate `min|u_kk| / max|u_kk|`.
    /// Cheap and only a rough guide: 0 for a zero pivot, 1 for an empty matrix.
    pub rcond: f64,
}

impl FactorDiagnostics {
    pub fn from_numeric<N: NumericFactor + ?Sized>(numeric: &N) -> Self {
        let u = numeric.upper();
        let n = numeric.dim();

        let mut min_pivot = f64::INFINITY;
        let mut max_pivot = 0.0_f64;
        for k in 0..n {
            let d = u.get(k, k).map_or(0.0, |v| v.abs());
            min_pivot = min_pivot.min(d);
            max_pivot = max_pivot.max(d);
        }

        let rcond = if n == 0 {
            min_pivot = 0.0;
            1.0
        } else if max_pivot > 0.0 {
            min_pivot / max_pivot
        } else {
            0.0
        };

        Self {
            n,
            lnz: numeric.lower().nnz(),
            unz: u.nnz(),
            min_pivot,
            max_pivot,
            rcond,
        }
    }

    /// Fill ratio `(nnz(L) + nnz(U)) / nnz(A)`.
    pub fn fill_ratio(&self, nnz_a: usize) -> f64 {
        if nnz_a == 0 {
            return 0.0;
        }
        (self.lnz + self.unz) as f64 / nnz_a as f64
    }
}

/// Report diagnostics through `log`: info level when `verbose` or
/// `SPLU_VERBOSE` is set, debug otherwise.
pub fn log_diagnostics(backend: &str, diag: &FactorDiagnostics, verbose: bool) {
    let level = if verbose || verbose_enabled() {
        log::Level::Info
    } else {
        log::Level::Debug
    };
    log::log!(
        level,
        "LU [{}] n={} | nnz(L)={} nnz(U)={} | pivots [{:.3e}, {:.3e}] | rcond={:.3e}",
        backend,
        diag.n,
        diag.lnz,
        diag.unz,
        diag.min_pivot,
        diag.max_pivot,
        diag.rcond,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::backend::FactorizationBackend;
    use crate::linalg::lu::NativeLu;
    use crate::linalg::ordering::ColumnOrdering;
    use crate::linalg::sparse::{diagonal, from_triplets};

    #[test]
    fn test_diagonal_rcond() {
        let a = diagonal(&[2.0, -8.0, 4.0]);
        let backend = NativeLu::new();
        let s = backend.analyze(&a, ColumnOrdering::Natural).unwrap();
        let f = backend.factorize(&a, &s, 1.0).unwrap();

        let diag = FactorDiagnostics::from_numeric(&f);
        assert_eq!(diag.n, 3);
        assert_eq!(diag.lnz, 3);
        assert_eq!(diag.unz, 3);
        assert_eq!(diag.min_pivot, 2.0);
        assert_eq!(diag.max_pivot, 8.0);
        assert!((diag.rcond - 0.25).abs() < 1e-15);
        assert!((diag.fill_ratio(3) - 2.0).abs() < 1e-15);
        log_diagnostics(backend.name(), &diag, true);
    }

    #[test]
    fn test_rcond_in_unit_interval() {
        let a = from_triplets(
            3,
            3,
            vec![(0, 0, 1.0), (1, 0, 5.0), (1, 1, 1e-3), (2, 2, 7.0), (0, 2, 2.0)],
        );
        let backend = NativeLu::new();
        let s = backend.analyze(&a, ColumnOrdering::ReverseCuthillMcKee).unwrap();
        let f = backend.factorize(&a, &s, 0.1).unwrap();
        let diag = FactorDiagnostics::from_numeric(&f);
        assert!(diag.rcond > 0.0 && diag.rcond <= 1.0);
    }
}
