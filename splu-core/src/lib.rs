//! SPLU: permuted sparse LU solves over swappable factorization backends
//!
//! This library wraps a sparse LU factorization service behind a small call
//! surface:
//!
//! - **Symbolic analysis**: fill-reducing column ordering (natural, reverse
//!   Cuthill-McKee, or AMD with the `suitesparse` feature)
//! - **Numeric factorization**: `A(p, q) = L U` with threshold partial
//!   pivoting, via the native left-looking backend or faer (`faer` feature)
//! - **Solve**: row permutation, forward substitution, back substitution,
//!   column permutation, all in a scratch vector
//! - **Persistence**: numeric factors saved to and loaded from disk
//! - **Labelled matrices**: rows and columns addressed by label
//!
//! # Example
//!
//! ```
//! use splu_core::linalg::sparse;
//! use splu_core::{build_numeric, build_symbolic, solve, NativeLu, SolverSettings};
//!
//! let a = sparse::from_triplets(
//!     3,
//!     3,
//!     vec![(0, 0, 4.0), (1, 0, 1.0), (0, 1, 1.0), (1, 1, 3.0), (2, 2, 2.0)],
//! );
//! let settings = SolverSettings::default();
//! let backend = NativeLu::new();
//! let symbolic = build_symbolic(&backend, &a, &settings)?;
//! let numeric = build_numeric(&backend, &a, &symbolic, &settings)?;
//!
//! let mut x = vec![0.0; 3];
//! solve(&symbolic, &numeric, 3, &[1.0, 2.0, 4.0], &mut x)?;
//! assert!((x[2] - 2.0).abs() < 1e-12);
//! # Ok::<(), splu_core::SpluError>(())
//! ```

#![warn(clippy::all)]

pub mod diagnostics;
pub mod error;
pub mod linalg;
pub mod mapped;
pub mod settings;

pub use diagnostics::{log_diagnostics, FactorDiagnostics};
pub use error::{SpluError, SpluResult};
pub use linalg::backend::{FactorizationBackend, FactorizationError, NumericFactor, SymbolicFactor};
pub use linalg::lu::{LuNumeric, LuSymbolic, NativeLu};
pub use linalg::ordering::ColumnOrdering;
pub use linalg::persist::{load_factorization, load_numeric, save_factorization, save_numeric};
pub use linalg::scratch::{HeapAllocator, ScratchAllocator, ScratchBuffer};
pub use linalg::solve::{solve, solve_in_place, solve_many, solve_with, SolveError};
pub use linalg::sparse::{matmat, matrix_vector_product, residual_norm, SparseCsc};
pub use settings::SolverSettings;

#[cfg(feature = "faer")]
pub use linalg::backends::FaerLu;

/// Symbolic analysis of `a` with the ordering from `settings`.
pub fn build_symbolic<B>(
    backend: &B,
    a: &SparseCsc,
    settings: &SolverSettings,
) -> Result<B::Symbolic, FactorizationError>
where
    B: FactorizationBackend + ?Sized,
{
    let symbolic = backend.analyze(a, settings.ordering)?;
    log::debug!(
        "{}: symbolic analysis n={} nnz={} ordering={}",
        backend.name(),
        a.rows(),
        a.nnz(),
        settings.ordering
    );
    Ok(symbolic)
}

/// Numeric factorization of `a` with the pivot tolerance from `settings`.
pub fn build_numeric<B>(
    backend: &B,
    a: &SparseCsc,
    symbolic: &B::Symbolic,
    settings: &SolverSettings,
) -> Result<B::Numeric, FactorizationError>
where
    B: FactorizationBackend + ?Sized,
{
    settings.validate()?;
    let numeric = backend.factorize(a, symbolic, settings.pivot_tolerance)?;
    log::debug!(
        "{}: numeric factorization n={} pivot_tol={}",
        backend.name(),
        numeric.dim(),
        settings.pivot_tolerance
    );
    Ok(numeric)
}
