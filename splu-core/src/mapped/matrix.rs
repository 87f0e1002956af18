use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::sync::Arc;

use bimap::BiHashMap;
use serde::{Deserialize, Serialize};

use super::vector::MappedVector;
use super::LabelMap;
use crate::diagnostics::FactorDiagnostics;
use crate::error::{SpluError, SpluResult};
use crate::linalg::backend::{FactorizationBackend, FactorizationError, NumericFactor};
use crate::linalg::lu::{LuNumeric, LuSymbolic};
use crate::linalg::persist;
use crate::linalg::solve::solve;
use crate::linalg::sparse::{self, SparseCsc, SparseTriMat};
use crate::settings::SolverSettings;
use crate::{build_numeric, build_symbolic};

/// Builder for [`MappedMatrix`].
///
/// Labels receive indices in the order they are first seen, either through
/// `add_row`/`add_col` or through `add_triplet`.
///
/// ```
/// use splu_core::mapped::MappedMatrixBuilder;
///
/// let mut builder = MappedMatrixBuilder::new();
/// builder.add_triplet("a", "c", 1.0);
/// builder.add_triplet("a", "d", 2.0);
/// builder.add_triplet("b", "c", -0.1);
/// builder.add_triplet("b", "d", 3.0);
/// let m = builder.build();
/// assert_eq!((m.nrows(), m.ncols()), (2, 2));
/// ```
#[derive(Debug, Clone)]
pub struct MappedMatrixBuilder<R, C>
where
    R: Eq + Hash,
    C: Eq + Hash,
{
    rows: BiHashMap<R, usize>,
    cols: BiHashMap<C, usize>,
    triplets: HashMap<(usize, usize), f64>,
}

impl<R, C> Default for MappedMatrixBuilder<R, C>
where
    R: Eq + Hash + Clone,
    C: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R, C> MappedMatrixBuilder<R, C>
where
    R: Eq + Hash + Clone,
    C: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            rows: BiHashMap::new(),
            cols: BiHashMap::new(),
            triplets: HashMap::new(),
        }
    }

    /// Start from an existing row labelling, e.g. the columns of another
    /// matrix, so products line up.
    pub fn with_rows(mut self, rows: &LabelMap<R>) -> Self {
        self.rows = (**rows).clone();
        self
    }

    pub fn with_cols(mut self, cols: &LabelMap<C>) -> Self {
        self.cols = (**cols).clone();
        self
    }

    pub fn row(&self, label: &R) -> Option<usize> {
        self.rows.get_by_left(label).copied()
    }

    pub fn col(&self, label: &C) -> Option<usize> {
        self.cols.get_by_left(label).copied()
    }

    /// Register a row label, returning its index.
    pub fn add_row(&mut self, label: R) -> usize {
        if let Some(i) = self.row(&label) {
            return i;
        }
        let i = self.rows.len();
        self.rows.insert(label, i);
        i
    }

    /// Register a column label, returning its index.
    pub fn add_col(&mut self, label: C) -> usize {
        if let Some(i) = self.col(&label) {
            return i;
        }
        let i = self.cols.len();
        self.cols.insert(label, i);
        i
    }

    /// Add `value` at `(row, col)`; repeated coordinates accumulate.
    pub fn add_triplet(&mut self, row: R, col: C, value: f64) {
        let i = self.add_row(row);
        let j = self.add_col(col);
        *self.triplets.entry((i, j)).or_insert(0.0) += value;
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    pub fn build(self) -> MappedMatrix<R, C> {
        let shape = (self.rows.len(), self.cols.len());
        let mut tri = SparseTriMat::with_capacity(shape, self.triplets.len());
        for (&(i, j), &v) in &self.triplets {
            tri.add_triplet(i, j, v);
        }
        MappedMatrix::from_parts(Arc::new(self.rows), Arc::new(self.cols), tri.to_csc())
    }
}

#[derive(Debug, Clone)]
struct Factors {
    symbolic: LuSymbolic,
    numeric: LuNumeric,
}

/// Sparse matrix with labelled rows and columns.
///
/// Solving requires an explicit [`MappedMatrix::factorize`] (or a loaded
/// factorization); the factors are cached until the next call.
///
/// Serialization covers labels and values only. A deserialized matrix is
/// unfactorized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedMatrix<R, C>
where
    R: Eq + Hash,
    C: Eq + Hash,
{
    rows: LabelMap<R>,
    cols: LabelMap<C>,
    matrix: SparseCsc,
    #[serde(skip)]
    factors: Option<Factors>,
}

fn same_map<T: Eq + Hash>(a: &LabelMap<T>, b: &LabelMap<T>) -> bool {
    Arc::ptr_eq(a, b) || **a == **b
}

impl<R, C> MappedMatrix<R, C>
where
    R: Eq + Hash + Clone,
    C: Eq + Hash + Clone,
{
    pub(crate) fn from_parts(rows: LabelMap<R>, cols: LabelMap<C>, matrix: SparseCsc) -> Self {
        Self {
            rows,
            cols,
            matrix,
            factors: None,
        }
    }

    pub fn matrix(&self) -> &SparseCsc {
        &self.matrix
    }

    pub fn rows(&self) -> &LabelMap<R> {
        &self.rows
    }

    pub fn cols(&self) -> &LabelMap<C> {
        &self.cols
    }

    /// Index of the row labelled `label`.
    pub fn row(&self, label: &R) -> Option<usize> {
        self.rows.get_by_left(label).copied()
    }

    /// Index of the column labelled `label`.
    pub fn col(&self, label: &C) -> Option<usize> {
        self.cols.get_by_left(label).copied()
    }

    /// Label of row `index`.
    pub fn irow(&self, index: usize) -> Option<&R> {
        self.rows.get_by_right(&index)
    }

    /// Label of column `index`.
    pub fn icol(&self, index: usize) -> Option<&C> {
        self.cols.get_by_right(&index)
    }

    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    pub fn contains_row(&self, label: &R) -> bool {
        self.rows.contains_left(label)
    }

    pub fn contains_col(&self, label: &C) -> bool {
        self.cols.contains_left(label)
    }

    pub fn zeros_like_rows(&self) -> MappedVector<R> {
        MappedVector::zeros(self.rows.clone())
    }

    pub fn zeros_like_cols(&self) -> MappedVector<C> {
        MappedVector::zeros(self.cols.clone())
    }

    pub fn get(&self, row: &R, col: &C) -> Option<f64> {
        let (i, j) = (self.row(row)?, self.col(col)?);
        self.matrix.get(i, j).copied()
    }

    pub fn is_factorized(&self) -> bool {
        self.factors.is_some()
    }

    /// Analyze and factorize the matrix, replacing any cached factors.
    ///
    /// Returns the diagnostics of the new factors for the caller to report
    /// (see [`crate::log_diagnostics`]).
    pub fn factorize<B>(
        &mut self,
        backend: &B,
        settings: &SolverSettings,
    ) -> SpluResult<FactorDiagnostics>
    where
        B: FactorizationBackend<Symbolic = LuSymbolic, Numeric = LuNumeric>,
    {
        self.factors = None;
        let symbolic = build_symbolic(backend, &self.matrix, settings)?;
        let numeric = build_numeric(backend, &self.matrix, &symbolic, settings)?;

        let diag = FactorDiagnostics::from_numeric(&numeric);
        self.factors = Some(Factors { symbolic, numeric });
        Ok(diag)
    }

    /// Solve `A x = b` for `x`, labelled by columns.
    pub fn solve(&self, rhs: &MappedVector<R>) -> SpluResult<MappedVector<C>> {
        let factors = self.factors.as_ref().ok_or(SpluError::NotFactorized)?;
        if !rhs.same_labels(&self.rows) {
            return Err(SpluError::LabelMismatch(
                "right-hand side is not labelled by the matrix rows".to_string(),
            ));
        }
        let n = factors.numeric.dim();
        let mut x = vec![0.0; n];
        solve(&factors.symbolic, &factors.numeric, n, rhs.values(), &mut x)?;
        MappedVector::from_values(self.cols.clone(), x)
    }

    /// Matrix-vector product `A x`, labelled by rows.
    pub fn dot(&self, x: &MappedVector<C>) -> SpluResult<MappedVector<R>> {
        if !x.same_labels(&self.cols) {
            return Err(SpluError::LabelMismatch(
                "vector is not labelled by the matrix columns".to_string(),
            ));
        }
        let mut y = vec![0.0; self.nrows()];
        sparse::matrix_vector_product(&self.matrix, x.values(), &mut y)?;
        MappedVector::from_values(self.rows.clone(), y)
    }

    /// Matrix product; the result is not factorized.
    pub fn matmul<C2>(&self, rhs: &MappedMatrix<C, C2>) -> SpluResult<MappedMatrix<R, C2>>
    where
        C2: Eq + Hash + Clone,
    {
        if !same_map(&self.cols, &rhs.rows) {
            return Err(SpluError::LabelMismatch(
                "left columns and right rows are labelled differently".to_string(),
            ));
        }
        let product = sparse::matmat(&self.matrix, &rhs.matrix)?;
        Ok(MappedMatrix::from_parts(self.rows.clone(), rhs.cols.clone(), product))
    }

    pub fn save_factorization(&self, path: impl AsRef<Path>) -> SpluResult<()> {
        let factors = self.factors.as_ref().ok_or(SpluError::NotFactorized)?;
        persist::save_factorization(&factors.symbolic, &factors.numeric, path)?;
        Ok(())
    }

    /// Restore factors written by [`MappedMatrix::save_factorization`] for a
    /// matrix with the same labels and values.
    pub fn load_factorization(&mut self, path: impl AsRef<Path>) -> SpluResult<()> {
        let (symbolic, numeric) = persist::load_factorization(path)?;
        if numeric.dim() != self.nrows() || numeric.dim() != self.ncols() {
            return Err(FactorizationError::DimensionMismatch {
                expected: self.nrows(),
                actual: numeric.dim(),
            }
            .into());
        }
        self.factors = Some(Factors { symbolic, numeric });
        Ok(())
    }
}

/// Build a [`MappedMatrix`] from `row => { col => value, ... }` blocks.
///
/// Row and column labels are indexed in order of first appearance and
/// repeated coordinates accumulate, as with
/// [`MappedMatrixBuilder::add_triplet`]. Row label expressions are evaluated
/// once per entry.
///
/// ```
/// use splu_core::mapped::MappedVector;
/// use splu_core::{NativeLu, SolverSettings, MM};
///
/// let mut a = MM!(
///     "a" => { "c" => 1.0, "d" => 2.0 },
///     "b" => { "c" => -0.1, "d" => 3.0 },
/// );
/// a.factorize(&NativeLu::new(), &SolverSettings::default())?;
/// let b = MappedVector::from_values(a.rows().clone(), vec![10.0, 5.0])?;
/// let x = a.solve(&b)?;
/// assert!((x.get(&"c").unwrap() - 6.25).abs() < 1e-12);
/// # Ok::<(), splu_core::SpluError>(())
/// ```
#[macro_export]
macro_rules! MM {
    ($($row:expr => { $($col:expr => $val:expr),* $(,)? }),* $(,)?) => {{
        let mut builder = $crate::mapped::MappedMatrixBuilder::new();
        $($(builder.add_triplet($row, $col, $val);)*)*
        builder.build()
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::lu::NativeLu;
    use tempfile::NamedTempFile;

    fn two_by_two() -> MappedMatrix<&'static str, &'static str> {
        let mut builder = MappedMatrixBuilder::new();
        builder.add_triplet("a", "c", 1.0);
        builder.add_triplet("a", "d", 2.0);
        builder.add_triplet("b", "c", -0.1);
        builder.add_triplet("b", "d", 3.0);
        builder.build()
    }

    #[test]
    fn test_labels() {
        let m = two_by_two();
        assert_eq!(m.row(&"b"), Some(1));
        assert_eq!(m.icol(0), Some(&"c"));
        assert!(m.contains_col(&"d"));
        assert!(!m.contains_row(&"c"));
        assert_eq!(m.get(&"b", &"c"), Some(-0.1));
    }

    #[test]
    fn test_duplicate_triplets_accumulate() {
        let mut builder = MappedMatrixBuilder::new();
        builder.add_triplet(1, 1, 2.0);
        builder.add_triplet(1, 1, 0.5);
        let m = builder.build();
        assert_eq!(m.get(&1, &1), Some(2.5));
    }

    #[test]
    fn test_solve_and_dot() {
        let mut m = two_by_two();
        let mut b = m.zeros_like_rows();
        b.set(&"a", 10.0).unwrap();
        b.set(&"b", 5.0).unwrap();

        assert!(matches!(m.solve(&b), Err(SpluError::NotFactorized)));
        m.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap();
        let x = m.solve(&b).unwrap();
        assert!((x.get(&"c").unwrap() - 6.25).abs() < 1e-12);
        assert!((x.get(&"d").unwrap() - 1.875).abs() < 1e-12);

        let back = m.dot(&x).unwrap();
        assert!((back.get(&"a").unwrap() - 10.0).abs() < 1e-12);
        assert!((back.get(&"b").unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_label_mismatch() {
        let mut m = two_by_two();
        m.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap();
        let wrong = MappedVector::from_pairs(vec![("x", 1.0), ("y", 1.0)]);
        assert!(matches!(m.solve(&wrong), Err(SpluError::LabelMismatch(_))));
    }

    #[test]
    fn test_rectangular_factorize_fails() {
        let mut builder = MappedMatrixBuilder::new();
        builder.add_triplet("r", "c1", 1.0);
        builder.add_triplet("r", "c2", 1.0);
        let mut m = builder.build();
        let err = m.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap_err();
        assert!(matches!(
            err,
            SpluError::Factorization(FactorizationError::NotSquare { nrows: 1, ncols: 2 })
        ));
    }

    #[test]
    fn test_matmul_with_diag() {
        let m = two_by_two();
        let scale = MappedVector::from_values(m.cols().clone(), vec![2.0, -1.0]).unwrap();
        let p = m.matmul(&scale.diag()).unwrap();
        assert_eq!(p.get(&"a", &"c"), Some(2.0));
        assert_eq!(p.get(&"b", &"d"), Some(-3.0));
        assert!(!p.is_factorized());
    }

    #[test]
    fn test_factorize_returns_diagnostics() {
        let mut m = two_by_two();
        let diag = m.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap();
        assert_eq!(diag.n, 2);
        assert_eq!(diag.unz, 3);
        assert!(diag.rcond > 0.0 && diag.rcond <= 1.0);
    }

    #[test]
    fn test_macro_matches_builder() {
        let m = crate::MM!(
            "a" => { "c" => 1.0, "d" => 2.0 },
            "b" => { "c" => -0.1, "d" => 3.0 },
        );
        let expected = two_by_two();
        assert_eq!(m.rows(), expected.rows());
        assert_eq!(m.cols(), expected.cols());
        assert_eq!(m.matrix(), expected.matrix());

        let repeated = crate::MM!(1 => { 1 => 2.0, 1 => 0.5 });
        assert_eq!(repeated.get(&1, &1), Some(2.5));
    }

    #[test]
    fn test_bincode_round_trip_drops_factors() {
        let mut m = two_by_two();
        m.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap();
        let bytes = bincode::serialize(&m).unwrap();
        let mut back: MappedMatrix<String, String> = bincode::deserialize(&bytes).unwrap();

        assert!(!back.is_factorized());
        assert_eq!(back.matrix(), m.matrix());
        assert_eq!(back.row(&"b".to_string()), Some(1));
        assert_eq!(back.get(&"a".to_string(), &"d".to_string()), Some(2.0));

        back.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap();
        let b = MappedVector::from_values(back.rows().clone(), vec![10.0, 5.0]).unwrap();
        let x = back.solve(&b).unwrap();
        assert!((x.get(&"c".to_string()).unwrap() - 6.25).abs() < 1e-12);
    }

    #[test]
    fn test_factorization_persistence() {
        let mut m = two_by_two();
        m.factorize(&NativeLu::new(), &SolverSettings::default()).unwrap();
        let file = NamedTempFile::new().unwrap();
        m.save_factorization(file.path()).unwrap();

        let mut fresh = two_by_two();
        fresh.load_factorization(file.path()).unwrap();
        let b = MappedVector::from_values(fresh.rows().clone(), vec![10.0, 5.0]).unwrap();
        let x = fresh.solve(&b).unwrap();
        assert!((x.get(&"c").unwrap() - 6.25).abs() < 1e-12);
    }
}
