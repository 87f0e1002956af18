//! Native sparse LU backend.
//!
//! Left-looking LU with threshold partial pivoting (Gilbert-Peierls). Each
//! column `k` of the reordered matrix is obtained by a sparse triangular
//! solve against the columns of `L` built so far; the nonzero pattern of that
//! solve is found by depth-first search before any arithmetic happens.
//!
//! The factorization satisfies `A(p, q) = L U` where `p` is the inverse of
//! `pinv`. `L` has a unit diagonal stored explicitly, `U` stores its pivots on
//! the diagonal. Both factors use pivot-order row indices.

use super::backend::{
    check_pivot_tolerance, check_square, FactorizationBackend, FactorizationError, NumericFactor,
    SymbolicFactor,
};
use super::ordering::{self, ColumnOrdering};
use super::sparse::{self, SparseCsc};

const UNPIVOTED: usize = usize::MAX;

/// Symbolic analysis produced by the LU backends.
#[derive(Debug, Clone, PartialEq)]
pub struct LuSymbolic {
    n: usize,
    q: Vec<usize>,
    ordering: ColumnOrdering,
    /// Initial capacity hints for L and U
    lnz_estimate: usize,
    unz_estimate: usize,
}

impl LuSymbolic {
    /// Wrap an existing column permutation.
    pub fn from_permutation(
        q: Vec<usize>,
        ordering: ColumnOrdering,
    ) -> Result<Self, FactorizationError> {
        if !sparse::is_permutation(&q) {
            return Err(FactorizationError::Backend(format!(
                "column ordering of length {} is not a permutation",
                q.len()
            )));
        }
        let n = q.len();
        Ok(Self {
            n,
            q,
            ordering,
            lnz_estimate: n,
            unz_estimate: n,
        })
    }

    pub fn ordering(&self) -> ColumnOrdering {
        self.ordering
    }

    fn with_estimates(mut self, nnz: usize) -> Self {
        // Classic left-looking guess: 4 nnz(A) + n for each factor.
        self.lnz_estimate = 4 * nnz + self.n;
        self.unz_estimate = 4 * nnz + self.n;
        self
    }
}

impl SymbolicFactor for LuSymbolic {
    fn dim(&self) -> usize {
        self.n
    }

    fn column_permutation(&self) -> &[usize] {
        &self.q
    }
}

/// Numeric LU factors.
#[derive(Debug, Clone)]
pub struct LuNumeric {
    n: usize,
    pinv: Vec<usize>,
    l: SparseCsc,
    u: SparseCsc,
}

impl LuNumeric {
    /// Assemble a factorization from its parts, checking shapes, the row
    /// permutation and triangularity of both factors.
    pub fn from_parts(
        pinv: Vec<usize>,
        l: SparseCsc,
        u: SparseCsc,
    ) -> Result<Self, FactorizationError> {
        let n = pinv.len();
        if !sparse::is_permutation(&pinv) {
            return Err(FactorizationError::Backend(
                "row pivots do not form a permutation".to_string(),
            ));
        }
        for (name, factor) in [("L", &l), ("U", &u)] {
            if factor.shape() != (n, n) {
                return Err(FactorizationError::Backend(format!(
                    "{} has shape {:?}, expected ({}, {})",
                    name,
                    factor.shape(),
                    n,
                    n
                )));
            }
            sparse::check_csc(factor)?;
        }
        let lower_ok = l.iter().all(|(_, (row, col))| row >= col);
        let upper_ok = u.iter().all(|(_, (row, col))| row <= col);
        if !lower_ok || !upper_ok {
            return Err(FactorizationError::Backend(
                "factors are not triangular".to_string(),
            ));
        }
        if (0..n).any(|j| u.get(j, j).is_none()) {
            return Err(FactorizationError::Backend(
                "U is missing a diagonal entry".to_string(),
            ));
        }
        Ok(Self { n, pinv, l, u })
    }

    /// Nonzeros in `L`, unit diagonal included.
    pub fn lnz(&self) -> usize {
        self.l.nnz()
    }

    /// Nonzeros in `U`, diagonal included.
    pub fn unz(&self) -> usize {
        self.u.nnz()
    }
}

impl NumericFactor for LuNumeric {
    fn dim(&self) -> usize {
        self.n
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

/// Native left-looking LU backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLu;

impl NativeLu {
    pub fn new() -> Self {
        Self
    }
}

impl FactorizationBackend for NativeLu {
    type Symbolic = LuSymbolic;
    type Numeric = LuNumeric;

    fn name(&self) -> &'static str {
        "native"
    }

    fn analyze(
        &self,
        a: &SparseCsc,
        ordering: ColumnOrdering,
    ) -> Result<LuSymbolic, FactorizationError> {
        check_square(a)?;
        sparse::check_csc(a)?;
        let q = ordering::column_permutation(a, ordering)?;
        Ok(LuSymbolic::from_permutation(q, ordering)?.with_estimates(a.nnz()))
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
        if symbolic.n != n {
            return Err(FactorizationError::DimensionMismatch {
                expected: symbolic.n,
                actual: n,
            });
        }

        let mut work = LeftLooking::new(n, symbolic.lnz_estimate, symbolic.unz_estimate);
        for k in 0..n {
            work.eliminate_column(a, symbolic.q[k], k, pivot_tolerance)?;
        }
        work.finish()
    }
}

/// Working state of one left-looking factorization.
struct LeftLooking {
    n: usize,
    pinv: Vec<usize>,

    // L and U as they grow; L row indices are original rows until `finish`
    l_p: Vec<usize>,
    l_i: Vec<usize>,
    l_x: Vec<f64>,
    u_p: Vec<usize>,
    u_i: Vec<usize>,
    u_x: Vec<f64>,

    // Dense accumulator and DFS workspaces (length n)
    x: Vec<f64>,
    xi: Vec<usize>,
    stack: Vec<usize>,
    pstack: Vec<usize>,
    marked: Vec<bool>,
}

impl LeftLooking {
    fn new(n: usize, lnz: usize, unz: usize) -> Self {
        Self {
            n,
            pinv: vec![UNPIVOTED; n],
            l_p: vec![0; n + 1],
            l_i: Vec::with_capacity(lnz),
            l_x: Vec::with_capacity(lnz),
            u_p: vec![0; n + 1],
            u_i: Vec::with_capacity(unz),
            u_x: Vec::with_capacity(unz),
            x: vec![0.0; n],
            xi: vec![0; n],
            stack: vec![0; n],
            pstack: vec![0; n],
            marked: vec![false; n],
        }
    }

    /// Compute column `k` of L and U from column `col` of `a`.
    fn eliminate_column(
        &mut self,
        a: &SparseCsc,
        col: usize,
        k: usize,
        tol: f64,
    ) -> Result<(), FactorizationError> {
        self.l_p[k] = self.l_i.len();
        self.u_p[k] = self.u_i.len();

        let top = self.sparse_lower_solve(a, col);

        // Split the solution: pivotal rows go to U, the rest are pivot candidates.
        let mut ipiv = UNPIVOTED;
        let mut largest = -1.0_f64;
        for p in top..self.n {
            let i = self.xi[p];
            if self.pinv[i] == UNPIVOTED {
                let t = self.x[i].abs();
                if t > largest {
                    largest = t;
                    ipiv = i;
                }
            } else {
                self.u_i.push(self.pinv[i]);
                self.u_x.push(self.x[i]);
            }
        }

        if ipiv == UNPIVOTED {
            self.clear_accumulator(top);
            return Err(FactorizationError::StructurallySingular { column: k });
        }
        if largest <= 0.0 {
            self.clear_accumulator(top);
            return Err(FactorizationError::NumericallySingular { column: k });
        }

        // Prefer the diagonal when it is large enough.
        if self.pinv[col] == UNPIVOTED && self.x[col].abs() >= largest * tol {
            ipiv = col;
        }

        let pivot = self.x[ipiv];
        self.u_i.push(k);
        self.u_x.push(pivot);
        self.pinv[ipiv] = k;

        self.l_i.push(ipiv);
        self.l_x.push(1.0);
        for p in top..self.n {
            let i = self.xi[p];
            if self.pinv[i] == UNPIVOTED {
                self.l_i.push(i);
                self.l_x.push(self.x[i] / pivot);
            }
            self.x[i] = 0.0;
        }
        Ok(())
    }

    fn clear_accumulator(&mut self, top: usize) {
        for p in top..self.n {
            self.x[self.xi[p]] = 0.0;
        }
    }

    /// Solve `L x = A(:, col)` with the columns of L computed so far.
    ///
    /// Returns `top`; the nonzero pattern of `x` is `xi[top..n]` in
    /// topological order.
    fn sparse_lower_solve(&mut self, a: &SparseCsc, col: usize) -> usize {
        let top = self.reach(a, col);
        for p in top..self.n {
            self.x[self.xi[p]] = 0.0;
        }
        if let Some(column) = a.outer_view(col) {
            for (row, &val) in column.iter() {
                self.x[row] = val;
            }
        }
        for px in top..self.n {
            let j = self.xi[px];
            let jcol = self.pinv[j];
            if jcol == UNPIVOTED {
                continue;
            }
            // Unit diagonal is the first entry of each L column.
            let xj = self.x[j];
            for p in self.l_p[jcol] + 1..self.l_p[jcol + 1] {
                self.x[self.l_i[p]] -= self.l_x[p] * xj;
            }
        }
        top
    }

    /// Nonzero pattern of `L \ A(:, col)`.
    fn reach(&mut self, a: &SparseCsc, col: usize) -> usize {
        let mut top = self.n;
        if let Some(column) = a.outer_view(col) {
            for (row, _) in column.iter() {
                if !self.marked[row] {
                    top = self.dfs(row, top);
                }
            }
        }
        for p in top..self.n {
            self.marked[self.xi[p]] = false;
        }
        top
    }

    /// Iterative depth-first search from row `j` through the graph of L.
    fn dfs(&mut self, j: usize, mut top: usize) -> usize {
        let mut head = 0;
        self.stack[0] = j;
        loop {
            let j = self.stack[head];
            let jcol = self.pinv[j];
            if !self.marked[j] {
                self.marked[j] = true;
                self.pstack[head] = if jcol == UNPIVOTED { 0 } else { self.l_p[jcol] };
            }
            let end = if jcol == UNPIVOTED { 0 } else { self.l_p[jcol + 1] };

            let mut done = true;
            let mut p = self.pstack[head];
            while p < end {
                let i = self.l_i[p];
                if !self.marked[i] {
                    // Resume here once the child is finished.
                    self.pstack[head] = p;
                    head += 1;
                    self.stack[head] = i;
                    done = false;
                    break;
                }
                p += 1;
            }

            if done {
                top -= 1;
                self.xi[top] = j;
                if head == 0 {
                    break;
                }
                head -= 1;
            }
        }
        top
    }

    fn finish(mut self) -> Result<LuNumeric, FactorizationError> {
        let n = self.n;
        self.l_p[n] = self.l_i.len();
        self.u_p[n] = self.u_i.len();
        for row in self.l_i.iter_mut() {
            *row = self.pinv[*row];
        }

        let l = sparse::csc_from_unsorted(n, self.l_p, self.l_i, self.l_x)?;
        let u = sparse::csc_from_unsorted(n, self.u_p, self.u_i, self.u_x)?;
        Ok(LuNumeric {
            n,
            pinv: self.pinv,
            l,
            u,
        })
    }
}
