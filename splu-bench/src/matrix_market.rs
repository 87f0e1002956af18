//! Matrix Market (.mtx) input and output.

use anyhow::{bail, Context, Result};
use splu_core::linalg::sparse::{self, SparseCsc};
use std::path::Path;

/// Load a square coordinate-format matrix as CSC.
pub fn load_square(path: &Path) -> Result<SparseCsc> {
    let tri = sprs::io::read_matrix_market::<f64, usize, _>(path)
        .with_context(|| format!("Failed to read Matrix Market file {}", path.display()))?;
    let a: SparseCsc = tri.to_csc();
    if a.rows() != a.cols() {
        bail!(
            "{} is {}x{}, expected a square matrix",
            path.display(),
            a.rows(),
            a.cols()
        );
    }
    sparse::check_csc(&a)
        .with_context(|| format!("{} has an inconsistent structure", path.display()))?;
    Ok(a)
}

pub fn save(path: &Path, a: &SparseCsc) -> Result<()> {
    sprs::io::write_matrix_market(path, a)
        .with_context(|| format!("Failed to write Matrix Market file {}", path.display()))
}
