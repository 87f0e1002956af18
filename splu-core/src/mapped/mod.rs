//! Label-indexed matrices and vectors.
//!
//! Rows and columns are addressed by arbitrary hashable labels instead of
//! positions. Label maps are shared between a matrix and the vectors built
//! from it, so a solve or product can check that its operands line up.

use std::sync::Arc;

use bimap::BiHashMap;

mod matrix;
mod vector;

pub use matrix::{MappedMatrix, MappedMatrixBuilder};
pub use vector::MappedVector;

/// Shared label to index mapping.
pub type LabelMap<T> = Arc<BiHashMap<T, usize>>;
