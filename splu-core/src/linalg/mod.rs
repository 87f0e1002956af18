//! Linear algebra layer.
//!
//! Sparse matrix operations, column orderings, LU factorization backends,
//! the permuted solve pipeline and factor persistence.

pub mod sparse;
pub mod ordering;
pub mod backend;
pub mod backends;
pub mod lu;
pub mod scratch;
pub mod solve;
pub mod persist;
