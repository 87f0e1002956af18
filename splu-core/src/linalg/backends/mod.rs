//! Optional third-party factorization backends.

#[cfg(feature = "faer")]
mod faer_lu;

#[cfg(feature = "faer")]
pub use faer_lu::FaerLu;
