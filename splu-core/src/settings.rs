//! Solver settings.

use std::sync::OnceLock;

use crate::linalg::backend::{check_pivot_tolerance, FactorizationError};
use crate::linalg::ordering::ColumnOrdering;

/// Default threshold for diagonal preference during pivoting.
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 0.1;

/// Settings for symbolic analysis and numeric factorization.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    /// Fill-reducing column ordering used by symbolic analysis
    pub ordering: ColumnOrdering,

    /// Threshold partial pivoting parameter in (0, 1].
    /// 1.0 is strict partial pivoting, small values prefer the diagonal.
    pub pivot_tolerance: f64,

    /// Report factorization diagnostics at info level
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            ordering: ColumnOrdering::default(),
            pivot_tolerance: DEFAULT_PIVOT_TOLERANCE,
            verbose: false,
        }
    }
}

impl SolverSettings {
    /// Defaults with `SPLU_ORDERING`, `SPLU_PIVOT_TOL` and `SPLU_VERBOSE`
    /// applied from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unparseable values are logged and
    /// ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SPLU_ORDERING") {
            match v.parse::<ColumnOrdering>() {
                Ok(ordering) => self.ordering = ordering,
                Err(e) => log::warn!("ignoring SPLU_ORDERING: {}", e),
            }
        }
        if let Some(v) = lookup("SPLU_PIVOT_TOL") {
            match v.trim().parse::<f64>() {
                Ok(tol) => self.pivot_tolerance = tol,
                Err(_) => log::warn!("ignoring SPLU_PIVOT_TOL={:?}: not a number", v),
            }
        }
        if let Some(v) = lookup("SPLU_VERBOSE") {
            self.verbose = parse_verbose(&v);
        }
        self
    }

    pub fn validate(&self) -> Result<(), FactorizationError> {
        check_pivot_tolerance(self.pivot_tolerance)
    }
}

fn parse_verbose(v: &str) -> bool {
    match v.trim().parse::<u8>() {
        Ok(level) => level >= 1,
        Err(_) => v.trim().eq_ignore_ascii_case("true"),
    }
}

/// `SPLU_VERBOSE` set to a level >= 1 (or `true`), read once per process.
pub fn verbose_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        std::env::var("SPLU_VERBOSE")
            .map(|v| parse_verbose(&v))
            .unwrap_or(false)
    })
}
