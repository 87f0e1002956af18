use anyhow::Result;
use clap::ValueEnum;
use splu_core::{
    build_numeric, build_symbolic, ColumnOrdering, LuNumeric, LuSymbolic, NativeLu, SolverSettings,
    SparseCsc,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendChoice {
    /// Left-looking LU with threshold partial pivoting
    Native,
    /// faer simplicial LU (build with `--features faer`)
    Faer,
}

impl BackendChoice {
    pub fn name(self) -> &'static str {
        match self {
            BackendChoice::Native => "native",
            BackendChoice::Faer => "faer",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderingChoice {
    Natural,
    Rcm,
    /// Needs `--features suitesparse`
    Amd,
}

impl From<OrderingChoice> for ColumnOrdering {
    fn from(choice: OrderingChoice) -> Self {
        match choice {
            OrderingChoice::Natural => ColumnOrdering::Natural,
            OrderingChoice::Rcm => ColumnOrdering::ReverseCuthillMcKee,
            OrderingChoice::Amd => ColumnOrdering::Amd,
        }
    }
}

/// Symbolic analysis and numeric factorization of `a` with the chosen backend.
pub fn factorize_with_choice(
    choice: BackendChoice,
    a: &SparseCsc,
    settings: &SolverSettings,
) -> Result<(LuSymbolic, LuNumeric)> {
    match choice {
        BackendChoice::Native => {
            let backend = NativeLu::new();
            let symbolic = build_symbolic(&backend, a, settings)?;
            let numeric = build_numeric(&backend, a, &symbolic, settings)?;
            Ok((symbolic, numeric))
        }
        #[cfg(feature = "faer")]
        BackendChoice::Faer => {
            let backend = splu_core::FaerLu::new();
            let symbolic = build_symbolic(&backend, a, settings)?;
            let numeric = build_numeric(&backend, a, &symbolic, settings)?;
            Ok((symbolic, numeric))
        }
        #[cfg(not(feature = "faer"))]
        BackendChoice::Faer => anyhow::bail!("splu-bench was built without the `faer` feature"),
    }
}
