//! Command-line driver for splu-core factorizations and solves.

mod backend_choice;
mod generate;
mod matrix_market;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use backend_choice::{factorize_with_choice, BackendChoice, OrderingChoice};
use clap::{Parser, Subcommand};
use splu_core::{
    load_factorization, log_diagnostics, matrix_vector_product, residual_norm, save_factorization,
    solve, FactorDiagnostics, LuNumeric, LuSymbolic, NumericFactor, SolverSettings, SparseCsc,
};

#[derive(Parser, Debug)]
#[command(name = "splu-bench", about = "Sparse LU factorization and solve driver")]
struct Cli {
    /// Report factorization diagnostics at info level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug, Clone)]
struct FactorArgs {
    /// Fill-reducing column ordering
    #[arg(long, value_enum, default_value_t = OrderingChoice::Rcm)]
    ordering: OrderingChoice,

    /// Threshold partial pivoting parameter in (0, 1]
    #[arg(long, default_value_t = splu_core::settings::DEFAULT_PIVOT_TOLERANCE)]
    pivot_tol: f64,

    /// Factorization backend
    #[arg(long, value_enum, default_value_t = BackendChoice::Native)]
    backend: BackendChoice,

    /// Write the factorization to this file after factorizing
    #[arg(long)]
    save_factor: Option<PathBuf>,

    /// Reuse a factorization written by --save-factor instead of factorizing
    #[arg(long, conflicts_with = "save_factor")]
    load_factor: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Solve A x = A 1 for a Matrix Market matrix
    Solve {
        /// Square matrix in Matrix Market coordinate format
        #[arg(long)]
        matrix: PathBuf,

        #[command(flatten)]
        factor: FactorArgs,
    },
    /// Solve on a random diagonally dominant matrix
    Generate {
        #[arg(long, default_value_t = 1000)]
        n: usize,

        /// Off-diagonal density in [0, 1]
        #[arg(long, default_value_t = 0.01)]
        density: f64,

        #[arg(long, default_value_t = 12345)]
        seed: u64,

        /// Also write the generated matrix in Matrix Market format
        #[arg(long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        factor: FactorArgs,
    },
}

/// Outcome of one run, printed by `main`.
#[derive(Debug)]
struct RunReport {
    n: usize,
    nnz: usize,
    backend: &'static str,
    factor_ms: f64,
    solve_ms: f64,
    diagnostics: FactorDiagnostics,
    abs_residual: f64,
    rel_residual: f64,
    /// Max deviation of x from the all-ones solution
    max_error: f64,
}

fn settings_for(args: &FactorArgs, verbose: bool) -> SolverSettings {
    let mut settings = SolverSettings::from_env();
    settings.ordering = args.ordering.into();
    settings.pivot_tolerance = args.pivot_tol;
    settings.verbose |= verbose;
    settings
}

fn obtain_factors(
    a: &SparseCsc,
    args: &FactorArgs,
    settings: &SolverSettings,
) -> Result<(LuSymbolic, LuNumeric)> {
    if let Some(path) = &args.load_factor {
        let (symbolic, numeric) = load_factorization(path)
            .with_context(|| format!("Failed to load factorization from {}", path.display()))?;
        if numeric.dim() != a.rows() {
            bail!(
                "{} holds a factorization for n = {}, matrix has n = {}",
                path.display(),
                numeric.dim(),
                a.rows()
            );
        }
        return Ok((symbolic, numeric));
    }

    let (symbolic, numeric) = factorize_with_choice(args.backend, a, settings)
        .with_context(|| format!("{} factorization failed", args.backend.name()))?;
    if let Some(path) = &args.save_factor {
        save_factorization(&symbolic, &numeric, path)
            .with_context(|| format!("Failed to save factorization to {}", path.display()))?;
        log::info!("saved factorization to {}", path.display());
    }
    Ok((symbolic, numeric))
}

fn run(a: &SparseCsc, args: &FactorArgs, settings: &SolverSettings) -> Result<RunReport> {
    let n = a.rows();
    let ones = vec![1.0; n];
    let mut b = vec![0.0; n];
    matrix_vector_product(a, &ones, &mut b)?;

    let start = Instant::now();
    let (symbolic, numeric) = obtain_factors(a, args, settings)?;
    let factor_ms = start.elapsed().as_secs_f64() * 1000.0;

    let backend = if args.load_factor.is_some() {
        "loaded"
    } else {
        args.backend.name()
    };
    let diagnostics = FactorDiagnostics::from_numeric(&numeric);
    log_diagnostics(backend, &diagnostics, settings.verbose);

    let mut x = vec![0.0; n];
    let start = Instant::now();
    solve(&symbolic, &numeric, n, &b, &mut x)?;
    let solve_ms = start.elapsed().as_secs_f64() * 1000.0;

    let r = residual_norm(a, &x, &b)?;
    let max_error = x.iter().map(|xi| (xi - 1.0).abs()).fold(0.0, f64::max);

    Ok(RunReport {
        n,
        nnz: a.nnz(),
        backend,
        factor_ms,
        solve_ms,
        diagnostics,
        abs_residual: r.abs,
        rel_residual: r.rel,
        max_error,
    })
}

fn print_report(name: &str, report: &RunReport) {
    println!("\n{}", "=".repeat(60));
    println!("{}", name);
    println!("{}", "=".repeat(60));
    println!("Dimension (n):    {}", report.n);
    println!(
        "A nonzeros:       {} ({:.3}% dense)",
        report.nnz,
        100.0 * report.nnz as f64 / (report.n.max(1) * report.n.max(1)) as f64
    );
    println!("Backend:          {}", report.backend);
    println!(
        "nnz(L) / nnz(U):  {} / {} (fill ratio {:.2})",
        report.diagnostics.lnz,
        report.diagnostics.unz,
        report.diagnostics.fill_ratio(report.nnz)
    );
    println!("rcond estimate:   {:.3e}", report.diagnostics.rcond);
    println!("Factor time:      {:.3} ms", report.factor_ms);
    println!("Solve time:       {:.3} ms", report.solve_ms);
    println!(
        "Residual ||Ax-b||: {:.3e} (relative {:.3e})",
        report.abs_residual, report.rel_residual
    );
    println!("Max |x - 1|:      {:.3e}", report.max_error);
}

fn solve_file(matrix: &Path, args: &FactorArgs, verbose: bool) -> Result<()> {
    let a = matrix_market::load_square(matrix)?;
    let settings = settings_for(args, verbose);
    let report = run(&a, args, &settings)?;
    print_report(&matrix.display().to_string(), &report);
    Ok(())
}

fn solve_generated(
    n: usize,
    density: f64,
    seed: u64,
    output: Option<&Path>,
    args: &FactorArgs,
    verbose: bool,
) -> Result<()> {
    if !(0.0..=1.0).contains(&density) {
        bail!("density must be in [0, 1], got {}", density);
    }
    let a = generate::diagonally_dominant(n, density, seed);
    if let Some(path) = output {
        matrix_market::save(path, &a)?;
    }
    let settings = settings_for(args, verbose);
    let report = run(&a, args, &settings)?;
    print_report(
        &format!("Random diagonally dominant (n={}, density={}, seed={})", n, density, seed),
        &report,
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Solve { matrix, factor } => solve_file(matrix, factor, cli.verbose),
        Command::Generate {
            n,
            density,
            seed,
            output,
            factor,
        } => solve_generated(*n, *density, *seed, output.as_deref(), factor, cli.verbose),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn factor_args() -> FactorArgs {
        FactorArgs {
            ordering: OrderingChoice::Rcm,
            pivot_tol: 0.1,
            backend: BackendChoice::Native,
            save_factor: None,
            load_factor: None,
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_solve_flags() {
        let cli = Cli::parse_from([
            "splu-bench",
            "solve",
            "--matrix",
            "a.mtx",
            "--ordering",
            "natural",
            "--pivot-tol",
            "1.0",
        ]);
        match cli.command {
            Command::Solve { matrix, factor } => {
                assert_eq!(matrix, PathBuf::from("a.mtx"));
                assert_eq!(factor.ordering, OrderingChoice::Natural);
                assert_eq!(factor.pivot_tol, 1.0);
                assert_eq!(factor.backend, BackendChoice::Native);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load_conflict() {
        let parsed = Cli::try_parse_from([
            "splu-bench",
            "generate",
            "--save-factor",
            "f.bin",
            "--load-factor",
            "f.bin",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_recovers_ones() {
        let a = generate::diagonally_dominant(60, 0.1, 3);
        let args = factor_args();
        let report = run(&a, &args, &SolverSettings::default()).unwrap();
        assert_eq!(report.n, 60);
        assert!(report.max_error < 1e-10);
        assert!(report.rel_residual < 1e-12);
    }

    #[test]
    fn test_saved_factor_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factor.splu");
        let a = generate::diagonally_dominant(25, 0.2, 9);

        let mut args = factor_args();
        args.save_factor = Some(path.clone());
        run(&a, &args, &SolverSettings::default()).unwrap();
        assert!(path.exists());

        let mut args = factor_args();
        args.load_factor = Some(path);
        let report = run(&a, &args, &SolverSettings::default()).unwrap();
        assert_eq!(report.backend, "loaded");
        assert!(report.max_error < 1e-10);
    }

    #[test]
    fn test_loaded_factor_dimension_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factor.splu");
        let mut args = factor_args();
        args.save_factor = Some(path.clone());
        run(&generate::diagonally_dominant(10, 0.2, 1), &args, &SolverSettings::default()).unwrap();

        let mut args = factor_args();
        args.load_factor = Some(path);
        let larger = generate::diagonally_dominant(12, 0.2, 1);
        assert!(run(&larger, &args, &SolverSettings::default()).is_err());
    }
}
