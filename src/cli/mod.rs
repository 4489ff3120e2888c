//! Command-line parsing for the `paramfit` binary.
//!
//! Argument parsing and command dispatch stay separate from the estimation
//! code. Flags left unset fall back to [`crate::config::Settings`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "paramfit", version, about = "Least-squares and maximum-likelihood parameter estimation")]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Linear least squares on a user-chosen basis.
    Linear(LinearArgs),
    /// Nonlinear least squares (Levenberg-Marquardt) with a built-in curve.
    Curve(CurveArgs),
    /// Unbinned maximum-likelihood fit of a density to event values.
    Unbinned(UnbinnedArgs),
    /// Binned Poisson-likelihood fit of a density to histogram counts.
    Binned(BinnedArgs),
    /// Fit seeded toy datasets with every estimator.
    Demo(DemoArgs),
}

/// Plot and solver options shared by every subcommand.
#[derive(Debug, Args, Clone, Default)]
pub struct OutputArgs {
    /// Disable the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long)]
    pub width: Option<usize>,

    /// Plot height (rows).
    #[arg(long)]
    pub height: Option<usize>,

    /// Iteration budget of the solver.
    #[arg(long)]
    pub max_iters: Option<u64>,

    /// Convergence tolerance of the solver.
    #[arg(long)]
    pub tolerance: Option<f64>,
}

/// Options for reading an observation CSV.
#[derive(Debug, Args, Clone)]
pub struct ObservationArgs {
    /// CSV file with a header row.
    #[arg(value_name = "CSV")]
    pub input: PathBuf,

    /// Column holding the independent variable.
    #[arg(long, default_value = "x")]
    pub x_col: String,

    /// Column holding the measured values.
    #[arg(long, default_value = "y")]
    pub y_col: String,

    /// Column holding per-point standard deviations.
    #[arg(long, default_value = "sigma")]
    pub sigma_col: String,

    /// Ignore uncertainties and weight every point equally.
    #[arg(long)]
    pub no_sigma: bool,

    /// Write x, y, sigma, fitted, residual and pull per point as CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,

    /// Write the fit report as JSON.
    #[arg(long = "export-report", value_name = "JSON")]
    pub export_report: Option<PathBuf>,

    /// Print the N points farthest from the model.
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}

#[derive(Debug, Args, Clone)]
pub struct LinearArgs {
    #[command(flatten)]
    pub data: ObservationArgs,

    /// Comma-separated basis functions: 1, x, x^k, sin, cos, exp, exp(-x), ln.
    #[arg(long, default_value = "1, x")]
    pub basis: String,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct CurveArgs {
    #[command(flatten)]
    pub data: ObservationArgs,

    /// Built-in model: line, exp-decay, gaussian.
    #[arg(long, default_value = "exp-decay")]
    pub model: String,

    /// Initial parameter values (comma-separated).
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub initial: Option<Vec<f64>>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Density family fitted by the likelihood subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DensityKind {
    /// Truncated Gaussian `[mu, sigma]`.
    Gaussian,
    /// Truncated exponential `[lambda]`.
    Exponential,
    /// Gaussian signal over exponential background `[fraction, mu, sigma, lambda]`.
    Mixture,
}

/// Density and window options shared by the likelihood subcommands.
#[derive(Debug, Args, Clone)]
pub struct DensityArgs {
    #[arg(long, value_enum, default_value_t = DensityKind::Mixture)]
    pub density: DensityKind,

    /// Lower edge of the observation window.
    #[arg(long, allow_hyphen_values = true)]
    pub lo: f64,

    /// Upper edge of the observation window.
    #[arg(long, allow_hyphen_values = true)]
    pub hi: f64,

    /// Initial parameter values (comma-separated); estimated from the data if omitted.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub initial: Option<Vec<f64>>,

    /// Profile the parameter with this index and print the scan.
    #[arg(long, value_name = "INDEX")]
    pub scan: Option<usize>,

    /// Number of profile points.
    #[arg(long, default_value_t = 21)]
    pub scan_points: usize,

    /// Write the fit report as JSON.
    #[arg(long = "export-report", value_name = "JSON")]
    pub export_report: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct UnbinnedArgs {
    /// Text file with one event value per line.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    #[command(flatten)]
    pub model: DensityArgs,

    /// Density floor added inside the logarithm.
    #[arg(long)]
    pub floor: Option<f64>,

    /// Bins used to display the events.
    #[arg(long, default_value_t = 40)]
    pub bins: usize,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct BinnedArgs {
    /// Text file with one bin count per line; bins split [lo, hi] evenly.
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    #[command(flatten)]
    pub model: DensityArgs,

    /// Write bin center, count, sqrt(count), expected, residual and pull as CSV.
    #[arg(long = "export-residuals", value_name = "CSV")]
    pub export_residuals: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    /// Random seed for the toy datasets.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Events per likelihood toy.
    #[arg(long, default_value_t = 2000)]
    pub events: usize,

    #[command(flatten)]
    pub output: OutputArgs,
}
