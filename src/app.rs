//! Top-level application orchestration.
//!
//! `src/main.rs` is tiny; this module is the real main that:
//! - parses CLI arguments and sets up logging
//! - loads settings from the environment and applies flag overrides
//! - loads data and runs the requested fit
//! - prints the summary and plot, and writes optional exports

use std::io::Write;
use std::path::Path;

use clap::Parser;
use tracing::info;

use crate::cli::{
    BinnedArgs, Cli, Command, CurveArgs, DemoArgs, DensityArgs, DensityKind, LinearArgs, ObservationArgs, OutputArgs,
    UnbinnedArgs,
};
use crate::config::Settings;
use crate::domain::Histogram;
use crate::error::{AppError, FitError};
use crate::fit::linspace;
use crate::io::ingest::{Columns, load_counts, load_observations, load_values};
use crate::math::Basis;
use crate::models::{ExponentialDecay, Window, builtin_curve};
use crate::plot::{AsciiPlot, RenderSink};
use crate::report::{fmt_vec, format_fit_summary};

pub mod pipeline;

use pipeline::{RunOutput, ScanRequest};

/// Entry point for the `paramfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env()?;

    match cli.command {
        Command::Linear(args) => handle_linear(args, &settings),
        Command::Curve(args) => handle_curve(args, &settings),
        Command::Unbinned(args) => handle_unbinned(args, &settings),
        Command::Binned(args) => handle_binned(args, &settings),
        Command::Demo(args) => handle_demo(args, &settings),
    }
}

/// Flags that were given replace the environment settings.
pub fn apply_overrides(settings: &Settings, output: &OutputArgs) -> Result<Settings, FitError> {
    let mut s = settings.clone();
    if let Some(v) = output.max_iters {
        s.max_iters = v;
    }
    if let Some(v) = output.tolerance {
        s.tolerance = v;
    }
    if let Some(v) = output.width {
        s.plot_width = v;
    }
    if let Some(v) = output.height {
        s.plot_height = v;
    }
    s.validate()?;
    Ok(s)
}

fn columns(args: &ObservationArgs) -> Columns {
    let columns = Columns {
        x: args.x_col.clone(),
        y: args.y_col.clone(),
        sigma: Some(args.sigma_col.clone()),
    };
    if args.no_sigma { columns.without_sigma() } else { columns }
}

fn handle_linear(args: LinearArgs, settings: &Settings) -> Result<(), AppError> {
    let settings = apply_overrides(settings, &args.output)?;
    let obs = load_observations(&args.data.input, &columns(&args.data))?;
    let basis = Basis::parse_list(&args.basis)?;
    let run = pipeline::run_linear(obs, &basis, args.data.top)?;
    present(&run, &args.output, &settings)?;
    export(&run, args.data.export_report.as_deref(), args.data.export_residuals.as_deref())
}

fn handle_curve(args: CurveArgs, settings: &Settings) -> Result<(), AppError> {
    let settings = apply_overrides(settings, &args.output)?;
    let obs = load_observations(&args.data.input, &columns(&args.data))?;
    let model = builtin_curve(&args.model)?;
    let run = pipeline::run_curve(obs, model.as_ref(), args.initial.as_deref(), &settings, args.data.top)?;
    present(&run, &args.output, &settings)?;
    export(&run, args.data.export_report.as_deref(), args.data.export_residuals.as_deref())
}

fn scan_request(model: &DensityArgs) -> Option<ScanRequest> {
    model.scan.map(|index| ScanRequest {
        index,
        points: model.scan_points,
    })
}

fn handle_unbinned(args: UnbinnedArgs, settings: &Settings) -> Result<(), AppError> {
    let mut settings = apply_overrides(settings, &args.output)?;
    if let Some(floor) = args.floor {
        settings.density_floor = floor;
        settings.validate()?;
    }
    let window = Window::new(args.model.lo, args.model.hi)?;
    let events = load_values(&args.input)?;
    let density = pipeline::build_density(args.model.density, window)?;
    let initial = match &args.model.initial {
        Some(v) => v.clone(),
        None => {
            let pts: Vec<(f64, f64)> = events.iter().map(|&x| (x, 1.0)).collect();
            pipeline::initial_guess(args.model.density, window, &pts)
        }
    };
    info!(initial = %fmt_vec(&initial), "starting unbinned fit");

    let run = pipeline::run_unbinned(density.as_ref(), &events, &initial, &settings, args.bins, scan_request(&args.model))?;
    present(&run, &args.output, &settings)?;
    export(&run, args.model.export_report.as_deref(), None)
}

fn handle_binned(args: BinnedArgs, settings: &Settings) -> Result<(), AppError> {
    let settings = apply_overrides(settings, &args.output)?;
    let counts = load_counts(&args.input)?;
    let histogram = Histogram::uniform(args.model.lo, args.model.hi, counts)?;
    let window = Window::new(args.model.lo, args.model.hi)?;
    let density = pipeline::build_density(args.model.density, window)?;
    let initial = match &args.model.initial {
        Some(v) => v.clone(),
        None => {
            let pts: Vec<(f64, f64)> = histogram
                .centers()
                .into_iter()
                .zip(histogram.counts())
                .map(|(x, &k)| (x, k as f64))
                .collect();
            pipeline::initial_guess(args.model.density, window, &pts)
        }
    };
    info!(initial = %fmt_vec(&initial), "starting binned fit");

    let run = pipeline::run_binned(density.as_ref(), &histogram, &initial, &settings, scan_request(&args.model))?;
    present(&run, &args.output, &settings)?;
    export(&run, args.model.export_report.as_deref(), args.export_residuals.as_deref())
}

/// One toy per estimator, all from a single seed.
fn handle_demo(args: DemoArgs, settings: &Settings) -> Result<(), AppError> {
    let mut settings = apply_overrides(settings, &args.output)?;
    if let Some(seed) = args.seed {
        settings.seed = seed;
    }
    let mut rng = crate::data::seeded_rng(settings.seed);
    println!("paramfit demo (seed {})\n", settings.seed);

    // Quadratic with constant errors.
    let basis = Basis::parse_list("1, x, x^2")?;
    let truth = [1.0, -0.5, 0.25];
    let x = linspace(0.0, 10.0, 25);
    let obs = crate::data::linear_dataset(&mut rng, &basis, &truth, &x, &vec![0.5; x.len()])?;
    show_demo(pipeline::run_linear(obs, &basis, 3)?, &truth, &args.output, &settings)?;

    // Exponential decay, fitted from a rough start.
    let truth = [4.0, 0.7, 0.5];
    let x = linspace(0.0, 6.0, 30);
    let obs = crate::data::curve_dataset(&mut rng, &ExponentialDecay, &truth, &x, &vec![0.05; x.len()])?;
    let run = pipeline::run_curve(obs, &ExponentialDecay, Some(&[1.0, 0.3, 0.0]), &settings, 3)?;
    show_demo(run, &truth, &args.output, &settings)?;

    // Gaussian peak over an exponential background, unbinned then binned.
    let window = Window::new(0.0, 10.0)?;
    let density = pipeline::build_density(DensityKind::Mixture, window)?;
    let truth = [0.3, 5.0, 0.5, 0.3];
    let start = [0.5, 4.5, 1.0, 0.1];

    let events = crate::data::sample_density(&mut rng, density.as_ref(), &truth, args.events)?;
    let scan = Some(ScanRequest { index: 0, points: 11 });
    let run = pipeline::run_unbinned(density.as_ref(), &events, &start, &settings, 40, scan)?;
    show_demo(run, &truth, &args.output, &settings)?;

    let histogram = crate::data::sample_histogram(&mut rng, density.as_ref(), &truth, args.events, 40)?;
    let run = pipeline::run_binned(density.as_ref(), &histogram, &start, &settings, None)?;
    show_demo(run, &truth, &args.output, &settings)?;
    Ok(())
}

fn show_demo(run: RunOutput, truth: &[f64], output: &OutputArgs, settings: &Settings) -> Result<(), AppError> {
    let pulls: Vec<f64> = run
        .report
        .values
        .iter()
        .zip(&run.report.errors)
        .zip(truth)
        .map(|((v, e), t)| (v - t) / e)
        .collect();
    let mut run = run;
    run.notes.push(format!("Truth: {}\nPulls: {}", fmt_vec(truth), fmt_vec(&pulls)));
    present(&run, output, settings)?;
    println!();
    Ok(())
}

fn present(run: &RunOutput, output: &OutputArgs, settings: &Settings) -> Result<(), AppError> {
    println!("{}", format_fit_summary(&run.report));
    for note in &run.notes {
        println!("{note}");
    }

    if !output.no_plot {
        let stdout = std::io::stdout();
        let mut sink = AsciiPlot::new(stdout.lock(), settings.plot_width, settings.plot_height);
        sink.render(&run.plot)?;
        sink.into_inner().flush().map_err(FitError::from)?;
    }
    Ok(())
}

fn export(run: &RunOutput, report: Option<&Path>, residuals: Option<&Path>) -> Result<(), AppError> {
    if let Some(path) = report {
        crate::io::report::write_report_json(path, &run.report)?;
        info!(path = %path.display(), "wrote fit report");
    }
    if let Some(path) = residuals {
        let Some((obs, fitted)) = &run.residuals else {
            return Err(AppError::new(2, "this fit has no per-point residuals to export"));
        };
        crate::io::export::write_residuals_csv(path, obs, fitted)?;
        info!(path = %path.display(), "wrote residuals");
    }
    Ok(())
}
