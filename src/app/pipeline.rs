//! Fit workflows shared by the subcommands and the demo.
//!
//! Each `run_*` function takes loaded data, fits it, and returns everything
//! the front-end prints or exports. Nothing here writes to stdout.

use tracing::debug;

use crate::cli::DensityKind;
use crate::config::Settings;
use crate::domain::{Bound, FitMethod, FitReport, Histogram, ObservationSet};
use crate::error::{FitError, Result};
use crate::fit::{
    BinnedPoissonNll, LevenbergMarquardt, LikelihoodFit, MaximumLikelihood, NonlinearSolver, ScanPoint, UnbinnedNll,
    fit_linear, linspace, profile_scan,
};
use crate::math::{Basis, linear_combination};
use crate::models::{CurveModel, Density, Mixture, TruncatedExponential, TruncatedGaussian, Window};
use crate::optim::{NelderMead, Objective};
use crate::plot::PlotPayload;
use crate::report::{compute_residuals, format_deviations, format_scan, largest_deviations};

/// Points used to draw a model curve.
const CURVE_SAMPLES: usize = 200;

/// Half-width of the default profile range, in standard errors.
const SCAN_HALF_WIDTH: f64 = 3.0;

/// All computed outputs of one fit.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: FitReport,
    pub plot: PlotPayload,
    /// Extra text sections printed after the summary.
    pub notes: Vec<String>,
    /// Data points and model values at those points, for residual export.
    pub residuals: Option<(ObservationSet, Vec<f64>)>,
}

/// Profile request: parameter index and number of grid points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub index: usize,
    pub points: usize,
}

pub fn run_linear(obs: ObservationSet, basis: &[Basis], top: usize) -> Result<RunOutput> {
    let fit = fit_linear(&obs, basis)?;
    let report = FitReport::new(FitMethod::LinearLeastSquares, &fit.estimate, fit.goodness(), obs.len());
    let residuals = compute_residuals(&obs, &fit.fitted)?;
    let theta = fit.estimate.values.clone();
    let plot = observation_plot("Linear least squares", &obs, |x| linear_combination(basis, &theta, x));

    Ok(RunOutput {
        report,
        plot,
        notes: vec![deviation_note(&residuals, top)],
        residuals: Some((obs, fit.fitted)),
    })
}

pub fn run_curve(
    obs: ObservationSet,
    model: &dyn CurveModel,
    initial: Option<&[f64]>,
    settings: &Settings,
    top: usize,
) -> Result<RunOutput> {
    let solver = LevenbergMarquardt::default()
        .with_max_iters(settings.max_iters)
        .with_tolerance(settings.tolerance);
    let fit = solver.fit(model, &obs, initial)?;
    let report = FitReport::new(FitMethod::NonlinearLeastSquares, &fit.estimate, fit.goodness(), obs.len());
    let fitted = model.predict(&obs.x, &fit.estimate.values);
    let residuals = compute_residuals(&obs, &fitted)?;
    let params = fit.estimate.values.clone();
    let plot = observation_plot("Nonlinear least squares", &obs, |x| model.eval(x, &params));

    let mut notes = vec![format!("Residual evaluations: {}", fit.iterations)];
    notes.push(deviation_note(&residuals, top));
    Ok(RunOutput {
        report,
        plot,
        notes,
        residuals: Some((obs, fitted)),
    })
}

/// The density family on `window`.
pub fn build_density(kind: DensityKind, window: Window) -> Result<Box<dyn Density>> {
    Ok(match kind {
        DensityKind::Gaussian => Box::new(TruncatedGaussian::new(window)),
        DensityKind::Exponential => Box::new(TruncatedExponential::new(window)),
        DensityKind::Mixture => Box::new(Mixture::new(TruncatedGaussian::new(window), TruncatedExponential::new(window))?),
    })
}

/// Starting point from the weighted mean and spread of the data.
pub fn initial_guess(kind: DensityKind, window: Window, points: &[(f64, f64)]) -> Vec<f64> {
    let total: f64 = points.iter().map(|(_, w)| w).sum();
    let (mean, sd) = if total > 0.0 {
        let mean = points.iter().map(|(x, w)| x * w).sum::<f64>() / total;
        let var = points.iter().map(|(x, w)| w * (x - mean).powi(2)).sum::<f64>() / total;
        (mean, var.sqrt())
    } else {
        (0.5 * (window.lo() + window.hi()), 0.25 * window.width())
    };
    let sd = sd.max(1e-3 * window.width());
    // A flat sample has mean offset width/2; anything below that decays.
    let offset = mean - window.lo();
    let lambda = if offset < 0.45 * window.width() { 1.0 / offset.max(1e-3 * window.width()) } else { 0.1 / window.width() };

    match kind {
        DensityKind::Gaussian => vec![mean, sd],
        DensityKind::Exponential => vec![lambda],
        DensityKind::Mixture => vec![0.5, mean, 0.5 * sd, 0.1 / window.width()],
    }
}

fn likelihood_fitter(settings: &Settings) -> MaximumLikelihood<NelderMead> {
    MaximumLikelihood::new(
        NelderMead::default()
            .with_max_iters(settings.max_iters)
            .with_tolerance(settings.tolerance),
    )
}

pub fn run_unbinned(
    density: &dyn Density,
    events: &[f64],
    initial: &[f64],
    settings: &Settings,
    bins: usize,
    scan: Option<ScanRequest>,
) -> Result<RunOutput> {
    let nll = UnbinnedNll::new(density, events)?.with_floor(settings.density_floor)?;
    let fitter = likelihood_fitter(settings);
    let fit = fitter.fit_unbinned(&nll, initial)?;
    let report = FitReport::new(FitMethod::UnbinnedLikelihood, &fit.estimate, fit.goodness(), events.len());

    let window = density.window();
    let display = Histogram::from_values(linspace(window.lo(), window.hi(), bins.max(1) + 1), events)?;
    let plot = density_plot("Unbinned maximum likelihood", density, &display, &fit.estimate.values);

    let mut notes = vec![format!(
        "Minimizer: {} iterations, {} evaluations",
        fit.diagnostics.iterations, fit.diagnostics.evaluations
    )];
    if let Some(b) = fit.floor.filter(|b| b.floor_dominated > 0) {
        notes.push(format!(
            "Density floor {} dominated {} of {} events",
            nll.floor(),
            b.floor_dominated,
            b.events
        ));
    }
    if let Some(req) = scan {
        notes.push(scan_note(&fitter, &nll, &fit, &density.default_bounds(), req)?);
    }

    Ok(RunOutput {
        report,
        plot,
        notes,
        residuals: None,
    })
}

pub fn run_binned(
    density: &dyn Density,
    histogram: &Histogram,
    initial: &[f64],
    settings: &Settings,
    scan: Option<ScanRequest>,
) -> Result<RunOutput> {
    let nll = BinnedPoissonNll::new(density, histogram)?;
    let fitter = likelihood_fitter(settings);
    let fit = fitter.fit_binned(&nll, initial)?;
    let report = FitReport::new(FitMethod::BinnedLikelihood, &fit.estimate, fit.goodness(), histogram.n_bins());
    let plot = density_plot("Binned Poisson likelihood", density, histogram, &fit.estimate.values);

    let mut notes = vec![format!(
        "Minimizer: {} iterations, {} evaluations",
        fit.diagnostics.iterations, fit.diagnostics.evaluations
    )];
    if let Some(req) = scan {
        notes.push(scan_note(&fitter, &nll, &fit, &density.default_bounds(), req)?);
    }

    // Counts as observations with √max(k, 1) errors, for the residual export.
    let counts: Vec<f64> = histogram.counts().iter().map(|&k| k as f64).collect();
    let sigma: Vec<f64> = counts.iter().map(|k| k.max(1.0).sqrt()).collect();
    let obs = ObservationSet::with_sigma(histogram.centers(), counts, sigma)?;
    let expected = nll.expected(&fit.estimate.values);

    Ok(RunOutput {
        report,
        plot,
        notes,
        residuals: Some((obs, expected)),
    })
}

/// Profile grid of `±SCAN_HALF_WIDTH` standard errors, clipped inside the bound.
pub fn scan_grid(value: f64, error: f64, bound: &Bound, points: usize) -> Result<Vec<f64>> {
    if !(error.is_finite() && error > 0.0) {
        return Err(FitError::InvalidInput(format!("cannot scan a parameter with error {error}")));
    }
    let margin = 1e-6 * error;
    let mut lo = value - SCAN_HALF_WIDTH * error;
    let mut hi = value + SCAN_HALF_WIDTH * error;
    if let Some(l) = bound.lower {
        lo = lo.max(l + margin);
    }
    if let Some(u) = bound.upper {
        hi = hi.min(u - margin);
    }
    if hi <= lo {
        return Err(FitError::InvalidBounds(format!("no room to scan around {value} inside its bound")));
    }
    Ok(linspace(lo, hi, points.max(2)))
}

fn scan_note(
    fitter: &MaximumLikelihood<NelderMead>,
    objective: &dyn Objective,
    fit: &LikelihoodFit,
    bounds: &[Bound],
    req: ScanRequest,
) -> Result<String> {
    let est = &fit.estimate;
    if req.index >= est.len() {
        return Err(FitError::Dimension(format!(
            "scan index {} but the model has {} parameters",
            req.index,
            est.len()
        )));
    }
    let grid = scan_grid(est.values[req.index], est.errors()[req.index], &bounds[req.index], req.points)?;
    let points: Vec<ScanPoint> = profile_scan(fitter.minimizer(), objective, &est.values, bounds, req.index, &grid)?;
    debug!(index = req.index, points = points.len(), "profile scan finished");
    Ok(format_scan(&est.labels[req.index], &points))
}

fn deviation_note(residuals: &[crate::report::Residual], top: usize) -> String {
    format!("Largest deviations:\n{}", format_deviations(&largest_deviations(residuals, top)))
}

fn observation_plot(title: &str, obs: &ObservationSet, f: impl Fn(f64) -> f64) -> PlotPayload {
    let payload = PlotPayload::new(title).with_observations(obs);
    let (lo, hi) = payload.x_range().unwrap_or_else(|| {
        let x0 = obs.x.first().copied().unwrap_or(0.0);
        (x0 - 0.5, x0 + 0.5)
    });
    payload.with_curve(lo, hi, CURVE_SAMPLES, f)
}

/// Histogram points with the expected counts per unit bin drawn as a curve.
fn density_plot(title: &str, density: &dyn Density, histogram: &Histogram, params: &[f64]) -> PlotPayload {
    let (lo, hi) = histogram.range();
    let scale = histogram.total() as f64 * (hi - lo) / histogram.n_bins() as f64;
    PlotPayload::new(title)
        .with_histogram(histogram)
        .with_curve(lo, hi, CURVE_SAMPLES, |x| scale * density.pdf(x, params))
}
