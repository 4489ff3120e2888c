//! Reporting utilities: residuals, pull rankings and formatted terminal output.

pub mod format;

pub use format::*;

use crate::domain::ObservationSet;
use crate::error::{FitError, Result};

/// Observed vs fitted value at one data point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub x: f64,
    pub y: f64,
    pub fitted: f64,
    pub residual: f64,
    /// `residual / σ` when the observation has a per-point σ.
    pub pull: Option<f64>,
}

pub fn compute_residuals(obs: &ObservationSet, fitted: &[f64]) -> Result<Vec<Residual>> {
    if fitted.len() != obs.len() {
        return Err(FitError::Dimension(format!(
            "{} fitted values for {} observations",
            fitted.len(),
            obs.len()
        )));
    }
    let sigmas = obs.sigmas();
    let mut out = Vec::with_capacity(obs.len());
    for i in 0..obs.len() {
        if !fitted[i].is_finite() {
            return Err(FitError::InvalidInput(format!("non-finite model value at x = {}", obs.x[i])));
        }
        let residual = obs.y[i] - fitted[i];
        out.push(Residual {
            x: obs.x[i],
            y: obs.y[i],
            fitted: fitted[i],
            residual,
            pull: sigmas.as_ref().map(|s| residual / s[i]),
        });
    }
    Ok(out)
}

/// The `top_n` points farthest from the model, by |pull| (or |residual|
/// without uncertainties).
pub fn largest_deviations(residuals: &[Residual], top_n: usize) -> Vec<Residual> {
    let size = |r: &Residual| r.pull.unwrap_or(r.residual).abs();
    let mut sorted = residuals.to_vec();
    sorted.sort_by(|a, b| size(b).total_cmp(&size(a)));
    sorted.truncate(top_n);
    sorted
}
