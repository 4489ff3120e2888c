//! Seeded toy datasets.
//!
//! Every generator takes the random source explicitly, so a run is
//! reproducible from its seed and two generators never share hidden state.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::{Histogram, ObservationSet};
use crate::error::{FitError, Result};
use crate::math::{Basis, linear_combination};
use crate::models::{CurveModel, Density};

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// `y_i = truth(x_i) + N(0, σ_i)`, with `σ` attached as per-point errors.
pub fn noisy_observations(rng: &mut StdRng, x: &[f64], sigma: &[f64], truth: impl Fn(f64) -> f64) -> Result<ObservationSet> {
    if x.len() != sigma.len() {
        return Err(FitError::Dimension(format!(
            "{} x values but {} uncertainties",
            x.len(),
            sigma.len()
        )));
    }
    let mut y = Vec::with_capacity(x.len());
    for (&xi, &si) in x.iter().zip(sigma) {
        let noise = Normal::new(0.0, si)
            .map_err(|e| FitError::InvalidInput(format!("noise distribution error for σ = {si}: {e}")))?;
        y.push(truth(xi) + noise.sample(rng));
    }
    ObservationSet::with_sigma(x.to_vec(), y, sigma.to_vec())
}

/// Linear-model toy: `Σ θ_j · basis_j(x)` plus Gaussian noise.
pub fn linear_dataset(rng: &mut StdRng, basis: &[Basis], theta: &[f64], x: &[f64], sigma: &[f64]) -> Result<ObservationSet> {
    if basis.len() != theta.len() {
        return Err(FitError::Dimension(format!(
            "{} basis functions but {} coefficients",
            basis.len(),
            theta.len()
        )));
    }
    noisy_observations(rng, x, sigma, |xi| linear_combination(basis, theta, xi))
}

/// Curve toy: `model(x; params)` plus Gaussian noise.
pub fn curve_dataset(
    rng: &mut StdRng,
    model: &dyn CurveModel,
    params: &[f64],
    x: &[f64],
    sigma: &[f64],
) -> Result<ObservationSet> {
    if params.len() != model.n_params() {
        return Err(FitError::Dimension(format!(
            "model takes {} parameters, got {}",
            model.n_params(),
            params.len()
        )));
    }
    noisy_observations(rng, x, sigma, |xi| model.eval(xi, params))
}

/// `n` independent draws from a density.
pub fn sample_density<D: Density + ?Sized>(rng: &mut StdRng, density: &D, params: &[f64], n: usize) -> Result<Vec<f64>> {
    if params.len() != density.n_params() {
        return Err(FitError::Dimension(format!(
            "density takes {} parameters, got {}",
            density.n_params(),
            params.len()
        )));
    }
    Ok((0..n).map(|_| density.sample(params, rng)).collect())
}

/// Histogram of `n` draws in `bins` equal-width bins spanning the density window.
pub fn sample_histogram<D: Density + ?Sized>(
    rng: &mut StdRng,
    density: &D,
    params: &[f64],
    n: usize,
    bins: usize,
) -> Result<Histogram> {
    if bins == 0 {
        return Err(FitError::InvalidInput("histogram needs at least one bin".into()));
    }
    let values = sample_density(rng, density, params, n)?;
    let w = density.window();
    let mut edges: Vec<f64> = (0..bins).map(|i| w.lo() + w.width() * i as f64 / bins as f64).collect();
    edges.push(w.hi());
    Histogram::from_values(edges, &values)
}
