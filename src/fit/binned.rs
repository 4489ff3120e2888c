//! Binned fits of a density to a histogram.
//!
//! The expected count in bin `i = [a_i, b_i)` is
//!
//! ```text
//! λ_i(θ) = N · (CDF(b_i; θ) − CDF(a_i; θ))
//! ```
//!
//! with `N` the histogram total. [`BinnedPoissonNll`] is the estimator to use:
//! each count is Poisson distributed, so
//!
//! ```text
//! NLL(θ) = Σ [λ_i − k_i ln λ_i + ln Γ(k_i + 1)]
//! ```
//!
//! [`BinHeightLeastSquares`] fits the same heights by least squares and is
//! kept only to compare against:
//!
//! - unweighted `Σ (k_i − λ_i)²` is unbiased but ignores that bins with more
//!   entries fluctuate more, so it is inefficient
//! - Neyman `Σ (k_i − λ_i)² / k_i` uses the observed count as variance, which
//!   gives downward fluctuations larger weight and biases the fitted
//!   normalization low (by roughly one count per bin)

use statrs::function::gamma::ln_gamma;

use crate::domain::Histogram;
use crate::error::{FitError, Result};
use crate::models::Density;
use crate::optim::Objective;

/// Relative tolerance when matching the density window to the histogram range.
const RANGE_TOL: f64 = 1e-9;

fn check_range<D: Density + ?Sized>(density: &D, histogram: &Histogram) -> Result<()> {
    let w = density.window();
    let (lo, hi) = histogram.range();
    let tol = RANGE_TOL * w.width();
    if (w.lo() - lo).abs() > tol || (w.hi() - hi).abs() > tol {
        return Err(FitError::InvalidInput(format!(
            "density window [{}, {}] does not match histogram range [{lo}, {hi}]",
            w.lo(),
            w.hi()
        )));
    }
    Ok(())
}

fn expected_counts<D: Density + ?Sized>(density: &D, edges: &[f64], total: f64, params: &[f64]) -> Vec<f64> {
    let cdf: Vec<f64> = edges.iter().map(|&e| density.cdf(e, params)).collect();
    cdf.windows(2).map(|c| total * (c[1] - c[0])).collect()
}

/// Poisson negative log-likelihood of a histogram.
pub struct BinnedPoissonNll<'a, D: Density + ?Sized> {
    density: &'a D,
    histogram: &'a Histogram,
    total: f64,
    ln_factorials: Vec<f64>,
}

impl<'a, D: Density + ?Sized> BinnedPoissonNll<'a, D> {
    pub fn new(density: &'a D, histogram: &'a Histogram) -> Result<Self> {
        check_range(density, histogram)?;
        let total = histogram.total();
        if total == 0 {
            return Err(FitError::InvalidInput("histogram is empty".into()));
        }
        let ln_factorials = histogram.counts().iter().map(|&k| ln_gamma(k as f64 + 1.0)).collect();
        Ok(Self {
            density,
            histogram,
            total: total as f64,
            ln_factorials,
        })
    }

    pub fn density(&self) -> &D {
        self.density
    }

    pub fn histogram(&self) -> &Histogram {
        self.histogram
    }

    /// `λ_i(θ)` for every bin.
    pub fn expected(&self, params: &[f64]) -> Vec<f64> {
        expected_counts(self.density, self.histogram.edges(), self.total, params)
    }
}

impl<D: Density + ?Sized> Objective for BinnedPoissonNll<'_, D> {
    fn value(&self, params: &[f64]) -> f64 {
        if params.len() != self.density.n_params() {
            return f64::NAN;
        }
        let mut nll = 0.0;
        for ((lambda, &k), ln_fact) in self
            .expected(params)
            .into_iter()
            .zip(self.histogram.counts())
            .zip(&self.ln_factorials)
        {
            if lambda.is_nan() {
                return f64::NAN;
            }
            if lambda <= 0.0 {
                // P(0; 0) = 1; any observed entry in an empty bin is impossible.
                if k == 0 {
                    continue;
                }
                return f64::INFINITY;
            }
            nll += lambda - k as f64 * lambda.ln() + ln_fact;
        }
        nll
    }
}

/// Weighting of the bin-height least-squares baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightWeighting {
    Unweighted,
    /// `1 / max(k, 1)`; empty bins get unit weight.
    Neyman,
}

/// Least squares on bin heights with a free normalization.
///
/// Parameters are `[scale, density params..]` with
/// `λ_i = scale · (CDF(b_i) − CDF(a_i))`. Comparison baseline only.
pub struct BinHeightLeastSquares<'a, D: Density + ?Sized> {
    density: &'a D,
    histogram: &'a Histogram,
    weighting: HeightWeighting,
}

impl<'a, D: Density + ?Sized> BinHeightLeastSquares<'a, D> {
    pub fn new(density: &'a D, histogram: &'a Histogram, weighting: HeightWeighting) -> Result<Self> {
        check_range(density, histogram)?;
        Ok(Self {
            density,
            histogram,
            weighting,
        })
    }
}

impl<D: Density + ?Sized> Objective for BinHeightLeastSquares<'_, D> {
    fn value(&self, params: &[f64]) -> f64 {
        if params.len() != self.density.n_params() + 1 {
            return f64::NAN;
        }
        let expected = expected_counts(self.density, self.histogram.edges(), params[0], &params[1..]);
        expected
            .iter()
            .zip(self.histogram.counts())
            .map(|(lambda, &k)| {
                let k = k as f64;
                let w = match self.weighting {
                    HeightWeighting::Unweighted => 1.0,
                    HeightWeighting::Neyman => 1.0 / k.max(1.0),
                };
                w * (k - lambda).powi(2)
            })
            .sum()
    }
}
