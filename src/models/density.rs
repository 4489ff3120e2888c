//! Probability densities normalized over a finite observation window.
//!
//! Every density integrates to one over its [`Window`] for any valid
//! parameter vector and is zero outside it. Parameters are passed as a flat
//! slice so densities can be driven by the generic minimizer:
//!
//! - [`TruncatedGaussian`]: `[mu, sigma]`
//! - [`TruncatedExponential`]: `[lambda]`, density `∝ exp(-lambda · (x - lo))`
//! - [`Mixture`]: `[p, signal params.., background params..]`
//!
//! Invalid parameters (e.g. `sigma <= 0`) evaluate to NaN; the minimizer
//! treats NaN as an infinitely bad point.

use rand::{Rng, RngCore};
use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};

use crate::domain::Bound;
use crate::error::{FitError, Result};

/// Closed interval `[lo, hi]` with `lo < hi`, both finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    lo: f64,
    hi: f64,
}

impl Window {
    pub fn new(lo: f64, hi: f64) -> Result<Self> {
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(FitError::InvalidInput(format!(
                "observation window must satisfy lo < hi (finite), got [{lo}, {hi}]"
            )));
        }
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> f64 {
        self.lo
    }

    pub fn hi(&self) -> f64 {
        self.hi
    }

    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lo && x <= self.hi
    }
}

/// A parametric density on a fixed window.
pub trait Density: Send + Sync {
    fn n_params(&self) -> usize;

    fn labels(&self) -> Vec<String>;

    fn window(&self) -> Window;

    /// Natural constraints of each parameter (e.g. `sigma >= 0`).
    fn default_bounds(&self) -> Vec<Bound>;

    fn pdf(&self, x: f64, params: &[f64]) -> f64;

    /// Cumulative distribution, `0` at `window().lo()` and `1` at `window().hi()`.
    fn cdf(&self, x: f64, params: &[f64]) -> f64;

    /// Draw one value by bisecting the CDF.
    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> f64 {
        let target: f64 = rng.r#gen();
        let w = self.window();
        let (mut lo, mut hi) = (w.lo(), w.hi());
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.cdf(mid, params) < target {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo <= 1e-13 * w.width() {
                break;
            }
        }
        0.5 * (lo + hi)
    }
}

/// Standard normal CDF.
fn phi_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / SQRT_2)
}

/// Gaussian truncated to the window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncatedGaussian {
    window: Window,
}

impl TruncatedGaussian {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    fn norm(&self, mu: f64, sigma: f64) -> f64 {
        phi_cdf((self.window.hi - mu) / sigma) - phi_cdf((self.window.lo - mu) / sigma)
    }
}

impl Density for TruncatedGaussian {
    fn n_params(&self) -> usize {
        2
    }

    fn labels(&self) -> Vec<String> {
        vec!["mu".into(), "sigma".into()]
    }

    fn window(&self) -> Window {
        self.window
    }

    fn default_bounds(&self) -> Vec<Bound> {
        vec![Bound::between(self.window.lo, self.window.hi), Bound::at_least(0.0)]
    }

    fn pdf(&self, x: f64, params: &[f64]) -> f64 {
        let (mu, sigma) = (params[0], params[1]);
        if !(sigma > 0.0) {
            return f64::NAN;
        }
        if !self.window.contains(x) {
            return 0.0;
        }
        let z = (x - mu) / sigma;
        let norm = self.norm(mu, sigma);
        if norm <= 0.0 {
            return 0.0;
        }
        (-0.5 * z * z).exp() / (sigma * (2.0 * PI).sqrt() * norm)
    }

    fn cdf(&self, x: f64, params: &[f64]) -> f64 {
        let (mu, sigma) = (params[0], params[1]);
        if !(sigma > 0.0) {
            return f64::NAN;
        }
        let x = x.clamp(self.window.lo, self.window.hi);
        let norm = self.norm(mu, sigma);
        if norm <= 0.0 {
            return f64::NAN;
        }
        ((phi_cdf((x - mu) / sigma) - phi_cdf((self.window.lo - mu) / sigma)) / norm).clamp(0.0, 1.0)
    }
}

/// Exponential decay truncated to the window.
///
/// Normalization is `(1 - e^{-λ(b-a)}) / λ`, evaluated with `exp_m1` so that
/// small `λ` stays accurate; `λ = 0` is the uniform density. Negative `λ`
/// (rising exponential) is allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncatedExponential {
    window: Window,
}

impl TruncatedExponential {
    pub fn new(window: Window) -> Self {
        Self { window }
    }
}

/// `λ` below which the density is treated as uniform.
const UNIFORM_LIMIT: f64 = 1e-12;

impl Density for TruncatedExponential {
    fn n_params(&self) -> usize {
        1
    }

    fn labels(&self) -> Vec<String> {
        vec!["lambda".into()]
    }

    fn window(&self) -> Window {
        self.window
    }

    fn default_bounds(&self) -> Vec<Bound> {
        vec![Bound::FREE]
    }

    fn pdf(&self, x: f64, params: &[f64]) -> f64 {
        let lambda = params[0];
        if !self.window.contains(x) {
            return 0.0;
        }
        let w = self.window.width();
        if lambda.abs() < UNIFORM_LIMIT {
            return 1.0 / w;
        }
        // λ e^{-λ(x-a)} / (1 - e^{-λw})
        -lambda * (-lambda * (x - self.window.lo)).exp() / (-lambda * w).exp_m1()
    }

    fn cdf(&self, x: f64, params: &[f64]) -> f64 {
        let lambda = params[0];
        let x = x.clamp(self.window.lo, self.window.hi);
        let w = self.window.width();
        if lambda.abs() < UNIFORM_LIMIT {
            return (x - self.window.lo) / w;
        }
        ((-lambda * (x - self.window.lo)).exp_m1() / (-lambda * w).exp_m1()).clamp(0.0, 1.0)
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> f64 {
        let lambda = params[0];
        let u: f64 = rng.r#gen();
        let w = self.window.width();
        if lambda.abs() < UNIFORM_LIMIT {
            return self.window.lo + u * w;
        }
        let x = self.window.lo - (u * (-lambda * w).exp_m1()).ln_1p() / lambda;
        x.clamp(self.window.lo, self.window.hi)
    }
}

/// `p · signal + (1 - p) · background` on a shared window.
#[derive(Debug, Clone)]
pub struct Mixture<S, B> {
    signal: S,
    background: B,
}

impl<S: Density, B: Density> Mixture<S, B> {
    pub fn new(signal: S, background: B) -> Result<Self> {
        if signal.window() != background.window() {
            return Err(FitError::InvalidInput(format!(
                "mixture components have different windows: {:?} vs {:?}",
                signal.window(),
                background.window()
            )));
        }
        Ok(Self { signal, background })
    }

    pub fn signal(&self) -> &S {
        &self.signal
    }

    pub fn background(&self) -> &B {
        &self.background
    }

    fn split<'p>(&self, params: &'p [f64]) -> (f64, &'p [f64], &'p [f64]) {
        let ns = self.signal.n_params();
        (params[0], &params[1..1 + ns], &params[1 + ns..])
    }
}

impl<S: Density, B: Density> Density for Mixture<S, B> {
    fn n_params(&self) -> usize {
        1 + self.signal.n_params() + self.background.n_params()
    }

    fn labels(&self) -> Vec<String> {
        let mut labels = vec!["fraction".to_string()];
        labels.extend(self.signal.labels().into_iter().map(|l| format!("signal.{l}")));
        labels.extend(self.background.labels().into_iter().map(|l| format!("background.{l}")));
        labels
    }

    fn window(&self) -> Window {
        self.signal.window()
    }

    fn default_bounds(&self) -> Vec<Bound> {
        let mut bounds = vec![Bound::between(0.0, 1.0)];
        bounds.extend(self.signal.default_bounds());
        bounds.extend(self.background.default_bounds());
        bounds
    }

    fn pdf(&self, x: f64, params: &[f64]) -> f64 {
        let (p, s, b) = self.split(params);
        if !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        p * self.signal.pdf(x, s) + (1.0 - p) * self.background.pdf(x, b)
    }

    fn cdf(&self, x: f64, params: &[f64]) -> f64 {
        let (p, s, b) = self.split(params);
        if !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        p * self.signal.cdf(x, s) + (1.0 - p) * self.background.cdf(x, b)
    }

    fn sample(&self, params: &[f64], rng: &mut dyn RngCore) -> f64 {
        let (p, s, b) = self.split(params);
        let pick: f64 = rng.r#gen();
        if pick < p {
            self.signal.sample(s, rng)
        } else {
            self.background.sample(b, rng)
        }
    }
}
