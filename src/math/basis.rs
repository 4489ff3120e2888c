//! Basis functions for linear models.
//!
//! A basis is evaluated column-wise over the whole sample so that vectorized
//! definitions (e.g. orthogonal polynomials built from the sample itself) fit
//! the same interface as pointwise ones.
//!
//! Numerical notes:
//! - `exp(-x)`-style terms are evaluated directly; callers fitting very large
//!   `x` should rescale the independent variable first.
//! - `ln` is only defined for positive `x` and yields NaN otherwise, which the
//!   design-matrix builder rejects.

use std::fmt;
use std::sync::Arc;

use crate::error::{FitError, Result};

type ColumnFn = dyn Fn(&[f64]) -> Vec<f64> + Send + Sync;

/// A named function of the independent variable.
#[derive(Clone)]
pub struct Basis {
    label: String,
    column: Arc<ColumnFn>,
}

impl Basis {
    /// Pointwise basis `x -> f(x)`.
    pub fn new(label: impl Into<String>, f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            column: Arc::new(move |xs: &[f64]| xs.iter().map(|&x| f(x)).collect()),
        }
    }

    /// Basis evaluated on the whole sample at once.
    ///
    /// The returned column must have one entry per sample.
    pub fn columnwise(
        label: impl Into<String>,
        f: impl Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            column: Arc::new(f),
        }
    }

    pub fn constant() -> Self {
        Self::new("1", |_| 1.0)
    }

    /// `x^k`.
    pub fn monomial(k: i32) -> Self {
        match k {
            0 => Self::constant(),
            1 => Self::new("x", |x| x),
            _ => Self::new(format!("x^{k}"), move |x| x.powi(k)),
        }
    }

    pub fn sin() -> Self {
        Self::new("sin(x)", f64::sin)
    }

    pub fn cos() -> Self {
        Self::new("cos(x)", f64::cos)
    }

    /// Parse a basis token as accepted on the command line.
    ///
    /// Accepted: `1`, `x`, `x^k`, `sin`, `cos`, `exp`, `exp(-x)`, `ln`.
    pub fn parse(token: &str) -> Result<Self> {
        let t = token.trim().to_ascii_lowercase().replace(' ', "");
        let basis = match t.as_str() {
            "1" | "const" => Self::constant(),
            "x" => Self::monomial(1),
            "sin" | "sin(x)" => Self::sin(),
            "cos" | "cos(x)" => Self::cos(),
            "exp" | "exp(x)" => Self::new("exp(x)", f64::exp),
            "exp(-x)" => Self::new("exp(-x)", |x: f64| (-x).exp()),
            "ln" | "ln(x)" | "log" => Self::new("ln(x)", f64::ln),
            _ => {
                let Some(power) = t.strip_prefix("x^") else {
                    return Err(FitError::InvalidInput(format!("unknown basis function '{token}'")));
                };
                let k: i32 = power
                    .parse()
                    .map_err(|_| FitError::InvalidInput(format!("invalid power in basis '{token}'")))?;
                Self::monomial(k)
            }
        };
        Ok(basis)
    }

    /// Parse a comma-separated list of basis tokens.
    pub fn parse_list(spec: &str) -> Result<Vec<Self>> {
        let out: Vec<Self> = spec
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect::<Result<_>>()?;
        if out.is_empty() {
            return Err(FitError::InvalidInput("basis list is empty".into()));
        }
        Ok(out)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Evaluate on every sample.
    pub fn evaluate(&self, xs: &[f64]) -> Vec<f64> {
        (self.column)(xs)
    }

    /// Evaluate at a single point (NaN if the basis misbehaves).
    pub fn value_at(&self, x: f64) -> f64 {
        self.evaluate(&[x]).first().copied().unwrap_or(f64::NAN)
    }
}

impl fmt::Debug for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Basis").field("label", &self.label).finish()
    }
}

/// Evaluate `Σ θ_j b_j(x)` at a single point.
pub fn linear_combination(basis: &[Basis], theta: &[f64], x: f64) -> f64 {
    basis.iter().zip(theta).map(|(b, t)| t * b.value_at(x)).sum()
}
