//! Scalar objectives and box constraints shared by all minimizers.

use crate::domain::Bound;
use crate::error::{FitError, Result};

/// A scalar function of the parameter vector to be minimized.
///
/// Implementations must be side-effect free: the same input always yields the
/// same value, so independent evaluations can run on different threads.
pub trait Objective: Sync {
    fn value(&self, params: &[f64]) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn value(&self, params: &[f64]) -> f64 {
        self(params)
    }
}

/// Objective with one parameter pinned to a fixed value.
///
/// The wrapped objective sees the full vector; callers optimize over the
/// remaining `n - 1` coordinates.
pub struct FixedParameter<'a, O: Objective + ?Sized> {
    inner: &'a O,
    index: usize,
    value: f64,
}

impl<'a, O: Objective + ?Sized> FixedParameter<'a, O> {
    pub fn new(inner: &'a O, index: usize, value: f64) -> Self {
        Self { inner, index, value }
    }

    /// Insert the pinned value into a reduced parameter vector.
    pub fn expand(&self, reduced: &[f64]) -> Vec<f64> {
        let mut full = Vec::with_capacity(reduced.len() + 1);
        full.extend_from_slice(&reduced[..self.index.min(reduced.len())]);
        full.push(self.value);
        if self.index < reduced.len() {
            full.extend_from_slice(&reduced[self.index..]);
        }
        full
    }
}

impl<O: Objective + ?Sized> Objective for FixedParameter<'_, O> {
    fn value(&self, params: &[f64]) -> f64 {
        self.inner.value(&self.expand(params))
    }
}

/// Check that `bounds` are well formed and contain `initial`.
pub fn validate_bounds(initial: &[f64], bounds: &[Bound]) -> Result<()> {
    if bounds.len() != initial.len() {
        return Err(FitError::Dimension(format!(
            "{} bounds for {} parameters",
            bounds.len(),
            initial.len()
        )));
    }
    for (i, (x, b)) in initial.iter().zip(bounds).enumerate() {
        if !x.is_finite() {
            return Err(FitError::InvalidInput(format!("initial parameter {i} is not finite")));
        }
        if let (Some(lo), Some(hi)) = (b.lower, b.upper) {
            if lo > hi {
                return Err(FitError::InvalidBounds(format!(
                    "parameter {i}: lower bound {lo} > upper bound {hi}"
                )));
            }
        }
        if b.lower.is_some_and(f64::is_nan) || b.upper.is_some_and(f64::is_nan) {
            return Err(FitError::InvalidBounds(format!("parameter {i}: bound is NaN")));
        }
        if !b.contains(*x) {
            return Err(FitError::InvalidBounds(format!(
                "parameter {i}: initial value {x} outside [{}, {}]",
                b.lower.map_or("-inf".to_string(), |v| v.to_string()),
                b.upper.map_or("+inf".to_string(), |v| v.to_string()),
            )));
        }
    }
    Ok(())
}
