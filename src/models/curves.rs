//! Curves `y = f(x; θ)` fitted by the least-squares refiner.

use crate::error::{FitError, Result};

/// A curve with a fixed number of parameters.
pub trait CurveModel: Sync {
    fn n_params(&self) -> usize;

    fn eval(&self, x: f64, params: &[f64]) -> f64;

    fn labels(&self) -> Vec<String> {
        (0..self.n_params()).map(|i| format!("p{i}")).collect()
    }

    fn predict(&self, xs: &[f64], params: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x, params)).collect()
    }
}

impl<M: CurveModel + ?Sized> CurveModel for Box<M> {
    fn n_params(&self) -> usize {
        (**self).n_params()
    }

    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        (**self).eval(x, params)
    }

    fn labels(&self) -> Vec<String> {
        (**self).labels()
    }
}

/// Adapter turning a closure into a [`CurveModel`].
pub struct FnCurve<F> {
    n_params: usize,
    labels: Option<Vec<String>>,
    f: F,
}

impl<F> FnCurve<F>
where
    F: Fn(f64, &[f64]) -> f64 + Sync,
{
    pub fn new(n_params: usize, f: F) -> Self {
        Self { n_params, labels: None, f }
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = Some(labels.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl<F> CurveModel for FnCurve<F>
where
    F: Fn(f64, &[f64]) -> f64 + Sync,
{
    fn n_params(&self) -> usize {
        self.n_params
    }

    fn eval(&self, x: f64, params: &[f64]) -> f64 {
        (self.f)(x, params)
    }

    fn labels(&self) -> Vec<String> {
        match &self.labels {
            Some(l) => l.clone(),
            None => (0..self.n_params).map(|i| format!("p{i}")).collect(),
        }
    }
}

/// `a + b·x`
#[derive(Debug, Clone, Copy, Default)]
pub struct Line;

impl CurveModel for Line {
    fn n_params(&self) -> usize {
        2
    }

    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        p[0] + p[1] * x
    }

    fn labels(&self) -> Vec<String> {
        vec!["intercept".into(), "slope".into()]
    }
}

/// `A·exp(-k·x) + c`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialDecay;

impl CurveModel for ExponentialDecay {
    fn n_params(&self) -> usize {
        3
    }

    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        p[0] * (-p[1] * x).exp() + p[2]
    }

    fn labels(&self) -> Vec<String> {
        vec!["amplitude".into(), "rate".into(), "offset".into()]
    }
}

/// `A·exp(-(x-μ)²/(2σ²)) + c`
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianPeak;

impl CurveModel for GaussianPeak {
    fn n_params(&self) -> usize {
        4
    }

    fn eval(&self, x: f64, p: &[f64]) -> f64 {
        let z = (x - p[1]) / p[2];
        p[0] * (-0.5 * z * z).exp() + p[3]
    }

    fn labels(&self) -> Vec<String> {
        vec!["amplitude".into(), "mean".into(), "width".into(), "baseline".into()]
    }
}

/// Look up a built-in curve by name (`line`, `exp-decay`, `gaussian`).
pub fn builtin_curve(name: &str) -> Result<Box<dyn CurveModel>> {
    match name.trim().to_ascii_lowercase().as_str() {
        "line" => Ok(Box::new(Line)),
        "exp-decay" | "exponential" => Ok(Box::new(ExponentialDecay)),
        "gaussian" | "peak" => Ok(Box::new(GaussianPeak)),
        other => Err(FitError::InvalidInput(format!(
            "unknown curve '{other}' (expected line, exp-decay or gaussian)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_evaluate() {
        assert_eq!(Line.eval(2.0, &[1.0, 3.0]), 7.0);
        assert!((ExponentialDecay.eval(0.0, &[2.0, 0.5, 1.0]) - 3.0).abs() < 1e-15);
        assert!((GaussianPeak.eval(1.0, &[4.0, 1.0, 0.5, 0.5]) - 4.5).abs() < 1e-15);
    }

    #[test]
    fn closure_curve_uses_default_labels() {
        let c = FnCurve::new(2, |x, p: &[f64]| p[0] * x.sin() + p[1]);
        assert_eq!(c.labels(), vec!["p0", "p1"]);
        let c = c.with_labels(&["amp", "shift"]);
        assert_eq!(c.labels(), vec!["amp", "shift"]);
        assert_eq!(c.predict(&[0.0], &[2.0, 1.0]), vec![1.0]);
    }

    #[test]
    fn builtin_lookup() {
        assert_eq!(builtin_curve("Gaussian").unwrap().n_params(), 4);
        assert!(builtin_curve("spline").is_err());
    }
}
