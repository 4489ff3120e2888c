//! Profile-likelihood scans.
//!
//! For each grid value of one parameter, the objective is minimized over the
//! remaining parameters. Grid points are independent, so they run on the
//! rayon pool; each point starts from the global best fit.

use rayon::prelude::*;
use tracing::debug;

use crate::domain::Bound;
use crate::error::{FitError, Result};
use crate::optim::{FixedParameter, Minimizer, Objective};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanPoint {
    pub value: f64,
    pub nll: f64,
    /// `nll` minus the smallest value seen (best fit or any scan point).
    pub delta_nll: f64,
}

/// `n` evenly spaced values from `lo` to `hi` inclusive.
pub fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![lo],
        _ => (0..n).map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64).collect(),
    }
}

/// Profile `objective` along parameter `index`.
///
/// `best` is the global minimum used as the starting point of every
/// conditional fit. Grid values must respect the bound of `index`.
pub fn profile_scan<M: Minimizer>(
    minimizer: &M,
    objective: &dyn Objective,
    best: &[f64],
    bounds: &[Bound],
    index: usize,
    grid: &[f64],
) -> Result<Vec<ScanPoint>> {
    if index >= best.len() || bounds.len() != best.len() {
        return Err(FitError::Dimension(format!(
            "scan index {index} with {} parameters and {} bounds",
            best.len(),
            bounds.len()
        )));
    }
    if let Some(v) = grid.iter().find(|v| !bounds[index].contains(**v) || !v.is_finite()) {
        return Err(FitError::InvalidBounds(format!("scan value {v} outside the bound of parameter {index}")));
    }

    let start: Vec<f64> = best.iter().enumerate().filter(|(i, _)| *i != index).map(|(_, v)| *v).collect();
    let reduced_bounds: Vec<Bound> = bounds.iter().enumerate().filter(|(i, _)| *i != index).map(|(_, b)| *b).collect();

    let raw: Vec<(f64, f64)> = grid
        .par_iter()
        .map(|&value| {
            let fixed = FixedParameter::new(objective, index, value);
            let nll = if start.is_empty() {
                fixed.value(&[])
            } else {
                minimizer.minimize(&fixed, &start, &reduced_bounds)?.into_result()?.value
            };
            debug!(index, value, nll, "profile point");
            Ok((value, nll))
        })
        .collect::<Result<Vec<_>>>()?;

    let reference = raw.iter().map(|(_, nll)| *nll).fold(objective.value(best), f64::min);
    Ok(raw
        .into_iter()
        .map(|(value, nll)| ScanPoint {
            value,
            nll,
            delta_nll: nll - reference,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::NelderMead;
    use approx::assert_relative_eq;

    #[test]
    fn linspace_includes_endpoints() {
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn profile_of_correlated_quadratic() {
        // f = ½ pᵀ H p with H = [[2, 1], [1, 2]]; profiling p1 out gives
        // Δf(p0) = ½ (2 - 1/2) p0² = 0.75 p0².
        let f = |p: &[f64]| p[0] * p[0] + p[0] * p[1] + p[1] * p[1];
        let grid = linspace(-1.0, 1.0, 5);
        let scan = profile_scan(&NelderMead::default(), &f, &[0.0, 0.0], &[Bound::FREE, Bound::FREE], 0, &grid).unwrap();
        assert_eq!(scan.len(), 5);
        for pt in &scan {
            assert_relative_eq!(pt.delta_nll, 0.75 * pt.value * pt.value, epsilon = 1e-6);
        }
        let min = scan.iter().min_by(|a, b| a.nll.total_cmp(&b.nll)).unwrap();
        assert_eq!(min.value, 0.0);
    }

    #[test]
    fn single_parameter_scan_evaluates_directly() {
        let f = |p: &[f64]| (p[0] - 2.0).powi(2);
        let scan = profile_scan(&NelderMead::default(), &f, &[2.0], &[Bound::FREE], 0, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(scan.iter().map(|p| p.delta_nll).collect::<Vec<_>>(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn grid_outside_bound_is_rejected() {
        let f = |p: &[f64]| p[0] * p[0];
        let err = profile_scan(&NelderMead::default(), &f, &[0.5], &[Bound::between(0.0, 1.0)], 0, &[2.0]).unwrap_err();
        assert!(matches!(err, FitError::InvalidBounds(_)));
    }
}
