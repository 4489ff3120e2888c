//! Finite-difference derivatives of scalar objectives.
//!
//! The Hessian is the basis for likelihood covariances, so it uses higher-order
//! stencils than a plain forward difference:
//!
//! - diagonal: five-point stencil, truncation error `O(h⁴)`
//! - off-diagonal: central four-point stencil, Richardson-extrapolated from
//!   steps `h` and `h/2` to cancel the `O(h²)` term
//!
//! Steps scale with the parameter magnitude: `h_i = rel_step · max(|x_i|, 1)`.

use finitediff::FiniteDiff;
use nalgebra::DMatrix;

use crate::error::{FitError, Result};
use crate::optim::Objective;

/// Default relative step. Near `ε^(1/6)` which balances `O(h⁴)` truncation
/// against `O(ε/h²)` cancellation for the five-point stencil.
pub const DEFAULT_REL_STEP: f64 = 2e-3;

fn step_sizes(point: &[f64], rel_step: f64) -> Vec<f64> {
    point.iter().map(|x| rel_step * x.abs().max(1.0)).collect()
}

fn shifted(point: &[f64], moves: &[(usize, f64)]) -> Vec<f64> {
    let mut p = point.to_vec();
    for &(i, d) in moves {
        p[i] += d;
    }
    p
}

/// Central-difference gradient.
pub fn gradient<O: Objective + ?Sized>(objective: &O, point: &[f64]) -> Vec<f64> {
    let f = |p: &Vec<f64>| objective.value(p);
    point.to_vec().central_diff(&f)
}

/// Hessian at `point` with the default step.
pub fn hessian<O: Objective + ?Sized>(objective: &O, point: &[f64]) -> Result<DMatrix<f64>> {
    hessian_with_step(objective, point, DEFAULT_REL_STEP)
}

/// Hessian at `point` with relative step `rel_step`.
///
/// Fails with `NonConvergentFit` when any entry is not finite, which happens
/// when the stencil leaves the region where the objective is defined.
pub fn hessian_with_step<O: Objective + ?Sized>(objective: &O, point: &[f64], rel_step: f64) -> Result<DMatrix<f64>> {
    let n = point.len();
    if n == 0 {
        return Err(FitError::Dimension("cannot differentiate a zero-dimensional objective".into()));
    }
    if !(rel_step.is_finite() && rel_step > 0.0) {
        return Err(FitError::InvalidInput(format!("invalid finite-difference step {rel_step}")));
    }
    let h = step_sizes(point, rel_step);
    let f0 = objective.value(point);
    let mut hess = DMatrix::<f64>::zeros(n, n);

    for i in 0..n {
        let hi = h[i];
        let fp1 = objective.value(&shifted(point, &[(i, hi)]));
        let fm1 = objective.value(&shifted(point, &[(i, -hi)]));
        let fp2 = objective.value(&shifted(point, &[(i, 2.0 * hi)]));
        let fm2 = objective.value(&shifted(point, &[(i, -2.0 * hi)]));
        hess[(i, i)] = (-fp2 + 16.0 * fp1 - 30.0 * f0 + 16.0 * fm1 - fm2) / (12.0 * hi * hi);

        for j in (i + 1)..n {
            let mixed = |scale: f64| {
                let (a, b) = (h[i] * scale, h[j] * scale);
                let fpp = objective.value(&shifted(point, &[(i, a), (j, b)]));
                let fpm = objective.value(&shifted(point, &[(i, a), (j, -b)]));
                let fmp = objective.value(&shifted(point, &[(i, -a), (j, b)]));
                let fmm = objective.value(&shifted(point, &[(i, -a), (j, -b)]));
                (fpp - fpm - fmp + fmm) / (4.0 * a * b)
            };
            let v = (4.0 * mixed(0.5) - mixed(1.0)) / 3.0;
            hess[(i, j)] = v;
            hess[(j, i)] = v;
        }
    }

    if let Some(((i, j), _)) = hess.iter().enumerate().map(|(k, v)| ((k % n, k / n), v)).find(|(_, v)| !v.is_finite()) {
        return Err(FitError::NonConvergentFit(format!(
            "Hessian entry ({i}, {j}) is not finite; the objective is undefined near the minimum"
        )));
    }

    Ok(hess)
}

/// Invert a Hessian of a negative log-likelihood into a covariance matrix.
///
/// Fails with `NonConvergentFit` when the Hessian is not positive-definite:
/// either the point is not a local minimum or numerical noise dominates.
pub fn covariance_from_hessian(hess: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let chol = nalgebra::Cholesky::new(hess.clone()).ok_or_else(|| {
        let eig = hess.clone().symmetric_eigen().eigenvalues;
        let min = eig.iter().copied().fold(f64::INFINITY, f64::min);
        FitError::NonConvergentFit(format!(
            "Hessian is not positive-definite (smallest eigenvalue {min:.3e})"
        ))
    })?;
    let cov = chol.inverse();
    if (0..cov.nrows()).any(|i| !(cov[(i, i)].is_finite() && cov[(i, i)] > 0.0)) {
        return Err(FitError::NonConvergentFit("covariance has non-positive variances".into()));
    }
    Ok(cov)
}
