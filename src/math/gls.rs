//! Generalized least squares.
//!
//! We solve problems of the form:
//!
//! ```text
//! minimize (y - Aθ)ᵀ W (y - Aθ)
//! ```
//!
//! where `W` is the inverse covariance of `y`. Setting the gradient to zero
//! gives the normal equations `(AᵀWA) θ = AᵀWy`, hence
//!
//! ```text
//! θ̂      = (AᵀWA)⁻¹ AᵀW y
//! cov(θ̂) = (AᵀWA)⁻¹
//! ```
//!
//! Implementation choices:
//! - The normal matrix is factorized with Cholesky; its inverse is the
//!   covariance, so one factorization serves both outputs.
//! - Rank deficiency is detected before factorizing, on the Jacobi-scaled
//!   normal matrix. Exactly collinear columns otherwise survive Cholesky with a
//!   rounding-sized pivot and produce huge, meaningless estimates.
//! - Unlike a pseudo-inverse solve we never return a minimum-norm answer for a
//!   singular system: that would silently hide an unidentifiable model.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

use crate::domain::{ObservationSet, ParamEstimate, Uncertainty};
use crate::error::{FitError, Result};

/// Smallest accepted eigenvalue ratio of a scaled normal or weight matrix.
const RCOND_MIN: f64 = 1e-12;

/// Relative tolerance for the symmetry check on user-supplied matrices.
const SYMMETRY_TOL: f64 = 1e-10;

/// Positive-definite weight matrix `W` (inverse observation covariance).
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    w: DMatrix<f64>,
}

impl WeightMatrix {
    /// Unit weights, used when uncertainties are unknown.
    pub fn identity(n: usize) -> Self {
        Self { w: DMatrix::identity(n, n) }
    }

    /// `diag(1/σᵢ²)`.
    pub fn from_sigmas(sigmas: &[f64]) -> Result<Self> {
        if let Some(bad) = sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(FitError::InvalidInput(format!(
                "uncertainties must be finite and > 0, got {bad}"
            )));
        }
        let diag = DVector::from_iterator(sigmas.len(), sigmas.iter().map(|s| 1.0 / (s * s)));
        Ok(Self { w: DMatrix::from_diagonal(&diag) })
    }

    /// `W = C⁻¹` for an observation covariance `C`.
    pub fn from_covariance(cov: &DMatrix<f64>) -> Result<Self> {
        ensure_square_symmetric(cov, "covariance")?;
        let chol = Cholesky::new(cov.clone()).ok_or_else(|| {
            FitError::SingularMatrix("observation covariance is not positive-definite".into())
        })?;
        Self::from_matrix(chol.inverse())
    }

    /// Use an explicit weight matrix.
    ///
    /// Fails with `SingularMatrix` when any eigenvalue is zero or negative.
    pub fn from_matrix(w: DMatrix<f64>) -> Result<Self> {
        ensure_square_symmetric(&w, "weight matrix")?;
        let eig = w.clone().symmetric_eigen().eigenvalues;
        let max = eig.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = eig.iter().copied().fold(f64::INFINITY, f64::min);
        if !(max > 0.0) || min <= max * RCOND_MIN {
            return Err(FitError::SingularMatrix(format!(
                "weight matrix is not positive-definite (eigenvalues in [{min:.3e}, {max:.3e}])"
            )));
        }
        Ok(Self { w })
    }

    /// Weights implied by the uncertainty attached to `obs`.
    pub fn for_observations(obs: &ObservationSet) -> Result<Self> {
        match &obs.uncertainty {
            Uncertainty::None => Ok(Self::identity(obs.len())),
            Uncertainty::PerPoint(s) => Self::from_sigmas(s),
            Uncertainty::Covariance(c) => Self::from_covariance(c),
        }
    }

    pub fn dim(&self) -> usize {
        self.w.nrows()
    }

    pub fn as_matrix(&self) -> &DMatrix<f64> {
        &self.w
    }
}

fn ensure_square_symmetric(m: &DMatrix<f64>, what: &str) -> Result<()> {
    if m.nrows() != m.ncols() {
        return Err(FitError::Dimension(format!(
            "{what} must be square, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    if m.iter().any(|v| !v.is_finite()) {
        return Err(FitError::InvalidInput(format!("{what} has non-finite entries")));
    }
    let scale = m.amax().max(f64::MIN_POSITIVE);
    for i in 0..m.nrows() {
        for j in (i + 1)..m.ncols() {
            if (m[(i, j)] - m[(j, i)]).abs() > SYMMETRY_TOL * scale {
                return Err(FitError::InvalidInput(format!("{what} is not symmetric at ({i}, {j})")));
            }
        }
    }
    Ok(())
}

/// Solve the weighted normal equations for θ̂ and its covariance.
pub fn solve_gls(a: &DMatrix<f64>, w: &WeightMatrix, y: &DVector<f64>) -> Result<ParamEstimate> {
    let (n, p) = a.shape();
    if y.len() != n || w.dim() != n {
        return Err(FitError::Dimension(format!(
            "design is {n}x{p}, response has {} values, weight matrix is {}x{}",
            y.len(),
            w.dim(),
            w.dim()
        )));
    }
    if p == 0 {
        return Err(FitError::Dimension("design matrix has no columns".into()));
    }
    if n < p {
        return Err(FitError::SingularMatrix(format!(
            "underdetermined system: {n} observations for {p} parameters"
        )));
    }

    let at_w = a.transpose() * w.as_matrix();
    let normal = &at_w * a;
    ensure_full_rank(&normal)?;

    let chol: Cholesky<f64, Dyn> = Cholesky::new(normal)
        .ok_or_else(|| FitError::SingularMatrix("normal matrix AᵀWA is not positive-definite".into()))?;
    let rhs = &at_w * y;
    let theta = chol.solve(&rhs);
    let covariance = chol.inverse();

    if theta.iter().any(|v| !v.is_finite()) {
        return Err(FitError::SingularMatrix("solution is not finite".into()));
    }

    Ok(ParamEstimate::new(theta.iter().copied().collect(), covariance))
}

/// Reject normal matrices whose Jacobi-scaled spectrum is numerically rank deficient.
fn ensure_full_rank(normal: &DMatrix<f64>) -> Result<()> {
    let p = normal.nrows();
    let mut scale = Vec::with_capacity(p);
    for i in 0..p {
        let d = normal[(i, i)];
        if !(d.is_finite() && d > 0.0) {
            return Err(FitError::SingularMatrix(format!(
                "design column {i} carries no weight"
            )));
        }
        scale.push(1.0 / d.sqrt());
    }
    let scaled = DMatrix::from_fn(p, p, |i, j| normal[(i, j)] * scale[i] * scale[j]);
    let eig = scaled.symmetric_eigen().eigenvalues;
    let max = eig.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = eig.iter().copied().fold(f64::INFINITY, f64::min);
    if min <= max * RCOND_MIN {
        return Err(FitError::SingularMatrix(format!(
            "design matrix is rank deficient (scaled eigenvalue ratio {:.3e})",
            min / max
        )));
    }
    Ok(())
}

/// Weighted residual sum `(y − Aθ)ᵀ W (y − Aθ)`.
pub fn weighted_sse(y: &DVector<f64>, a: &DMatrix<f64>, theta: &DVector<f64>, w: &WeightMatrix) -> Result<f64> {
    if a.ncols() != theta.len() || a.nrows() != y.len() || w.dim() != y.len() {
        return Err(FitError::Dimension(format!(
            "design {}x{}, θ of length {}, y of length {}, weights {}x{}",
            a.nrows(),
            a.ncols(),
            theta.len(),
            y.len(),
            w.dim(),
            w.dim()
        )));
    }
    let r = y - a * theta;
    Ok(r.dot(&(w.as_matrix() * &r)))
}

/// Reduced chi-square `(y − Aθ)ᵀ W (y − Aθ) / (N − P)`.
///
/// Close to 1 for a correctly specified model with correct weights. This is a
/// diagnostic, not a pass/fail gate.
pub fn reduced_chi_square(y: &DVector<f64>, a: &DMatrix<f64>, theta: &DVector<f64>, w: &WeightMatrix) -> Result<f64> {
    let (n, p) = a.shape();
    if n <= p {
        return Err(FitError::Dimension(format!(
            "no degrees of freedom: {n} observations, {p} parameters"
        )));
    }
    Ok(weighted_sse(y, a, theta, w)? / (n - p) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let est = solve_gls(&a, &WeightMatrix::identity(3), &y).unwrap();
        assert!((est.values[0] - 2.0).abs() < 1e-10);
        assert!((est.values[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn covariance_is_inverse_normal_matrix() {
        // Straight line with sigma = 0.5 everywhere: cov = σ² (AᵀA)⁻¹.
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_row_slice(&[0.1, 1.2, 1.9, 3.1]);
        let w = WeightMatrix::from_sigmas(&[0.5; 4]).unwrap();
        let est = solve_gls(&a, &w, &y).unwrap();

        let expected = (a.transpose() * &a).try_inverse().unwrap() * 0.25;
        for i in 0..2 {
            for j in 0..2 {
                assert!((est.covariance[(i, j)] - expected[(i, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn duplicate_columns_are_singular() {
        let a = DMatrix::from_row_slice(3, 3, &[1.0, 0.5, 0.5, 1.0, 1.5, 1.5, 1.0, 2.5, 2.5]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        let err = solve_gls(&a, &WeightMatrix::identity(3), &y).unwrap_err();
        assert!(matches!(err, FitError::SingularMatrix(_)));
    }

    #[test]
    fn underdetermined_is_singular() {
        let a = DMatrix::from_row_slice(1, 2, &[1.0, 2.0]);
        let y = DVector::from_row_slice(&[1.0]);
        let err = solve_gls(&a, &WeightMatrix::identity(1), &y).unwrap_err();
        assert!(matches!(err, FitError::SingularMatrix(_)));
    }

    #[test]
    fn weight_matrix_with_nonpositive_eigenvalue_is_singular() {
        let zero = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(WeightMatrix::from_matrix(zero), Err(FitError::SingularMatrix(_))));

        let negative = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        assert!(matches!(WeightMatrix::from_matrix(negative), Err(FitError::SingularMatrix(_))));

        let bad_cov = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(WeightMatrix::from_covariance(&bad_cov), Err(FitError::SingularMatrix(_))));
    }

    #[test]
    fn covariance_weights_invert_the_covariance() {
        let cov = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let w = WeightMatrix::from_covariance(&cov).unwrap();
        let prod = &cov * w.as_matrix();
        assert!((prod - DMatrix::<f64>::identity(2, 2)).amax() < 1e-12);
    }

    #[test]
    fn reduced_chi_square_needs_degrees_of_freedom() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        let theta = DVector::from_row_slice(&[1.0, 1.0]);
        let err = reduced_chi_square(&y, &a, &theta, &WeightMatrix::identity(2)).unwrap_err();
        assert!(matches!(err, FitError::Dimension(_)));
    }
}
