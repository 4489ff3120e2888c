//! Linear least squares on a basis-function model.

use nalgebra::DVector;
use tracing::info;

use crate::domain::{GoodnessOfFit, ObservationSet, ParamEstimate};
use crate::error::Result;
use crate::math::{Basis, WeightMatrix, design_matrix, solve_gls, weighted_sse};

/// Result of [`fit_linear`].
#[derive(Debug, Clone)]
pub struct LinearFit {
    pub estimate: ParamEstimate,
    pub chi2: f64,
    pub ndf: usize,
    /// Model values `Aθ̂` at the observed `x`.
    pub fitted: Vec<f64>,
}

impl LinearFit {
    pub fn goodness(&self) -> GoodnessOfFit {
        GoodnessOfFit::ChiSquare { chi2: self.chi2, ndf: self.ndf }
    }

    pub fn reduced_chi2(&self) -> Option<f64> {
        self.goodness().reduced_chi_square()
    }
}

/// Fit `y ≈ Σ θ_j · basis_j(x)` by generalized least squares.
///
/// The weight matrix follows the observation uncertainties: identity when
/// none are given, `diag(1/σ²)` for per-point errors, `C⁻¹` for a full
/// covariance.
pub fn fit_linear(obs: &ObservationSet, basis: &[Basis]) -> Result<LinearFit> {
    let a = design_matrix(&obs.x, basis)?;
    let w = WeightMatrix::for_observations(obs)?;
    let y = DVector::from_column_slice(&obs.y);

    let estimate = solve_gls(&a, &w, &y)?.with_labels(basis.iter().map(|b| b.label().to_string()).collect());
    let theta = DVector::from_column_slice(&estimate.values);
    let chi2 = weighted_sse(&y, &a, &theta, &w)?;
    let ndf = obs.len() - basis.len();
    let fitted = (&a * &theta).iter().copied().collect();

    info!(params = basis.len(), n = obs.len(), chi2, ndf, "linear fit finished");
    Ok(LinearFit { estimate, chi2, ndf, fitted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn recovers_exact_polynomial() {
        let x: Vec<f64> = (0..10).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().map(|x| 1.5 - 0.5 * x + 0.25 * x * x).collect();
        let obs = ObservationSet::with_sigma(x, y, vec![0.1; 10]).unwrap();
        let fit = fit_linear(&obs, &Basis::parse_list("1, x, x^2").unwrap()).unwrap();
        assert_relative_eq!(fit.estimate.values[0], 1.5, epsilon = 1e-10);
        assert_relative_eq!(fit.estimate.values[1], -0.5, epsilon = 1e-10);
        assert_relative_eq!(fit.estimate.values[2], 0.25, epsilon = 1e-10);
        assert!(fit.reduced_chi2().unwrap() < 1e-18);
        assert_eq!(fit.estimate.labels, vec!["1", "x", "x^2"]);
    }

    #[test]
    fn sin_cos_four_points() {
        let x = vec![0.0, PI / 2.0, PI, 3.0 * PI / 2.0];
        let y = vec![1.0, 2.0, -1.0, 0.0];
        let obs = ObservationSet::unweighted(x, y).unwrap();
        let fit = fit_linear(&obs, &[Basis::sin(), Basis::cos()]).unwrap();
        // sin column [0,1,0,-1], cos column [1,0,-1,0]: orthogonal, norm² 2.
        assert_relative_eq!(fit.estimate.values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.estimate.values[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(fit.estimate.covariance[(0, 0)], 0.5, epsilon = 1e-12);
        assert_relative_eq!(fit.estimate.covariance[(0, 1)], 0.0, epsilon = 1e-12);
        assert_eq!(fit.ndf, 2);
        // Residuals [0, 1, 0, 1] → χ² = 2.
        assert_relative_eq!(fit.chi2, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn saturated_model_has_no_reduced_chi_square() {
        let obs = ObservationSet::unweighted(vec![0.0, 1.0], vec![1.0, 3.0]).unwrap();
        let fit = fit_linear(&obs, &Basis::parse_list("1, x").unwrap()).unwrap();
        assert_eq!(fit.ndf, 0);
        assert!(fit.reduced_chi2().is_none());
    }

    #[test]
    fn collinear_basis_is_singular() {
        let obs = ObservationSet::unweighted(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 2.5]).unwrap();
        let basis = vec![Basis::monomial(1), Basis::new("2x", |x| 2.0 * x)];
        assert!(matches!(fit_linear(&obs, &basis), Err(FitError::SingularMatrix(_))));
    }
}
