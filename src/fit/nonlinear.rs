//! Nonlinear least squares (Levenberg–Marquardt).
//!
//! Minimizes `χ²(θ) = rᵀ W r` with `r = y - f(x; θ)` and `W` built from the
//! observation uncertainties exactly as in the linear solver. The iteration
//! itself is the MINPACK-style trust region of the `levenberg-marquardt`
//! crate, run on whitened residuals `Lᵀr` where `W = L·Lᵀ`, so that
//! `‖Lᵀr‖² = χ²` and the weights stay absolute. The covariance `(JᵀWJ)⁻¹` is
//! never rescaled by `χ²/ndf`.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt as TrustRegion, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use tracing::{debug, info};

use crate::domain::{GoodnessOfFit, ObservationSet, ParamEstimate};
use crate::error::{FitError, Result};
use crate::math::{WeightMatrix, solve_gls};
use crate::models::CurveModel;

/// Result of a nonlinear least-squares fit.
#[derive(Debug, Clone)]
pub struct NonlinearFit {
    pub estimate: ParamEstimate,
    pub chi2: f64,
    pub ndf: usize,
    /// Residual evaluations spent by the solver.
    pub iterations: u64,
}

impl NonlinearFit {
    pub fn goodness(&self) -> GoodnessOfFit {
        GoodnessOfFit::ChiSquare { chi2: self.chi2, ndf: self.ndf }
    }

    pub fn reduced_chi2(&self) -> Option<f64> {
        self.goodness().reduced_chi_square()
    }
}

/// Fits a [`CurveModel`] to observations.
pub trait NonlinearSolver {
    /// `initial` defaults to all ones. A linear estimate makes a good start
    /// when the model has a linearized form.
    fn fit(&self, model: &dyn CurveModel, obs: &ObservationSet, initial: Option<&[f64]>) -> Result<NonlinearFit>;
}

#[derive(Debug, Clone)]
pub struct LevenbergMarquardt {
    /// Budget in units of `n_params + 1` residual evaluations.
    pub max_iters: u64,
    /// Relative χ² reduction and relative step regarded as converged.
    pub tolerance: f64,
    /// Initial trust-region radius factor.
    pub stepbound: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iters: 500,
            tolerance: 1e-10,
            stepbound: 100.0,
        }
    }
}

const JACOBIAN_REL_STEP: f64 = 6e-6;
const MAX_PATIENCE: usize = 1_000_000;

impl LevenbergMarquardt {
    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn trust_region(&self) -> TrustRegion<f64> {
        let patience = usize::try_from(self.max_iters).unwrap_or(MAX_PATIENCE).clamp(1, MAX_PATIENCE);
        TrustRegion::new()
            .with_ftol(self.tolerance)
            .with_xtol(self.tolerance)
            .with_stepbound(self.stepbound)
            .with_patience(patience)
    }
}

#[derive(Clone)]
struct Problem<'a> {
    model: &'a dyn CurveModel,
    x: &'a [f64],
    y: DVector<f64>,
    /// `Lᵀ` from the Cholesky factor of `W`.
    whiten: DMatrix<f64>,
    theta: DVector<f64>,
}

impl Problem<'_> {
    fn raw_residuals(&self, theta: &[f64]) -> DVector<f64> {
        DVector::from_iterator(
            self.x.len(),
            self.x.iter().zip(self.y.iter()).map(|(&x, &y)| y - self.model.eval(x, theta)),
        )
    }

    fn chi2(&self) -> f64 {
        (&self.whiten * self.raw_residuals(self.theta.as_slice())).norm_squared()
    }

    /// `∂f(x_i; θ)/∂θ_j` by central differences.
    fn model_jacobian(&self, theta: &[f64]) -> DMatrix<f64> {
        let (n, p) = (self.x.len(), theta.len());
        let mut jac = DMatrix::zeros(n, p);
        let mut shifted = theta.to_vec();
        for j in 0..p {
            let h = JACOBIAN_REL_STEP * theta[j].abs().max(1.0);
            shifted[j] = theta[j] + h;
            let up: Vec<f64> = self.x.iter().map(|&x| self.model.eval(x, &shifted)).collect();
            shifted[j] = theta[j] - h;
            for (i, &x) in self.x.iter().enumerate() {
                jac[(i, j)] = (up[i] - self.model.eval(x, &shifted)) / (2.0 * h);
            }
            shifted[j] = theta[j];
        }
        jac
    }

    /// `‖∇χ²‖ = 2‖JᵀW r‖` at the current parameters.
    fn gradient_norm(&self) -> f64 {
        match (self.residuals(), LeastSquaresProblem::jacobian(self)) {
            (Some(r), Some(j)) => 2.0 * (j.transpose() * r).norm(),
            _ => f64::NAN,
        }
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for Problem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, theta: &DVector<f64>) {
        self.theta.copy_from(theta);
    }

    fn params(&self) -> DVector<f64> {
        self.theta.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let r = &self.whiten * self.raw_residuals(self.theta.as_slice());
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    /// Jacobian of the whitened residuals, `-Lᵀ J_f`.
    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let jac = -(&self.whiten * self.model_jacobian(self.theta.as_slice()));
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

impl NonlinearSolver for LevenbergMarquardt {
    fn fit(&self, model: &dyn CurveModel, obs: &ObservationSet, initial: Option<&[f64]>) -> Result<NonlinearFit> {
        let p = model.n_params();
        let theta = match initial {
            Some(init) if init.len() != p => {
                return Err(FitError::Dimension(format!(
                    "initial guess has {} values, model has {p} parameters",
                    init.len()
                )));
            }
            Some(init) => init.to_vec(),
            None => vec![1.0; p],
        };
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(FitError::InvalidInput("initial guess is not finite".into()));
        }
        if obs.len() < p {
            return Err(FitError::SingularMatrix(format!(
                "underdetermined system: {} observations for {p} parameters",
                obs.len()
            )));
        }

        let w = WeightMatrix::for_observations(obs)?;
        let whiten = Cholesky::new(w.as_matrix().clone())
            .ok_or_else(|| FitError::SingularMatrix("weight matrix is not positive definite".into()))?
            .l()
            .transpose();
        let problem = Problem {
            model,
            x: &obs.x,
            y: DVector::from_column_slice(&obs.y),
            whiten,
            theta: DVector::from_vec(theta),
        };
        if !problem.chi2().is_finite() {
            return Err(FitError::InvalidInput(format!(
                "model is not finite at the initial guess {:?}",
                problem.theta.as_slice()
            )));
        }

        let (problem, report) = self.trust_region().minimize(problem);
        let chi2 = problem.chi2();
        let iterations = report.number_of_evaluations as u64;
        debug!(termination = ?report.termination, evaluations = iterations, chi2, "trust region finished");

        let failure = |reason: String, iterations: u64| FitError::Convergence {
            reason,
            iterations,
            last_value: chi2,
            gradient_norm: problem.gradient_norm(),
            last_params: problem.theta.as_slice().to_vec(),
        };
        match &report.termination {
            t if t.was_successful() => {}
            TerminationReason::LostPatience => {
                return Err(failure("iteration budget exhausted".into(), self.max_iters));
            }
            other => return Err(failure(format!("solver stopped: {other:?}"), iterations)),
        }

        // A parameter with no influence on any residual leaves the solver at a
        // stationary point that is not a minimum in that direction.
        let jac = problem.model_jacobian(problem.theta.as_slice());
        if chi2 > 0.0 {
            if let Some(j) = (0..p).find(|&j| jac.column(j).iter().all(|v| *v == 0.0)) {
                let label = model.labels().get(j).cloned().unwrap_or_else(|| format!("#{j}"));
                return Err(failure(
                    format!("gradient vanishes along parameter {label}; stationary point is not a minimum"),
                    iterations,
                ));
            }
        }

        // Covariance of the linearized problem at the solution, with the same
        // rank checks as the linear solver.
        let linearized = solve_gls(&jac, &w, &problem.raw_residuals(problem.theta.as_slice()))?;
        let estimate =
            ParamEstimate::new(problem.theta.as_slice().to_vec(), linearized.covariance).with_labels(model.labels());
        let ndf = obs.len() - p;

        info!(iterations, chi2, ndf, "nonlinear fit finished");
        Ok(NonlinearFit { estimate, chi2, ndf, iterations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExponentialDecay, FnCurve, GaussianPeak, Line};
    use approx::assert_relative_eq;

    #[test]
    fn line_matches_linear_solution() {
        let x: Vec<f64> = (0..8).map(f64::from).collect();
        let y = vec![0.9, 3.1, 5.0, 7.2, 8.8, 11.1, 13.0, 14.9];
        let obs = ObservationSet::with_sigma(x.clone(), y.clone(), vec![0.2; 8]).unwrap();
        let fit = LevenbergMarquardt::default().fit(&Line, &obs, None).unwrap();

        let lin = crate::fit::fit_linear(&obs, &crate::math::Basis::parse_list("1, x").unwrap()).unwrap();
        assert_relative_eq!(fit.estimate.values[0], lin.estimate.values[0], epsilon = 1e-7);
        assert_relative_eq!(fit.estimate.values[1], lin.estimate.values[1], epsilon = 1e-7);
        assert_relative_eq!(fit.estimate.covariance[(1, 1)], lin.estimate.covariance[(1, 1)], max_relative = 1e-6);
        assert_relative_eq!(fit.chi2, lin.chi2, max_relative = 1e-8);
    }

    #[test]
    fn recovers_exponential_decay_without_noise() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let truth = [4.0, 0.7, 0.5];
        let y = ExponentialDecay.predict(&x, &truth);
        let obs = ObservationSet::with_sigma(x, y, vec![0.05; 30]).unwrap();
        let fit = LevenbergMarquardt::default().fit(&ExponentialDecay, &obs, Some(&[1.0, 0.3, 0.0])).unwrap();
        for (got, want) in fit.estimate.values.iter().zip(truth) {
            assert_relative_eq!(*got, want, epsilon = 1e-6);
        }
        assert!(fit.chi2 < 1e-12);
    }

    #[test]
    fn gaussian_peak_from_rough_guess() {
        let x: Vec<f64> = (0..60).map(|i| -3.0 + i as f64 * 0.1).collect();
        let truth = [2.0, 0.4, 0.6, 0.1];
        let y = GaussianPeak.predict(&x, &truth);
        let obs = ObservationSet::unweighted(x, y).unwrap();
        let fit = LevenbergMarquardt::default().fit(&GaussianPeak, &obs, Some(&[1.5, 0.0, 1.0, 0.0])).unwrap();
        assert_relative_eq!(fit.estimate.values[1], 0.4, epsilon = 1e-6);
        assert_relative_eq!(fit.estimate.values[2].abs(), 0.6, epsilon = 1e-6);
    }

    #[test]
    fn exhausted_budget_reports_last_iterate() {
        let x: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y = ExponentialDecay.predict(&x, &[4.0, 0.7, 0.5]);
        let obs = ObservationSet::unweighted(x, y).unwrap();
        let err = LevenbergMarquardt::default()
            .with_max_iters(1)
            .fit(&ExponentialDecay, &obs, Some(&[1.0, 2.0, -1.0]))
            .unwrap_err();
        match err {
            FitError::Convergence { iterations, last_params, last_value, .. } => {
                assert_eq!(iterations, 1);
                assert_eq!(last_params.len(), 3);
                assert!(last_value.is_finite());
            }
            other => panic!("expected convergence error, got {other:?}"),
        }
    }

    #[test]
    fn stationary_start_is_a_convergence_failure() {
        let x: Vec<f64> = (1..6).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|x| 4.0 * x).collect();
        let obs = ObservationSet::unweighted(x, y).unwrap();
        let curve = FnCurve::new(1, |x, p: &[f64]| p[0] * p[0] * x);
        match LevenbergMarquardt::default().fit(&curve, &obs, Some(&[0.0])) {
            Err(FitError::Convergence { last_params, gradient_norm, last_value, .. }) => {
                assert_eq!(last_params, vec![0.0]);
                assert_eq!(gradient_norm, 0.0);
                assert!(last_value > 0.0);
            }
            other => panic!("expected convergence error, got {other:?}"),
        }
    }

    #[test]
    fn correlated_errors_keep_absolute_weights() {
        let x: Vec<f64> = (0..6).map(f64::from).collect();
        let y = vec![1.1, 2.9, 5.2, 6.8, 9.1, 11.0];
        let mut cov = DMatrix::from_diagonal_element(6, 6, 0.04);
        for i in 0..5 {
            cov[(i, i + 1)] = 0.01;
            cov[(i + 1, i)] = 0.01;
        }
        let obs = ObservationSet::new(x, y, crate::domain::Uncertainty::Covariance(cov)).unwrap();
        let fit = LevenbergMarquardt::default().fit(&Line, &obs, None).unwrap();
        let lin = crate::fit::fit_linear(&obs, &crate::math::Basis::parse_list("1, x").unwrap()).unwrap();
        assert_relative_eq!(fit.estimate.values[1], lin.estimate.values[1], epsilon = 1e-7);
        assert_relative_eq!(fit.chi2, lin.chi2, max_relative = 1e-8);
        assert_relative_eq!(fit.estimate.covariance[(0, 0)], lin.estimate.covariance[(0, 0)], max_relative = 1e-6);
    }

    #[test]
    fn wrong_initial_length_is_dimension_error() {
        let obs = ObservationSet::unweighted(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0]).unwrap();
        let curve = FnCurve::new(2, |x, p: &[f64]| p[0] + p[1] * x);
        assert!(matches!(
            LevenbergMarquardt::default().fit(&curve, &obs, Some(&[1.0])),
            Err(FitError::Dimension(_))
        ));
    }
}
