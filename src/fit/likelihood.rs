//! Maximum-likelihood fits: minimize, then invert the numerical Hessian.
//!
//! The covariance is the inverse Hessian of the negative log-likelihood at
//! the minimum, valid in the large-sample Gaussian approximation. The Hessian
//! stencil may step slightly past a parameter bound; if the objective is not
//! defined there the fit fails with `NonConvergentFit` rather than reporting a
//! one-sided curvature.

use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::domain::{Bound, GoodnessOfFit, Histogram, ParamEstimate};
use crate::error::{FitError, Result};
use crate::fit::binned::BinnedPoissonNll;
use crate::fit::unbinned::{NllBreakdown, UnbinnedNll};
use crate::math::finite_diff::{DEFAULT_REL_STEP, covariance_from_hessian, hessian_with_step};
use crate::models::Density;
use crate::optim::{MinimizerDiagnostics, Minimizer, NelderMead, Objective};

/// Relative distance to a bound below which an estimate is reported as
/// sitting on the boundary.
const BOUNDARY_TOL: f64 = 1e-6;

/// Result of a likelihood fit.
#[derive(Debug, Clone)]
pub struct LikelihoodFit {
    pub estimate: ParamEstimate,
    /// Objective value at the minimum.
    pub nll: f64,
    pub hessian: DMatrix<f64>,
    pub diagnostics: MinimizerDiagnostics,
    /// Floor statistics for unbinned fits.
    pub floor: Option<NllBreakdown>,
}

impl LikelihoodFit {
    pub fn goodness(&self) -> GoodnessOfFit {
        GoodnessOfFit::NegativeLogLikelihood { value: self.nll }
    }
}

/// Minimize → Hessian → covariance.
#[derive(Debug, Clone)]
pub struct MaximumLikelihood<M = NelderMead> {
    minimizer: M,
    hessian_step: f64,
}

impl Default for MaximumLikelihood<NelderMead> {
    fn default() -> Self {
        Self::new(NelderMead::default())
    }
}

impl<M: Minimizer> MaximumLikelihood<M> {
    pub fn new(minimizer: M) -> Self {
        Self {
            minimizer,
            hessian_step: DEFAULT_REL_STEP,
        }
    }

    pub fn with_hessian_step(mut self, rel_step: f64) -> Self {
        self.hessian_step = rel_step;
        self
    }

    pub fn minimizer(&self) -> &M {
        &self.minimizer
    }

    /// Fit an arbitrary negative log-likelihood.
    ///
    /// Estimates on a bound are refused, not reported: when the Hessian
    /// stencil leaves the region where the objective is defined (a mixture
    /// fraction at 0 or 1, say) the fit fails with `NonConvergentFit`.
    pub fn fit(
        &self,
        objective: &dyn Objective,
        initial: &[f64],
        bounds: &[Bound],
        labels: Vec<String>,
    ) -> Result<LikelihoodFit> {
        let outcome = self.minimizer.minimize(objective, initial, bounds)?.into_result()?;
        let hessian = hessian_with_step(objective, &outcome.params, self.hessian_step)?;
        let covariance = covariance_from_hessian(&hessian)?;

        for (i, (v, b)) in outcome.params.iter().zip(bounds).enumerate() {
            if near_bound(*v, b) {
                warn!(
                    parameter = labels.get(i).map(String::as_str).unwrap_or("?"),
                    value = v,
                    "estimate is on its bound; the Gaussian error approximation is unreliable"
                );
            }
        }

        info!(
            nll = outcome.value,
            iterations = outcome.diagnostics.iterations,
            evaluations = outcome.diagnostics.evaluations,
            "likelihood fit finished"
        );
        Ok(LikelihoodFit {
            estimate: ParamEstimate::new(outcome.params, covariance).with_labels(labels),
            nll: outcome.value,
            hessian,
            diagnostics: outcome.diagnostics,
            floor: None,
        })
    }

    /// Unbinned fit with the density's natural bounds.
    pub fn fit_unbinned<D: Density + ?Sized>(&self, nll: &UnbinnedNll<'_, D>, initial: &[f64]) -> Result<LikelihoodFit> {
        let density = nll.density();
        if initial.len() != density.n_params() {
            return Err(FitError::Dimension(format!(
                "initial guess has {} values, density has {} parameters",
                initial.len(),
                density.n_params()
            )));
        }
        let mut fit = self.fit(nll, initial, &density.default_bounds(), density.labels())?;
        let breakdown = nll.breakdown(&fit.estimate.values);
        if breakdown.floor_dominated > 0 {
            warn!(
                floor_dominated = breakdown.floor_dominated,
                events = breakdown.events,
                floor = nll.floor(),
                "density floor is active at the fitted point; the model may not describe these events"
            );
        }
        fit.floor = Some(breakdown);
        Ok(fit)
    }

    /// Binned Poisson fit with the density's natural bounds.
    pub fn fit_binned<D: Density + ?Sized>(&self, nll: &BinnedPoissonNll<'_, D>, initial: &[f64]) -> Result<LikelihoodFit> {
        let density = nll.density();
        if initial.len() != density.n_params() {
            return Err(FitError::Dimension(format!(
                "initial guess has {} values, density has {} parameters",
                initial.len(),
                density.n_params()
            )));
        }
        self.fit(nll, initial, &density.default_bounds(), density.labels())
    }
}

fn near_bound(v: f64, b: &Bound) -> bool {
    let tol = BOUNDARY_TOL * v.abs().max(1.0);
    b.lower.is_some_and(|lo| v - lo <= tol) || b.upper.is_some_and(|hi| hi - v <= tol)
}

/// Fit `density` to a histogram in one call.
pub fn fit_histogram<D: Density + ?Sized>(density: &D, histogram: &Histogram, initial: &[f64]) -> Result<LikelihoodFit> {
    let nll = BinnedPoissonNll::new(density, histogram)?;
    MaximumLikelihood::<NelderMead>::default().fit_binned(&nll, initial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Mixture, TruncatedExponential, TruncatedGaussian, Window};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn gaussian_likelihood_has_analytic_covariance() {
        // NLL = Σ (x_i - μ)² / 2 for unit variance: μ̂ = mean, var = 1/n.
        let xs = [0.3, -1.2, 0.8, 2.1, -0.4, 0.9];
        let n = xs.len() as f64;
        let nll = move |p: &[f64]| xs.iter().map(|x| 0.5 * (x - p[0]).powi(2)).sum::<f64>();
        let fit = MaximumLikelihood::<NelderMead>::default().fit(&nll, &[0.0], &[Bound::FREE], vec!["mu".into()]).unwrap();
        assert_relative_eq!(fit.estimate.values[0], xs.iter().sum::<f64>() / n, epsilon = 1e-4);
        assert_relative_eq!(fit.estimate.covariance[(0, 0)], 1.0 / n, max_relative = 1e-6);
        assert_eq!(fit.estimate.labels, vec!["mu"]);
    }

    #[test]
    fn unbinned_mixture_recovers_parameters() {
        let w = Window::new(0.0, 10.0).unwrap();
        let model = Mixture::new(TruncatedGaussian::new(w), TruncatedExponential::new(w)).unwrap();
        let truth = [0.3, 5.0, 0.5, 0.3];
        let mut rng = StdRng::seed_from_u64(11);
        let events: Vec<f64> = (0..4000).map(|_| model.sample(&truth, &mut rng)).collect();

        let nll = UnbinnedNll::new(&model, &events).unwrap();
        let fit = MaximumLikelihood::<NelderMead>::default().fit_unbinned(&nll, &[0.5, 4.5, 1.0, 0.1]).unwrap();
        let errs = fit.estimate.errors();
        for i in 0..4 {
            let pull = (fit.estimate.values[i] - truth[i]) / errs[i];
            assert!(pull.abs() < 4.0, "param {i}: {} ± {}", fit.estimate.values[i], errs[i]);
        }
        assert_eq!(fit.floor.map(|b| b.floor_dominated), Some(0));
    }

    #[test]
    fn estimate_on_a_bound_is_refused() {
        let nll = |p: &[f64]| if (0.0..=1.0).contains(&p[0]) { (p[0] + 1.0).powi(2) } else { f64::NAN };
        let err = MaximumLikelihood::<NelderMead>::default()
            .fit(&nll, &[0.5], &[Bound::between(0.0, 1.0)], vec!["p".into()])
            .unwrap_err();
        assert!(
            matches!(err, FitError::NonConvergentFit(_) | FitError::Convergence { .. }),
            "{err:?}"
        );
    }

    #[test]
    fn hessian_failure_is_non_convergent() {
        // Flat direction: the second parameter does not enter the objective.
        let f = |p: &[f64]| (p[0] - 1.0).powi(2);
        let err = MaximumLikelihood::<NelderMead>::default()
            .fit(&f, &[0.0, 0.0], &[Bound::FREE, Bound::FREE], vec![])
            .unwrap_err();
        assert!(matches!(err, FitError::NonConvergentFit(_)));
    }

    #[test]
    fn invalid_bounds_are_rejected_before_minimizing() {
        let f = |p: &[f64]| p[0] * p[0];
        let err = MaximumLikelihood::<NelderMead>::default()
            .fit(&f, &[0.5], &[Bound::between(1.0, 0.0)], vec![])
            .unwrap_err();
        assert!(matches!(err, FitError::InvalidBounds(_)));
    }

    #[test]
    fn boundary_detection() {
        assert!(near_bound(0.0, &Bound::at_least(0.0)));
        assert!(!near_bound(0.5, &Bound::between(0.0, 1.0)));
    }
}
