//! Nelder–Mead simplex search (argmin) behind smooth bound transforms.
//!
//! The solver works on unconstrained coordinates `u`; every cost evaluation
//! maps `u` back into the bounded parameter space first, so the objective is
//! never called outside its box. NaN objective values are reported to the
//! simplex as `+inf` (argmin orders vertices by cost).
//!
//! A converged pass is followed by up to `restarts` further passes started
//! from the best vertex with a fresh simplex. Restarting from the reported
//! minimum is deterministic; it does not perturb the caller's initial guess.

use std::sync::atomic::{AtomicU64, Ordering};

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead as SimplexSolver;
use tracing::debug;

use crate::domain::Bound;
use crate::error::{FitError, Result};
use crate::math::finite_diff;
use crate::optim::transform::{BoundTransform, to_params, to_solver};
use crate::optim::{FitState, MinimizeOutcome, Minimizer, MinimizerDiagnostics, Objective, validate_bounds};

/// Nelder–Mead configuration.
#[derive(Debug, Clone)]
pub struct NelderMead {
    /// Iteration budget per pass.
    pub max_iters: u64,
    /// Stop when the standard deviation of the vertex costs falls below this.
    pub sd_tolerance: f64,
    /// Initial simplex edge, relative to `max(|u_i|, 1)`.
    pub initial_step: f64,
    /// Extra passes after the first converged one.
    pub restarts: usize,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iters: 5_000,
            sd_tolerance: 1e-10,
            initial_step: 0.1,
            restarts: 2,
        }
    }
}

impl NelderMead {
    pub fn with_max_iters(mut self, max_iters: u64) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.sd_tolerance = tol;
        self
    }

    fn initial_simplex(&self, start: &[f64]) -> Vec<Vec<f64>> {
        let mut simplex = Vec::with_capacity(start.len() + 1);
        simplex.push(start.to_vec());
        for i in 0..start.len() {
            let mut v = start.to_vec();
            v[i] += self.initial_step * start[i].abs().max(1.0);
            simplex.push(v);
        }
        simplex
    }

    fn run_pass(&self, cost: SolverCost<'_>, start: &[f64]) -> Result<Pass> {
        let solver = SimplexSolver::new(self.initial_simplex(start))
            .with_sd_tolerance(self.sd_tolerance)
            .map_err(|e| FitError::InvalidInput(format!("Nelder-Mead setup failed: {e}")))?;

        let max_iters = self.max_iters;
        let result = Executor::new(cost, solver)
            .configure(|state| state.max_iters(max_iters))
            .run()
            .map_err(|e| FitError::Convergence {
                reason: format!("solver aborted: {e}"),
                iterations: 0,
                last_value: f64::NAN,
                gradient_norm: f64::NAN,
                last_params: Vec::new(),
            })?;

        let state = result.state();
        let best = state.get_best_param().cloned().unwrap_or_else(|| start.to_vec());
        let status = state.get_termination_status();
        let converged = matches!(
            status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );
        Ok(Pass {
            best,
            value: state.get_best_cost(),
            iterations: state.get_iter(),
            converged,
            termination: status.to_string(),
        })
    }
}

struct Pass {
    best: Vec<f64>,
    value: f64,
    iterations: u64,
    converged: bool,
    termination: String,
}

struct SolverCost<'a> {
    objective: &'a dyn Objective,
    transforms: &'a [BoundTransform],
    evaluations: &'a AtomicU64,
}

impl CostFunction for SolverCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, u: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let v = self.objective.value(&to_params(self.transforms, u));
        Ok(if v.is_nan() { f64::INFINITY } else { v })
    }
}

impl Minimizer for NelderMead {
    fn minimize(&self, objective: &dyn Objective, initial: &[f64], bounds: &[Bound]) -> Result<MinimizeOutcome> {
        if initial.is_empty() {
            return Err(FitError::Dimension("no parameters to minimize".into()));
        }
        validate_bounds(initial, bounds)?;

        let mut state = FitState::Initialized;
        let transforms: Vec<BoundTransform> = bounds.iter().map(BoundTransform::for_bound).collect();
        let evaluations = AtomicU64::new(0);

        let mut u = to_solver(&transforms, initial);
        let mut value = objective.value(&to_params(&transforms, &u));
        if !value.is_finite() {
            return Err(FitError::InvalidInput(format!(
                "objective is not finite at the initial guess ({value})"
            )));
        }

        let mut iterations = 0u64;
        let mut last_improvement = 0.0;
        let mut termination = String::new();
        let mut converged = false;

        for pass in 0..=self.restarts {
            state.advance(FitState::Iterating)?;
            let cost = SolverCost {
                objective,
                transforms: &transforms,
                evaluations: &evaluations,
            };
            let result = self.run_pass(cost, &u)?;
            iterations += result.iterations;
            debug!(
                pass,
                iterations = result.iterations,
                value = result.value,
                converged = result.converged,
                "simplex pass finished"
            );

            last_improvement = value - result.value;
            if result.value <= value {
                u = result.best;
                value = result.value;
            }
            converged = result.converged;
            termination = result.termination;

            if !converged {
                break;
            }
            if pass > 0 && last_improvement.abs() <= self.sd_tolerance * (1.0 + value.abs()) {
                break;
            }
        }

        let params = to_params(&transforms, &u);
        let grad = finite_diff::gradient(objective, &params);
        let gradient_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();

        state.advance(if converged { FitState::Converged } else { FitState::Failed })?;
        debug!(?state, value, iterations, gradient_norm, "minimization finished");

        Ok(MinimizeOutcome {
            params,
            value,
            state,
            diagnostics: MinimizerDiagnostics {
                iterations,
                evaluations: evaluations.load(Ordering::Relaxed),
                gradient_norm,
                last_improvement,
                termination,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rosenbrock(p: &[f64]) -> f64 {
        (1.0 - p[0]).powi(2) + 100.0 * (p[1] - p[0] * p[0]).powi(2)
    }

    #[test]
    fn finds_rosenbrock_minimum() {
        let out = NelderMead::default()
            .minimize(&rosenbrock, &[-1.2, 1.0], &[Bound::FREE, Bound::FREE])
            .unwrap();
        assert!(out.converged());
        assert!((out.params[0] - 1.0).abs() < 1e-3, "{:?}", out.params);
        assert!((out.params[1] - 1.0).abs() < 2e-3, "{:?}", out.params);
    }

    #[test]
    fn respects_active_bound() {
        // Unconstrained minimum at x = -2; the bound keeps x >= 0.
        let f = |p: &[f64]| (p[0] + 2.0).powi(2);
        let out = NelderMead::default().minimize(&f, &[1.0], &[Bound::at_least(0.0)]).unwrap();
        assert!(out.params[0] >= 0.0);
        assert!(out.params[0] < 1e-3);
    }

    #[test]
    fn two_sided_bounds_interior_minimum() {
        let f = |p: &[f64]| (p[0] - 0.25).powi(2) + (p[1] - 3.0).powi(2);
        let out = NelderMead::default()
            .minimize(&f, &[0.5, 1.0], &[Bound::between(0.0, 1.0), Bound::FREE])
            .unwrap();
        assert!((out.params[0] - 0.25).abs() < 1e-4);
        assert!((out.params[1] - 3.0).abs() < 1e-4);
    }

    #[test]
    fn tiny_budget_reports_failure() {
        let solver = NelderMead::default().with_max_iters(3);
        let out = solver.minimize(&rosenbrock, &[-1.2, 1.0], &[Bound::FREE, Bound::FREE]).unwrap();
        assert_eq!(out.state, FitState::Failed);
        assert!(matches!(out.into_result(), Err(FitError::Convergence { .. })));
    }

    #[test]
    fn rejects_start_outside_bounds() {
        let f = |p: &[f64]| p[0] * p[0];
        let err = NelderMead::default().minimize(&f, &[2.0], &[Bound::between(-1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, FitError::InvalidBounds(_)));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let f = |p: &[f64]| (p[0] - 1.5).powi(2) + 0.5 * (p[1] + 0.5).powi(4) + p[0] * p[1];
        let nm = NelderMead::default();
        let a = nm.minimize(&f, &[0.0, 0.0], &[Bound::FREE, Bound::FREE]).unwrap();
        let b = nm.minimize(&f, &[0.0, 0.0], &[Bound::FREE, Bound::FREE]).unwrap();
        assert_eq!(a.params, b.params);
        assert_eq!(a.value, b.value);
    }
}
