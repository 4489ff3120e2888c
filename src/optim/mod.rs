//! Minimization of scalar objectives under box constraints.
//!
//! Callers see a narrow interface:
//!
//! - [`Minimizer::minimize`] takes an objective, an initial guess and one
//!   [`Bound`] per parameter and returns a [`MinimizeOutcome`]
//! - `math::finite_diff::hessian` provides curvature at the result
//!
//! Any numerical library can sit behind [`Minimizer`]. The bundled
//! implementation is argmin's Nelder–Mead simplex wrapped in smooth bound
//! transforms ([`NelderMead`]).

pub mod nelder_mead;
pub mod objective;
pub mod transform;

pub use nelder_mead::*;
pub use objective::*;

use crate::domain::Bound;
use crate::error::{FitError, Result};

/// Lifecycle of one minimization.
///
/// `Initialized → Iterating → Converged | Failed`. Both end states are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitState {
    Initialized,
    Iterating,
    Converged,
    Failed,
}

impl FitState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FitState::Converged | FitState::Failed)
    }

    pub fn can_transition_to(self, next: FitState) -> bool {
        matches!(
            (self, next),
            (FitState::Initialized, FitState::Iterating)
                | (FitState::Iterating, FitState::Iterating)
                | (FitState::Iterating, FitState::Converged)
                | (FitState::Iterating, FitState::Failed)
        )
    }

    /// Move to `next`, refusing to leave a terminal state.
    pub fn advance(&mut self, next: FitState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(FitError::InvalidInput(format!(
                "invalid minimizer state transition {self:?} -> {next:?}"
            )));
        }
        *self = next;
        Ok(())
    }
}

/// Solver diagnostics reported with every outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizerDiagnostics {
    pub iterations: u64,
    pub evaluations: u64,
    /// Norm of the finite-difference gradient at the final point.
    pub gradient_norm: f64,
    /// Objective decrease achieved by the last solver pass.
    pub last_improvement: f64,
    pub termination: String,
}

/// Result of [`Minimizer::minimize`]. `state` is always terminal.
#[derive(Debug, Clone)]
pub struct MinimizeOutcome {
    pub params: Vec<f64>,
    pub value: f64,
    pub state: FitState,
    pub diagnostics: MinimizerDiagnostics,
}

impl MinimizeOutcome {
    pub fn converged(&self) -> bool {
        self.state == FitState::Converged
    }

    /// Turn a failed outcome into a `Convergence` error.
    pub fn into_result(self) -> Result<Self> {
        if self.converged() {
            return Ok(self);
        }
        Err(FitError::Convergence {
            reason: self.diagnostics.termination.clone(),
            iterations: self.diagnostics.iterations,
            last_value: self.value,
            gradient_norm: self.diagnostics.gradient_norm,
            last_params: self.params,
        })
    }
}

/// A local minimizer with per-parameter box constraints.
pub trait Minimizer: Sync {
    fn minimize(&self, objective: &dyn Objective, initial: &[f64], bounds: &[Bound]) -> Result<MinimizeOutcome>;
}
