//! Error types.
//!
//! The library reports failures through [`FitError`]. The binary converts them
//! into an [`AppError`] that carries the process exit code.

use thiserror::Error;

/// Failure of an estimation call.
///
/// A failed fit never yields a partial estimate: callers get either a full
/// result or one of these variants.
#[derive(Debug, Error)]
pub enum FitError {
    /// Shape or length mismatch among inputs.
    #[error("dimension mismatch: {0}")]
    Dimension(String),

    /// Non-invertible normal-equations or weight matrix.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// An iterative solver exhausted its budget without meeting its tolerance.
    #[error(
        "no convergence after {iterations} iterations ({reason}); last objective {last_value:.6e}, gradient norm {gradient_norm:.3e}"
    )]
    Convergence {
        reason: String,
        iterations: u64,
        last_value: f64,
        gradient_norm: f64,
        last_params: Vec<f64>,
    },

    /// Lower bound above upper bound, or initial guess outside its bounds.
    #[error("invalid bounds: {0}")]
    InvalidBounds(String),

    /// The Hessian at the reported minimum is not positive-definite.
    #[error("fit did not reach a usable minimum: {0}")]
    NonConvergentFit(String),

    /// Malformed data or parameters (non-finite values, bad uncertainties, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FitError>;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let exit_code = match &err {
            FitError::InvalidInput(_)
            | FitError::InvalidBounds(_)
            | FitError::Dimension(_)
            | FitError::Io(_)
            | FitError::Csv(_)
            | FitError::Json(_) => 2,
            FitError::SingularMatrix(_) | FitError::Convergence { .. } | FitError::NonConvergentFit(_) => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerical_failures_map_to_exit_code_four() {
        let app: AppError = FitError::SingularMatrix("rank 2 < 3".into()).into();
        assert_eq!(app.exit_code(), 4);
        assert!(app.to_string().contains("rank 2 < 3"));
    }

    #[test]
    fn input_failures_map_to_exit_code_two() {
        let app: AppError = FitError::InvalidBounds("lower > upper".into()).into();
        assert_eq!(app.exit_code(), 2);
    }
}
