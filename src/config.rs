//! Runtime settings from the environment.
//!
//! A `.env` file in the working directory is loaded first (via `dotenvy`);
//! real environment variables take precedence over it. Command-line flags
//! override both.
//!
//! | variable                  | default |
//! |---------------------------|---------|
//! | `PARAMFIT_SEED`           | `42`    |
//! | `PARAMFIT_MAX_ITERS`      | `5000`  |
//! | `PARAMFIT_TOLERANCE`      | `1e-10` |
//! | `PARAMFIT_DENSITY_FLOOR`  | `1e-12` |
//! | `PARAMFIT_PLOT_WIDTH`     | `80`    |
//! | `PARAMFIT_PLOT_HEIGHT`    | `20`    |

use std::str::FromStr;

use crate::error::{FitError, Result};
use crate::fit::DEFAULT_DENSITY_FLOOR;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub seed: u64,
    pub max_iters: u64,
    pub tolerance: f64,
    pub density_floor: f64,
    pub plot_width: usize,
    pub plot_height: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: 42,
            max_iters: 5_000,
            tolerance: 1e-10,
            density_floor: DEFAULT_DENSITY_FLOOR,
            plot_width: 80,
            plot_height: 20,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        // Missing .env is fine.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let d = Self::default();
        let s = Self {
            seed: parse_var(&lookup, "PARAMFIT_SEED", d.seed)?,
            max_iters: parse_var(&lookup, "PARAMFIT_MAX_ITERS", d.max_iters)?,
            tolerance: parse_var(&lookup, "PARAMFIT_TOLERANCE", d.tolerance)?,
            density_floor: parse_var(&lookup, "PARAMFIT_DENSITY_FLOOR", d.density_floor)?,
            plot_width: parse_var(&lookup, "PARAMFIT_PLOT_WIDTH", d.plot_width)?,
            plot_height: parse_var(&lookup, "PARAMFIT_PLOT_HEIGHT", d.plot_height)?,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iters == 0 {
            return Err(FitError::InvalidInput("max iterations must be > 0".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(FitError::InvalidInput(format!("tolerance must be positive, got {}", self.tolerance)));
        }
        if !(self.density_floor.is_finite() && self.density_floor > 0.0) {
            return Err(FitError::InvalidInput(format!(
                "density floor must be positive, got {}",
                self.density_floor
            )));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| FitError::InvalidInput(format!("{key}: cannot parse '{raw}'"))),
        _ => Ok(default),
    }
}
