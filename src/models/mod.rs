//! Parametric models.
//!
//! - [`curves`]: `y = f(x; θ)` curves for (non)linear least squares
//! - [`density`]: normalized densities for likelihood fits
//!
//! Models are pure functions of `(x, θ)` so that fitting code stays generic.

pub mod curves;
pub mod density;

pub use curves::*;
pub use density::*;
