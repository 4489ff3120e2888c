//! Estimators.
//!
//! - [`linear`]: generalized least squares on a basis-function model
//! - [`nonlinear`]: Levenberg–Marquardt for arbitrary curves
//! - [`unbinned`] / [`binned`]: negative log-likelihoods of a density
//! - [`likelihood`]: minimize a likelihood and attach a Hessian covariance
//! - [`scan`]: profile-likelihood scans (parallel)

pub mod binned;
pub mod likelihood;
pub mod linear;
pub mod nonlinear;
pub mod scan;
pub mod unbinned;

pub use binned::*;
pub use likelihood::*;
pub use linear::*;
pub use nonlinear::*;
pub use scan::*;
pub use unbinned::*;
