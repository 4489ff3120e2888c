//! Numerical building blocks: basis functions, design matrices, generalized
//! least squares and finite-difference derivatives.

pub mod basis;
pub mod design;
pub mod finite_diff;
pub mod gls;

pub use basis::*;
pub use design::*;
pub use gls::*;
