//! Synthetic data for demos and statistical tests.

pub mod sample;

pub use sample::*;
