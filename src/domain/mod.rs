//! Domain types used throughout the estimation pipeline.
//!
//! This module defines:
//!
//! - input containers (`ObservationSet`, `Uncertainty`, `Histogram`)
//! - parameter constraints (`Bound`)
//! - fit outputs (`ParamEstimate`, `FitReport`, `GoodnessOfFit`)

pub mod types;

pub use types::*;
