//! `paramfit` library crate.
//!
//! Least-squares and maximum-likelihood parameter estimation with
//! uncertainties. The binary (`paramfit`) is a thin wrapper around this
//! library so the estimators are testable without spawning processes.
//!
//! - [`fit`]: linear and nonlinear least squares, unbinned and binned likelihoods
//! - [`optim`]: bounded minimization behind the [`optim::Minimizer`] trait
//! - [`models`]: curves and normalized densities
//! - [`math`]: design matrices, the GLS solver, finite differences

pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod optim;
pub mod plot;
pub mod report;
