//! Rendering of fit results.
//!
//! Estimation code never draws. It hands a [`PlotPayload`] (data with error
//! bars, sampled model curve, textual summary) to a [`RenderSink`].

pub mod ascii;

pub use ascii::*;

use crate::domain::{Histogram, ObservationSet};
use crate::error::Result;

/// One data point with an optional symmetric error bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub err: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotPayload {
    pub title: String,
    pub points: Vec<PlotPoint>,
    /// Model curve samples `(x, y)`, ordered by `x`.
    pub curve: Vec<(f64, f64)>,
    pub summary: String,
}

impl PlotPayload {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Observations with their σ as error bars.
    pub fn with_observations(mut self, obs: &ObservationSet) -> Self {
        let sigmas = obs.sigmas();
        self.points = (0..obs.len())
            .map(|i| PlotPoint {
                x: obs.x[i],
                y: obs.y[i],
                err: sigmas.as_ref().map(|s| s[i]),
            })
            .collect();
        self
    }

    /// Bin counts at bin centers with `√k` error bars.
    pub fn with_histogram(mut self, hist: &Histogram) -> Self {
        self.points = hist
            .centers()
            .into_iter()
            .zip(hist.counts())
            .map(|(x, &k)| PlotPoint {
                x,
                y: k as f64,
                err: Some((k as f64).sqrt()),
            })
            .collect();
        self
    }

    /// Sample `f` at `n` evenly spaced points over `[lo, hi]`.
    pub fn with_curve(mut self, lo: f64, hi: f64, n: usize, f: impl Fn(f64) -> f64) -> Self {
        let n = n.max(2);
        self.curve = (0..n)
            .map(|i| {
                let x = lo + (hi - lo) * i as f64 / (n - 1) as f64;
                (x, f(x))
            })
            .collect();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// `[min, max]` of the point `x` values, if there are at least two distinct ones.
    pub fn x_range(&self) -> Option<(f64, f64)> {
        let (lo, hi) = self
            .points
            .iter()
            .map(|p| p.x)
            .chain(self.curve.iter().map(|c| c.0))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| (lo.min(x), hi.max(x)));
        (lo.is_finite() && hi.is_finite() && hi > lo).then_some((lo, hi))
    }
}

/// Destination for rendered fit results.
pub trait RenderSink {
    fn render(&mut self, payload: &PlotPayload) -> Result<()>;
}
