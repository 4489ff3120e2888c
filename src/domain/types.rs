//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - built per fit call and discarded afterwards
//! - handed to the rendering sink without exposing solver internals
//! - exported to JSON/CSV

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Uncertainty attached to the dependent values of an [`ObservationSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Uncertainty {
    /// Unknown; fits fall back to unit weights.
    None,
    /// One standard deviation per observation.
    PerPoint(Vec<f64>),
    /// Full covariance matrix over the dependent values.
    Covariance(DMatrix<f64>),
}

/// Paired independent/dependent values with optional uncertainties.
#[derive(Debug, Clone)]
pub struct ObservationSet {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub uncertainty: Uncertainty,
}

impl ObservationSet {
    /// Build an observation set, checking that all lengths agree.
    pub fn new(x: Vec<f64>, y: Vec<f64>, uncertainty: Uncertainty) -> Result<Self> {
        if x.len() != y.len() {
            return Err(FitError::Dimension(format!(
                "x has {} values but y has {}",
                x.len(),
                y.len()
            )));
        }
        match &uncertainty {
            Uncertainty::None => {}
            Uncertainty::PerPoint(sigma) if sigma.len() != y.len() => {
                return Err(FitError::Dimension(format!(
                    "{} uncertainties for {} observations",
                    sigma.len(),
                    y.len()
                )));
            }
            Uncertainty::Covariance(c) if c.nrows() != y.len() || c.ncols() != y.len() => {
                return Err(FitError::Dimension(format!(
                    "covariance is {}x{} but there are {} observations",
                    c.nrows(),
                    c.ncols(),
                    y.len()
                )));
            }
            Uncertainty::PerPoint(sigma) if sigma.iter().any(|s| !(s.is_finite() && *s > 0.0)) => {
                return Err(FitError::InvalidInput("uncertainties must be finite and positive".into()));
            }
            _ => {}
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(FitError::InvalidInput("observations must be finite".into()));
        }
        Ok(Self { x, y, uncertainty })
    }

    /// Observations with no uncertainty information.
    pub fn unweighted(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        Self::new(x, y, Uncertainty::None)
    }

    /// Observations with one standard deviation per point.
    pub fn with_sigma(x: Vec<f64>, y: Vec<f64>, sigma: Vec<f64>) -> Result<Self> {
        Self::new(x, y, Uncertainty::PerPoint(sigma))
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Per-point standard deviations, if known.
    ///
    /// For a full covariance this is the square root of its diagonal.
    pub fn sigmas(&self) -> Option<Vec<f64>> {
        match &self.uncertainty {
            Uncertainty::None => None,
            Uncertainty::PerPoint(s) => Some(s.clone()),
            Uncertainty::Covariance(c) => Some((0..c.nrows()).map(|i| c[(i, i)].sqrt()).collect()),
        }
    }
}

/// Histogram with strictly increasing edges and one count per bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    edges: Vec<f64>,
    counts: Vec<u64>,
}

impl Histogram {
    pub fn new(edges: Vec<f64>, counts: Vec<u64>) -> Result<Self> {
        if counts.is_empty() {
            return Err(FitError::Dimension("histogram needs at least one bin".into()));
        }
        if edges.len() != counts.len() + 1 {
            return Err(FitError::Dimension(format!(
                "{} edges for {} bins (expected {})",
                edges.len(),
                counts.len(),
                counts.len() + 1
            )));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(FitError::InvalidInput("histogram edges must be finite".into()));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(FitError::InvalidInput("histogram edges must be strictly increasing".into()));
        }
        Ok(Self { edges, counts })
    }

    /// Equal-width histogram over `[lo, hi]`.
    pub fn uniform(lo: f64, hi: f64, counts: Vec<u64>) -> Result<Self> {
        if !(lo.is_finite() && hi.is_finite() && hi > lo) {
            return Err(FitError::InvalidInput(format!("invalid histogram range [{lo}, {hi}]")));
        }
        let n = counts.len();
        let width = (hi - lo) / n.max(1) as f64;
        let mut edges: Vec<f64> = (0..n).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Self::new(edges, counts)
    }

    /// Bin `values` into the given edges. Values outside the range are dropped.
    pub fn from_values(edges: Vec<f64>, values: &[f64]) -> Result<Self> {
        let n_bins = edges.len().saturating_sub(1);
        let mut counts = vec![0u64; n_bins];
        for &v in values {
            if let Some(idx) = bin_index(&edges, v) {
                counts[idx] += 1;
            }
        }
        Self::new(edges, counts)
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn n_bins(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn range(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }
}

/// Index of the bin containing `v`; the last bin is closed on the right.
fn bin_index(edges: &[f64], v: f64) -> Option<usize> {
    let n = edges.len();
    if n < 2 || !v.is_finite() || v < edges[0] || v > edges[n - 1] {
        return None;
    }
    if v == edges[n - 1] {
        return Some(n - 2);
    }
    // First edge strictly greater than v, minus one.
    let upper = edges.partition_point(|&e| e <= v);
    Some(upper - 1)
}

/// Per-parameter box constraint. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bound {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bound {
    pub const FREE: Bound = Bound { lower: None, upper: None };

    pub fn between(lower: f64, upper: f64) -> Self {
        Self { lower: Some(lower), upper: Some(upper) }
    }

    pub fn at_least(lower: f64) -> Self {
        Self { lower: Some(lower), upper: None }
    }

    pub fn at_most(upper: f64) -> Self {
        Self { lower: None, upper: Some(upper) }
    }

    pub fn contains(&self, v: f64) -> bool {
        self.lower.is_none_or(|lo| v >= lo) && self.upper.is_none_or(|hi| v <= hi)
    }
}

/// Point estimate plus covariance.
#[derive(Debug, Clone)]
pub struct ParamEstimate {
    pub values: Vec<f64>,
    pub covariance: DMatrix<f64>,
    pub labels: Vec<String>,
}

impl ParamEstimate {
    /// Estimate with generic labels `p0, p1, ...`.
    pub fn new(values: Vec<f64>, covariance: DMatrix<f64>) -> Self {
        let labels = (0..values.len()).map(|i| format!("p{i}")).collect();
        Self { values, covariance, labels }
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        if labels.len() == self.values.len() {
            self.labels = labels;
        }
        self
    }

    /// One-sigma errors (square roots of the covariance diagonal).
    pub fn errors(&self) -> Vec<f64> {
        (0..self.values.len())
            .map(|i| self.covariance[(i, i)].max(0.0).sqrt())
            .collect()
    }

    /// Correlation matrix derived from the covariance.
    pub fn correlation(&self) -> DMatrix<f64> {
        let errs = self.errors();
        let n = errs.len();
        DMatrix::from_fn(n, n, |i, j| {
            let denom = errs[i] * errs[j];
            if denom > 0.0 { self.covariance[(i, j)] / denom } else { 0.0 }
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Which estimation method produced a [`FitReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMethod {
    LinearLeastSquares,
    NonlinearLeastSquares,
    UnbinnedLikelihood,
    BinnedLikelihood,
}

impl FitMethod {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            FitMethod::LinearLeastSquares => "linear least squares",
            FitMethod::NonlinearLeastSquares => "nonlinear least squares",
            FitMethod::UnbinnedLikelihood => "unbinned maximum likelihood",
            FitMethod::BinnedLikelihood => "binned Poisson likelihood",
        }
    }
}

/// Goodness-of-fit scalar attached to a result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoodnessOfFit {
    ChiSquare { chi2: f64, ndf: usize },
    NegativeLogLikelihood { value: f64 },
}

impl GoodnessOfFit {
    /// `χ²/ndf`, or `None` for likelihood fits and saturated models.
    pub fn reduced_chi_square(&self) -> Option<f64> {
        match *self {
            GoodnessOfFit::ChiSquare { chi2, ndf } if ndf > 0 => Some(chi2 / ndf as f64),
            _ => None,
        }
    }
}

/// Serializable summary of a finished fit.
///
/// The covariance is stored row-major so the JSON stays readable without
/// pulling matrix serialization into the format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitReport {
    pub tool: String,
    pub method: FitMethod,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub goodness: GoodnessOfFit,
    pub n_observations: usize,
}

impl FitReport {
    pub fn new(method: FitMethod, estimate: &ParamEstimate, goodness: GoodnessOfFit, n_observations: usize) -> Self {
        let n = estimate.len();
        let covariance = (0..n)
            .map(|i| (0..n).map(|j| estimate.covariance[(i, j)]).collect())
            .collect();
        Self {
            tool: "paramfit".to_string(),
            method,
            labels: estimate.labels.clone(),
            values: estimate.values.clone(),
            errors: estimate.errors(),
            covariance,
            goodness,
            n_observations,
        }
    }

    /// Rebuild the covariance matrix from the row-major representation.
    pub fn covariance_matrix(&self) -> Result<DMatrix<f64>> {
        let n = self.values.len();
        if self.covariance.len() != n || self.covariance.iter().any(|row| row.len() != n) {
            return Err(FitError::Dimension(format!(
                "report covariance is not {n}x{n}"
            )));
        }
        Ok(DMatrix::from_fn(n, n, |i, j| self.covariance[i][j]))
    }
}
