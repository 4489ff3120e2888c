//! Smooth maps between bounded parameters and unconstrained solver coordinates.
//!
//! - two-sided `[lo, hi]`: `x = lo + (hi - lo) · sigmoid(u)`
//! - lower only: `x = lo + exp(u)`
//! - upper only: `x = hi - exp(u)`
//! - none: `x = u`
//!
//! Values exactly on a bound map to a large but finite `u`.

use crate::domain::Bound;

const EDGE_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundTransform {
    Identity,
    Finite { lo: f64, hi: f64 },
    Lower { lo: f64 },
    Upper { hi: f64 },
    /// `lo == hi`: the parameter is pinned.
    Fixed { value: f64 },
}

impl BoundTransform {
    pub fn for_bound(bound: &Bound) -> Self {
        match (bound.lower, bound.upper) {
            (None, None) => BoundTransform::Identity,
            (Some(lo), None) => BoundTransform::Lower { lo },
            (None, Some(hi)) => BoundTransform::Upper { hi },
            (Some(lo), Some(hi)) if hi > lo => BoundTransform::Finite { lo, hi },
            (Some(lo), Some(_)) => BoundTransform::Fixed { value: lo },
        }
    }

    /// Solver coordinate -> parameter.
    pub fn forward(self, u: f64) -> f64 {
        match self {
            BoundTransform::Identity => u,
            BoundTransform::Finite { lo, hi } => lo + (hi - lo) * sigmoid(u),
            BoundTransform::Lower { lo } => lo + u.exp(),
            BoundTransform::Upper { hi } => hi - u.exp(),
            BoundTransform::Fixed { value } => value,
        }
    }

    /// Parameter -> solver coordinate.
    pub fn inverse(self, x: f64) -> f64 {
        match self {
            BoundTransform::Identity => x,
            BoundTransform::Finite { lo, hi } => {
                let t = ((x - lo) / (hi - lo)).clamp(EDGE_EPS, 1.0 - EDGE_EPS);
                (t / (1.0 - t)).ln()
            }
            BoundTransform::Lower { lo } => (x - lo).max(EDGE_EPS).ln(),
            BoundTransform::Upper { hi } => (hi - x).max(EDGE_EPS).ln(),
            BoundTransform::Fixed { .. } => 0.0,
        }
    }
}

fn sigmoid(u: f64) -> f64 {
    if u >= 0.0 {
        1.0 / (1.0 + (-u).exp())
    } else {
        let z = u.exp();
        z / (1.0 + z)
    }
}

pub fn to_params(transforms: &[BoundTransform], u: &[f64]) -> Vec<f64> {
    u.iter().zip(transforms).map(|(&ui, t)| t.forward(ui)).collect()
}

pub fn to_solver(transforms: &[BoundTransform], x: &[f64]) -> Vec<f64> {
    x.iter().zip(transforms).map(|(&xi, t)| t.inverse(xi)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_inside_bounds() {
        let cases = [
            (Bound::between(0.0, 1.0), 0.3),
            (Bound::at_least(2.0), 5.0),
            (Bound::at_most(-1.0), -4.0),
            (Bound::FREE, 12.5),
        ];
        for (bound, x) in cases {
            let t = BoundTransform::for_bound(&bound);
            assert!((t.forward(t.inverse(x)) - x).abs() < 1e-12, "{bound:?}");
        }
    }

    #[test]
    fn forward_never_leaves_bounds() {
        let t = BoundTransform::for_bound(&Bound::between(0.0, 1.0));
        for u in [-800.0, -30.0, 0.0, 30.0, 800.0] {
            let x = t.forward(u);
            assert!((0.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn degenerate_bound_pins_parameter() {
        let t = BoundTransform::for_bound(&Bound::between(3.0, 3.0));
        assert_eq!(t.forward(17.0), 3.0);
    }
}
