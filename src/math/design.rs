//! Design-matrix construction.

use nalgebra::DMatrix;

use crate::error::{FitError, Result};
use crate::math::basis::Basis;

/// Build the N×P matrix with entry `(i, j) = basis[j](x[i])`.
pub fn design_matrix(x: &[f64], basis: &[Basis]) -> Result<DMatrix<f64>> {
    if basis.is_empty() {
        return Err(FitError::Dimension("basis set is empty".into()));
    }
    let n = x.len();
    let p = basis.len();
    let mut a = DMatrix::<f64>::zeros(n, p);

    for (j, b) in basis.iter().enumerate() {
        let column = b.evaluate(x);
        if column.len() != n {
            return Err(FitError::Dimension(format!(
                "basis '{}' returned {} values for {} samples",
                b.label(),
                column.len(),
                n
            )));
        }
        for (i, v) in column.into_iter().enumerate() {
            if !v.is_finite() {
                return Err(FitError::InvalidInput(format!(
                    "basis '{}' is not finite at x = {}",
                    b.label(),
                    x[i]
                )));
            }
            a[(i, j)] = v;
        }
    }

    Ok(a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_follow_basis_order() {
        let a = design_matrix(&[0.0, 1.0, 2.0], &[Basis::constant(), Basis::monomial(2)]).unwrap();
        assert_eq!(a.shape(), (3, 2));
        assert_eq!(a[(2, 0)], 1.0);
        assert_eq!(a[(2, 1)], 4.0);
    }

    #[test]
    fn wrong_column_length_is_a_dimension_error() {
        let bad = Basis::columnwise("truncated", |xs: &[f64]| xs.iter().skip(1).copied().collect());
        let err = design_matrix(&[0.0, 1.0], &[Basis::constant(), bad]).unwrap_err();
        assert!(matches!(err, FitError::Dimension(_)));
    }

    #[test]
    fn non_finite_entry_is_rejected() {
        let err = design_matrix(&[-1.0, 1.0], &[Basis::parse("ln").unwrap()]).unwrap_err();
        assert!(matches!(err, FitError::InvalidInput(_)));
    }
}
