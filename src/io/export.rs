//! Export per-observation residuals to CSV.
//!
//! Columns: `x, y, sigma, fitted, residual, pull`. `sigma` and `pull` are
//! empty when the observations carry no per-point uncertainty.

use std::io::Write;
use std::path::Path;

use crate::domain::ObservationSet;
use crate::error::{FitError, Result};

pub fn write_residuals_csv(path: &Path, obs: &ObservationSet, fitted: &[f64]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_residuals(file, obs, fitted)
}

pub fn write_residuals<W: Write>(writer: W, obs: &ObservationSet, fitted: &[f64]) -> Result<()> {
    if fitted.len() != obs.len() {
        return Err(FitError::Dimension(format!(
            "{} fitted values for {} observations",
            fitted.len(),
            obs.len()
        )));
    }
    let sigmas = obs.sigmas();
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(["x", "y", "sigma", "fitted", "residual", "pull"])?;
    for i in 0..obs.len() {
        let residual = obs.y[i] - fitted[i];
        let (sigma, pull) = match &sigmas {
            Some(s) => (format!("{:.10}", s[i]), format!("{:.6}", residual / s[i])),
            None => (String::new(), String::new()),
        };
        out.write_record([
            format!("{:.10}", obs.x[i]),
            format!("{:.10}", obs.y[i]),
            sigma,
            format!("{:.10}", fitted[i]),
            format!("{:.10}", residual),
            pull,
        ])?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_pulls() {
        let obs = ObservationSet::with_sigma(vec![0.0, 1.0], vec![1.0, 3.0], vec![0.5, 0.5]).unwrap();
        let mut buf = Vec::new();
        write_residuals(&mut buf, &obs, &[1.0, 2.0]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "x,y,sigma,fitted,residual,pull");
        assert!(lines[2].ends_with(",2.000000"), "{}", lines[2]);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let obs = ObservationSet::unweighted(vec![0.0], vec![1.0]).unwrap();
        assert!(write_residuals(Vec::new(), &obs, &[]).is_err());
    }
}
