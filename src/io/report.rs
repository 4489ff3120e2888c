//! Read/write fit report JSON.
//!
//! The schema is [`FitReport`]: method, labels, values, errors, the
//! row-major covariance and a goodness-of-fit scalar.

use std::fs::File;
use std::path::Path;

use crate::domain::FitReport;
use crate::error::Result;

pub fn write_report_json(path: &Path, report: &FitReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

pub fn read_report_json(path: &Path) -> Result<FitReport> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitMethod, GoodnessOfFit, ParamEstimate};
    use nalgebra::DMatrix;

    #[test]
    fn report_survives_a_file_round_trip() {
        let est = ParamEstimate::new(vec![1.0, -2.0], DMatrix::from_row_slice(2, 2, &[0.04, 0.01, 0.01, 0.09]))
            .with_labels(vec!["a".into(), "b".into()]);
        let report = FitReport::new(
            FitMethod::LinearLeastSquares,
            &est,
            GoodnessOfFit::ChiSquare { chi2: 3.2, ndf: 4 },
            6,
        );
        let path = std::env::temp_dir().join(format!("paramfit-report-{}.json", std::process::id()));
        write_report_json(&path, &report).unwrap();
        let back = read_report_json(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(back.labels, report.labels);
        assert_eq!(back.covariance_matrix().unwrap(), est.covariance);
        assert_eq!(back.goodness, report.goodness);
    }
}
