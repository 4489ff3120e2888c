//! Formatted terminal output.
//!
//! Formatting lives here so estimation code stays free of presentation and
//! output changes stay local.

use crate::domain::{FitReport, GoodnessOfFit};
use crate::fit::ScanPoint;
use crate::report::Residual;

/// Parameter table, goodness of fit and correlation matrix.
pub fn format_fit_summary(report: &FitReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== paramfit - {} ===\n", report.method.display_name()));
    out.push_str(&format!("Observations: {}\n", report.n_observations));
    match report.goodness {
        GoodnessOfFit::ChiSquare { chi2, ndf } => match report.goodness.reduced_chi_square() {
            Some(r) => out.push_str(&format!("chi2 = {chi2:.4} | ndf = {ndf} | chi2/ndf = {r:.4}\n")),
            None => out.push_str(&format!("chi2 = {chi2:.4} | ndf = {ndf} (saturated)\n")),
        },
        GoodnessOfFit::NegativeLogLikelihood { value } => {
            out.push_str(&format!("-ln L = {value:.6}\n"));
        }
    }

    out.push('\n');
    out.push_str(format!("{:<20} {:>14} {:>14}", "parameter", "value", "error").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<20} {:-<14} {:-<14}", "", "", "").trim_end());
    out.push('\n');
    for ((label, v), e) in report.labels.iter().zip(&report.values).zip(&report.errors) {
        out.push_str(&format!("{:<20} {:>14} {:>14}\n", truncate(label, 20), fmt_num(*v), fmt_num(*e)));
    }

    if report.values.len() > 1 {
        out.push_str("\nCorrelation:\n");
        let n = report.values.len();
        for i in 0..n {
            let row: Vec<String> = (0..n)
                .map(|j| {
                    let denom = report.errors[i] * report.errors[j];
                    let rho = if denom > 0.0 { report.covariance[i][j] / denom } else { 0.0 };
                    format!("{rho:>7.3}")
                })
                .collect();
            out.push_str(&format!("{:<20}{}\n", truncate(&report.labels[i], 20), row.join("")));
        }
    }
    out
}

/// Table of the points farthest from the model.
pub fn format_deviations(rows: &[Residual]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:>12} {:>12} {:>12} {:>12} {:>8}", "x", "y", "fitted", "residual", "pull").trim_end());
    out.push('\n');
    for r in rows {
        let pull = r.pull.map(|p| format!("{p:.2}")).unwrap_or_default();
        out.push_str(
            format!(
                "{:>12} {:>12} {:>12} {:>12} {:>8}",
                fmt_num(r.x),
                fmt_num(r.y),
                fmt_num(r.fitted),
                fmt_num(r.residual),
                pull
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Profile scan as `value  Δ(-ln L)` rows.
pub fn format_scan(label: &str, points: &[ScanPoint]) -> String {
    let mut out = format!("Profile of {label}:\n");
    for p in points {
        out.push_str(&format!("{:>14} {:>12.4}\n", fmt_num(p.value), p.delta_nll));
    }
    out
}

fn fmt_num(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e5 || v.abs() < 1e-3) {
        format!("{v:.4e}")
    } else {
        format!("{v:.6}")
    }
}

pub fn fmt_vec(v: &[f64]) -> String {
    let parts: Vec<String> = v.iter().map(|x| fmt_num(*x)).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
