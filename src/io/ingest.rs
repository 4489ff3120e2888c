//! Text and CSV ingest.
//!
//! Loading is strict: one malformed row fails the whole load and the error
//! names its line. A fit on silently thinned data is worse than no fit.
//!
//! - [`load_observations`]: CSV with named `x`, `y` and optional `sigma` columns
//! - [`load_counts`]: one non-negative integer per line (histogram counts)
//! - [`load_values`]: one float per line (unbinned events)
//!
//! Blank lines and lines starting with `#` are skipped in the line formats.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::domain::ObservationSet;
use crate::error::{FitError, Result};

/// Column names to read from an observation CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    pub x: String,
    pub y: String,
    /// `None` reads no uncertainties; `Some` requires the column.
    pub sigma: Option<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            x: "x".into(),
            y: "y".into(),
            sigma: Some("sigma".into()),
        }
    }
}

impl Columns {
    pub fn without_sigma(mut self) -> Self {
        self.sigma = None;
        self
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        FitError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open '{}': {e}", path.display()),
        ))
    })
}

pub fn load_observations(path: &Path, columns: &Columns) -> Result<ObservationSet> {
    let obs = read_observations(open(path)?, columns)?;
    debug!(path = %path.display(), n = obs.len(), "loaded observations");
    Ok(obs)
}

pub fn read_observations<R: Read>(reader: R, columns: &Columns) -> Result<ObservationSet> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader.headers()?.clone();
    let header_map = build_header_map(&headers);

    let ix = column_index(&header_map, &columns.x)?;
    let iy = column_index(&header_map, &columns.y)?;
    let is = columns.sigma.as_deref().map(|s| column_index(&header_map, s)).transpose()?;

    let (mut x, mut y, mut sigma) = (Vec::new(), Vec::new(), Vec::new());
    for (idx, record) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let record = record.map_err(|e| FitError::InvalidInput(format!("line {line}: {e}")))?;
        x.push(parse_field(&record, ix, &columns.x, line)?);
        y.push(parse_field(&record, iy, &columns.y, line)?);
        if let (Some(i), Some(name)) = (is, columns.sigma.as_deref()) {
            sigma.push(parse_field(&record, i, name, line)?);
        }
    }
    if x.is_empty() {
        return Err(FitError::InvalidInput("CSV contains no data rows".into()));
    }

    if is.is_some() {
        ObservationSet::with_sigma(x, y, sigma)
    } else {
        ObservationSet::unweighted(x, y)
    }
}

pub fn load_counts(path: &Path) -> Result<Vec<u64>> {
    read_lines(BufReader::new(open(path)?), |s| s.parse::<u64>().ok())
}

pub fn load_values(path: &Path) -> Result<Vec<f64>> {
    read_lines(BufReader::new(open(path)?), |s| s.parse::<f64>().ok().filter(|v| v.is_finite()))
}

/// Parse one value per non-blank, non-comment line.
pub fn read_lines<T, R: BufRead>(reader: R, parse: impl Fn(&str) -> Option<T>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let text = line.trim().trim_start_matches('\u{feff}');
        if text.is_empty() || text.starts_with('#') {
            continue;
        }
        let value = parse(text).ok_or_else(|| FitError::InvalidInput(format!("line {}: cannot parse '{text}'", idx + 1)))?;
        out.push(value);
    }
    if out.is_empty() {
        return Err(FitError::InvalidInput("input contains no values".into()));
    }
    Ok(out)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports may prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn column_index(header_map: &HashMap<String, usize>, name: &str) -> Result<usize> {
    header_map
        .get(&normalize_header_name(name))
        .copied()
        .ok_or_else(|| FitError::InvalidInput(format!("missing required column `{name}`")))
}

fn parse_field(record: &StringRecord, idx: usize, name: &str, line: usize) -> Result<f64> {
    let raw = record
        .get(idx)
        .ok_or_else(|| FitError::InvalidInput(format!("line {line}: missing `{name}` value")))?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FitError::InvalidInput(format!("line {line}: invalid `{name}` value '{raw}'")))
}
