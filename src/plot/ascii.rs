//! ASCII plotting for terminal output.
//!
//! Fixed-size character grid with deterministic output (golden-tested).
//!
//! Plot elements:
//! - data points: `o`
//! - error bars: `|`
//! - model curve: `-`

use std::io::Write;

use crate::error::Result;
use crate::plot::{PlotPayload, RenderSink};

/// Writes an ASCII plot followed by the payload summary.
pub struct AsciiPlot<W> {
    out: W,
    width: usize,
    height: usize,
}

impl<W: Write> AsciiPlot<W> {
    pub fn new(out: W, width: usize, height: usize) -> Self {
        Self { out, width, height }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RenderSink for AsciiPlot<W> {
    fn render(&mut self, payload: &PlotPayload) -> Result<()> {
        if !payload.title.is_empty() {
            writeln!(self.out, "{}", payload.title)?;
        }
        self.out.write_all(render_ascii(payload, self.width, self.height).as_bytes())?;
        if !payload.summary.is_empty() {
            writeln!(self.out)?;
            self.out.write_all(payload.summary.as_bytes())?;
            if !payload.summary.ends_with('\n') {
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}

/// Render points, error bars and curve into a string of `height + 1` lines.
pub fn render_ascii(payload: &PlotPayload, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (x_min, x_max) = payload.x_range().unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_range(payload).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so data overlays it.
    draw_curve(&mut grid, &payload.curve, x_min, x_max, y_min, y_max);

    for p in &payload.points {
        let x = map_x(p.x, x_min, x_max, width);
        if let Some(err) = p.err.filter(|e| e.is_finite() && *e > 0.0) {
            let top = map_y(p.y + err, y_min, y_max, height);
            let bottom = map_y(p.y - err, y_min, y_max, height);
            for row in grid.iter_mut().take(bottom + 1).skip(top) {
                row[x] = '|';
            }
        }
    }
    for p in &payload.points {
        let x = map_x(p.x, x_min, x_max, width);
        let y = map_y(p.y, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: x=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn y_range(payload: &PlotPayload) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in &payload.points {
        let e = p.err.filter(|e| e.is_finite()).unwrap_or(0.0).abs();
        min_y = min_y.min(p.y - e);
        max_y = max_y.max(p.y + e);
    }
    for &(_, y) in &payload.curve {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    (min_y.is_finite() && max_y.is_finite() && max_y > min_y).then_some((min_y, max_y))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let pad = ((max - min).abs() * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top (largest y).
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], x_min: f64, x_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();
    let mut prev = None;
    for &(x, y) in curve.iter().filter(|(_, y)| y.is_finite()) {
        let cx = map_x(x, x_min, x_max, width);
        let cy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, cx, cy, '-'),
            None => grid[cy][cx] = '-',
        }
        prev = Some((cx, cy));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let (mut x0, mut y0) = (x0 as isize, y0 as isize);
    let (x1, y1) = (x1 as isize, y1 as isize);

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0 && (y0 as usize) < grid.len() && x0 >= 0 && (x0 as usize) < grid[0].len() {
            let cell = &mut grid[y0 as usize][x0 as usize];
            if *cell == ' ' {
                *cell = ch;
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
