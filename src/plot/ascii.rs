//! ASCII/Unicode plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of the orbit after a run
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - measured RVs: `o`
//! - orbit model: `-` line

use crate::domain::RvSeries;
use crate::fit::orbit::{OrbitParams, model_curve, series_phases};

/// Render the RVs folded on `period_hours` with the model curve over one cycle.
pub fn render_phase_plot(
    series: &RvSeries,
    params: &OrbitParams,
    period_hours: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let points: Vec<(f64, f64)> = series_phases(series, period_hours)
        .into_iter()
        .zip(series.rvs())
        .collect();
    let curve = model_curve(params, width);

    let (y_min, y_max) = y_range(&points, &curve).unwrap_or((-1.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so points overlay it.
    draw_curve(&mut grid, &curve, y_min, y_max);
    for &(ph, rv) in &points {
        let x = map_x(ph, width);
        let y = map_y(rv, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Phase-folded RVs: P={period_hours:.3} hr | rv=[{y_min:.1}, {y_max:.1}] km/s\n"
    ));
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

fn y_range(points: &[(f64, f64)], curve: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in points.iter().chain(curve) {
        if y.is_finite() {
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
    }
    (min_y.is_finite() && max_y.is_finite() && max_y > min_y).then_some((min_y, max_y))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(phase: f64, width: usize) -> usize {
    let u = phase.clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(ph, y) in curve {
        let x = map_x(ph, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RvPoint;

    #[test]
    fn plot_golden_snapshot_small() {
        let (series, _) = RvSeries::new(vec![
            RvPoint { mjd: 0.0, rv: 100.0, e_rv: 1.0 },
            RvPoint { mjd: 0.5, rv: 110.0, e_rv: 1.0 },
        ]);
        let flat = OrbitParams { gamma: 100.0, k: 0.0, phi: 0.0 };

        let txt = render_phase_plot(&series, &flat, 24.0, 10, 5);
        let expected = concat!(
            "Phase-folded RVs: P=24.000 hr | rv=[99.5, 110.5] km/s\n",
            "     o    \n",
            "          \n",
            "          \n",
            "          \n",
            "o---------\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn constant_series_without_spread_still_renders() {
        let (series, _) = RvSeries::new(vec![RvPoint { mjd: 0.0, rv: 5.0, e_rv: 1.0 }]);
        let flat = OrbitParams { gamma: 5.0, k: 0.0, phi: 0.0 };
        let txt = render_phase_plot(&series, &flat, 3.0, 12, 6);
        assert_eq!(txt.lines().count(), 7);
    }
}
