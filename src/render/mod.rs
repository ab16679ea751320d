//! SVG artifacts.
//!
//! Each stage of a run is drawn with Plotters' SVG backend into an in-memory
//! string; the pipeline writes them out as `<id>_NNN_<name>.svg` (or
//! `<id>_<name>.svg` for the unnumbered diagnostics) and stitches the numbered
//! ones into the summary page (`composite`).
//!
//! We stay on the SVG backend so no system font or bitmap dependencies are
//! needed; text is emitted as `<text>` elements.

use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::AppError;

pub mod cmd;
pub mod composite;
pub mod mass;
pub mod rv;
pub mod spectra;
pub mod trail;

pub use composite::compose_summary;

pub(crate) type Area<'a> = DrawingArea<SVGBackend<'a>, Shift>;
pub(crate) type DrawResult = Result<(), Box<dyn std::error::Error>>;

/// Default artifact size (px).
pub const PLOT_SIZE: (u32, u32) = (800, 800);
pub const WIDE_PLOT_SIZE: (u32, u32) = (1000, 700);

pub(crate) const FONT: &str = "sans-serif";

/// One rendered figure.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Position on the summary page; `None` for figures kept out of it.
    pub index: Option<u32>,
    pub name: &'static str,
    pub width: u32,
    pub height: u32,
    pub svg: String,
}

impl Artifact {
    pub fn file_name(&self, prefix: &str) -> String {
        match self.index {
            Some(index) => format!("{prefix}_{index:03}_{}.svg", self.name),
            None => format!("{prefix}_{}.svg", self.name),
        }
    }
}

/// Render a figure of `size` pixels with `draw` on a white canvas.
pub(crate) fn render_svg<F>(
    index: Option<u32>,
    name: &'static str,
    size: (u32, u32),
    draw: F,
) -> Result<Artifact, AppError>
where
    F: FnOnce(&Area<'_>) -> DrawResult,
{
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, size).into_drawing_area();
        let fail = |e: &dyn std::fmt::Display| AppError::input(format!("Failed to render {name}: {e}"));
        root.fill(&WHITE).map_err(|e| fail(&e))?;
        draw(&root).map_err(|e| fail(&e))?;
        root.present().map_err(|e| fail(&e))?;
    }
    Ok(Artifact {
        index,
        name,
        width: size.0,
        height: size.1,
        svg,
    })
}

/// Finite min/max of `values` widened by `pad` of the span on each side.
/// Degenerate or empty input falls back to a unit range.
pub(crate) fn padded_range(values: impl IntoIterator<Item = f64>, pad: f64) -> (f64, f64) {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values.into_iter().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !(lo.is_finite() && hi.is_finite()) {
        return (0.0, 1.0);
    }
    let span = hi - lo;
    if span <= 0.0 {
        let half = lo.abs().max(1.0) * 0.5;
        return (lo - half, hi + half);
    }
    (lo - pad * span, hi + pad * span)
}

/// Text anchored at the top-right corner of a chart, one entry per line.
pub(crate) fn corner_text(area: &Area<'_>, lines: &[String], size: i32) -> DrawResult {
    let (w, _) = area.dim_in_pixel();
    let style = TextStyle::from((FONT, size).into_font()).pos(Pos::new(HPos::Right, VPos::Top));
    let x = (w as f64 * 0.88) as i32;
    let mut y = (size as f64 * 2.4) as i32;
    for line in lines {
        area.draw(&Text::new(line.clone(), (x, y), style.clone()))?;
        y += (size as f64 * 1.3) as i32;
    }
    Ok(())
}

/// Equal-width histogram over `range`. Returns `(left edge, height)` per bin,
/// normalised to unit area when `density` is set. Values outside the range are
/// ignored.
pub(crate) fn histogram(values: &[f64], range: (f64, f64), bins: usize, density: bool) -> Vec<(f64, f64)> {
    let bins = bins.max(1);
    let width = (range.1 - range.0) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in values {
        if !(v.is_finite() && v >= range.0 && v <= range.1) || width <= 0.0 {
            continue;
        }
        let idx = (((v - range.0) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let total: usize = counts.iter().sum();
    let norm = if density && total > 0 { 1.0 / (total as f64 * width) } else { 1.0 };
    counts
        .iter()
        .enumerate()
        .map(|(i, &c)| (range.0 + width * i as f64, c as f64 * norm))
        .collect()
}

/// Outline of a histogram as a step polyline.
pub(crate) fn step_outline(hist: &[(f64, f64)], range: (f64, f64)) -> Vec<(f64, f64)> {
    let Some(&(first, _)) = hist.first() else {
        return Vec::new();
    };
    let width = (range.1 - range.0) / hist.len() as f64;
    let mut out = vec![(first, 0.0)];
    for &(left, h) in hist {
        out.push((left, h));
        out.push((left + width, h));
    }
    out.push((range.1, 0.0));
    out
}

/// Draw measurements with vertical error bars.
pub(crate) fn draw_error_points<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<plotters::coord::types::RangedCoordf64, plotters::coord::types::RangedCoordf64>>,
    points: &[(f64, f64, f64)],
    color: RGBColor,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    chart.draw_series(
        points
            .iter()
            .map(|&(x, y, e)| PathElement::new(vec![(x, y - e), (x, y + e)], color.stroke_width(2))),
    )?;
    chart.draw_series(points.iter().map(|&(x, y, _)| Circle::new((x, y), 5, color.filled())))?;
    Ok(())
}

/// Blue → yellow → red ramp for `t` in `[0, 1]`.
pub(crate) fn heat_color(t: f64) -> RGBColor {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 1.0 };
    let stops = [(50.0, 100.0, 190.0), (250.0, 240.0, 150.0), (200.0, 30.0, 40.0)];
    let (a, b, u) = if t < 0.5 { (stops[0], stops[1], t * 2.0) } else { (stops[1], stops[2], (t - 0.5) * 2.0) };
    let lerp = |x: f64, y: f64| (x + (y - x) * u).round() as u8;
    RGBColor(lerp(a.0, b.0), lerp(a.1, b.1), lerp(a.2, b.2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_range_handles_degenerate_input() {
        assert_eq!(padded_range(Vec::<f64>::new(), 0.1), (0.0, 1.0));
        assert_eq!(padded_range([5.0, 5.0], 0.1), (2.5, 7.5));
        let (lo, hi) = padded_range([0.0, 10.0, f64::NAN], 0.1);
        assert_eq!((lo, hi), (-1.0, 11.0));
    }

    #[test]
    fn density_histogram_integrates_to_one() {
        let values: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let hist = histogram(&values, (0.0, 1.0), 10, true);
        let area: f64 = hist.iter().map(|(_, h)| h * 0.1).sum();
        assert!((area - 1.0).abs() < 1e-12);
        assert_eq!(hist[0].1, 1.0);
    }

    #[test]
    fn histogram_ignores_out_of_range_values() {
        let hist = histogram(&[-1.0, 0.5, 2.0, f64::NAN], (0.0, 1.0), 2, false);
        assert_eq!(hist, vec![(0.0, 0.0), (0.5, 1.0)]);
    }

    #[test]
    fn rendered_artifact_is_svg() {
        let art = render_svg(Some(1), "test", (200, 100), |root| {
            let mut chart = ChartBuilder::on(root).build_cartesian_2d(0.0..1.0, 0.0..1.0)?;
            chart.draw_series(LineSeries::new(vec![(0.0, 0.0), (1.0, 1.0)], &BLACK))?;
            Ok(())
        })
        .unwrap();
        assert!(art.svg.contains("<svg"));
        assert_eq!(art.file_name("123"), "123_001_test.svg");
        let extra = Artifact { index: None, ..art };
        assert_eq!(extra.file_name("123"), "123_test.svg");
    }

    #[test]
    fn heat_color_endpoints() {
        assert_eq!(heat_color(0.0), RGBColor(50, 100, 190));
        assert_eq!(heat_color(1.0), RGBColor(200, 30, 40));
        assert_eq!(heat_color(f64::NAN), RGBColor(200, 30, 40));
    }
}
