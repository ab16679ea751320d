//! 009–011: mass-function and companion-mass figures.

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::AppError;
use crate::mass::MassInference;
use crate::render::{Artifact, FONT, PLOT_SIZE, WIDE_PLOT_SIZE, corner_text, heat_color, histogram, render_svg, step_outline};

const F_RANGE: (f64, f64) = (0.0, 1.0);
const MASS_RANGE: (f64, f64) = (0.0, 1.4);
const HIST_BINS: usize = 25;
/// Colour-scale ceiling for the companion-mass map (M☉).
const GRID_VMAX: f64 = 1.45;

fn peak(hist: &[(f64, f64)]) -> f64 {
    let top = hist.iter().map(|(_, h)| *h).fold(0.0, f64::max);
    if top > 0.0 { top * 1.15 } else { 1.0 }
}

/// 009: distributions of the mass function and the minimum-mass proxy.
pub fn mass_function_plot(inference: &MassInference) -> Result<Artifact, AppError> {
    let f_hist = histogram(&inference.mass_function_samples, F_RANGE, HIST_BINS, true);
    let m_hist = histogram(&inference.minimum_mass_samples, MASS_RANGE, HIST_BINS, true);
    let m1 = inference.primary.mass;

    render_svg(Some(9), "fm_pdf", WIDE_PLOT_SIZE, |root| {
        let (left, right) = root.split_horizontally(WIDE_PLOT_SIZE.0 / 2);
        root.draw(&Text::new(
            format!("M1 = {m1:.2} M☉"),
            ((WIDE_PLOT_SIZE.0 / 2) as i32, 8),
            TextStyle::from((FONT, 22).into_font()).pos(Pos::new(HPos::Center, VPos::Top)),
        ))?;
        let panels = [
            (&left, &f_hist, F_RANGE, "f(M) [M☉]", RGBColor(31, 119, 180)),
            (&right, &m_hist, MASS_RANGE, "f^1/3 M1^2/3 [M☉]", RGBColor(255, 127, 14)),
        ];
        for (area, hist, range, desc, color) in panels {
            let mut chart = ChartBuilder::on(area)
                .margin(20)
                .margin_top(45)
                .x_label_area_size(50)
                .y_label_area_size(60)
                .build_cartesian_2d(range.0..range.1, 0.0..peak(hist))?;
            chart
                .configure_mesh()
                .disable_mesh()
                .x_desc(desc)
                .y_desc("PDF")
                .axis_desc_style((FONT, 20))
                .label_style((FONT, 16))
                .draw()?;
            chart.draw_series(LineSeries::new(step_outline(hist, range), color.stroke_width(2)))?;
        }
        Ok(())
    })
}

/// Segments of a dashed vertical line, `n` dashes long.
fn dashes(from: (f64, f64), to: (f64, f64), n: usize) -> impl Iterator<Item = Vec<(f64, f64)>> {
    let step = (to.1 - from.1) / (2 * n) as f64;
    (0..n).map(move |k| {
        let y = from.1 + step * (2 * k) as f64;
        vec![(from.0, y), (from.0, y + step)]
    })
}

/// 010: companion mass over primary mass and inclination.
pub fn companion_grid_plot(inference: &MassInference) -> Result<Artifact, AppError> {
    let grid = &inference.grid;
    let m1 = inference.primary.mass;
    let step = |v: &[f64]| if v.len() > 1 { v[1] - v[0] } else { 1.0 };
    let (dm, di) = (step(&grid.m1), step(&grid.inclination_deg));
    let x_range = (
        grid.m1.first().copied().unwrap_or(0.0) - dm / 2.0,
        grid.m1.last().copied().unwrap_or(1.0) + dm / 2.0,
    );
    let y_range = (
        grid.inclination_deg.first().copied().unwrap_or(0.0) - di / 2.0,
        grid.inclination_deg.last().copied().unwrap_or(90.0) + di / 2.0,
    );
    let caption = format!("M2 for f(M) = {:.3} M☉", grid.mass_function);

    render_svg(Some(10), "m1_m2_inc", PLOT_SIZE, |root| {
        let (main, bar) = root.split_horizontally(PLOT_SIZE.0 - 130);
        let mut chart = ChartBuilder::on(&main)
            .caption(caption, (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("M1 [M☉]")
            .y_desc("Inclination [deg]")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;
        chart.draw_series(grid.m1.iter().enumerate().flat_map(|(i, &m)| {
            grid.inclination_deg.iter().enumerate().map(move |(j, &inc)| {
                let v = grid.m2[i][j];
                Rectangle::new(
                    [(m - dm / 2.0, inc - di / 2.0), (m + dm / 2.0, inc + di / 2.0)],
                    heat_color(v / GRID_VMAX).filled(),
                )
            })
        }))?;
        chart
            .draw_series(dashes((m1, y_range.0), (m1, y_range.1), 14).map(|seg| PathElement::new(seg, BLACK.stroke_width(2))))?
            .label(format!("M1 = {m1:.2}"))
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK.stroke_width(2)));
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .label_font((FONT, 16))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;

        let mut scale = ChartBuilder::on(&bar)
            .margin(20)
            .margin_top(60)
            .x_label_area_size(50)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..1.0, 0.0..GRID_VMAX)?;
        scale
            .configure_mesh()
            .disable_mesh()
            .disable_x_axis()
            .y_desc("M2 [M☉]")
            .axis_desc_style((FONT, 18))
            .label_style((FONT, 14))
            .draw()?;
        let levels = 64;
        scale.draw_series((0..levels).map(|k| {
            let lo = GRID_VMAX * k as f64 / levels as f64;
            let hi = GRID_VMAX * (k + 1) as f64 / levels as f64;
            Rectangle::new([(0.0, lo), (1.0, hi)], heat_color((lo + hi) / 2.0 / GRID_VMAX).filled())
        }))?;
        Ok(())
    })
}

/// 011: companion and total mass distributions.
pub fn mass_posterior_plot(inference: &MassInference) -> Result<Artifact, AppError> {
    let m2_hist = histogram(&inference.m2_samples, MASS_RANGE, HIST_BINS, true);
    let total_hist = histogram(&inference.total_samples, MASS_RANGE, HIST_BINS, true);
    let text = vec![
        format!("P(Mt > 1) = {:.3}", inference.p_total_above_1),
        format!("P(Mt > 1.4) = {:.3}", inference.p_total_above_chandrasekhar),
    ];
    let caption = format!("P(Mt>1) = {:.2}", inference.p_total_above_1);

    render_svg(Some(11), "prob_m2", PLOT_SIZE, |root| {
        let root = root.titled(&caption, (FONT, 22))?;
        let (top, bottom) = root.split_vertically(PLOT_SIZE.1 / 2 - 20);
        let panels = [
            (&top, &m2_hist, "M2 [M☉]", RGBColor(31, 119, 180)),
            (&bottom, &total_hist, "M1 + M2 [M☉]", RGBColor(214, 39, 40)),
        ];
        for (area, hist, desc, color) in panels {
            let mut chart = ChartBuilder::on(area)
                .margin(15)
                .x_label_area_size(45)
                .y_label_area_size(60)
                .build_cartesian_2d(MASS_RANGE.0..MASS_RANGE.1, 0.0..peak(hist))?;
            chart
                .configure_mesh()
                .disable_mesh()
                .x_desc(desc)
                .y_desc("PDF")
                .axis_desc_style((FONT, 20))
                .label_style((FONT, 16))
                .draw()?;
            chart.draw_series(hist.iter().map(|&(left, h)| {
                let w = (MASS_RANGE.1 - MASS_RANGE.0) / HIST_BINS as f64;
                Rectangle::new([(left, 0.0), (left + w, h)], color.mix(0.35).filled())
            }))?;
            chart.draw_series(LineSeries::new(step_outline(hist, MASS_RANGE), color.stroke_width(2)))?;
        }
        corner_text(&bottom, &text, 16)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mass::{CompanionGrid, Interval, M1Source, PrimaryMass};

    fn inference() -> MassInference {
        let iv = Interval { p16: 0.1, p50: 0.2, p84: 0.3 };
        MassInference {
            primary: PrimaryMass { mass: 0.6, source: M1Source::Override },
            period_hours: 6.0,
            mass_function_mean: 0.1,
            mass_function: iv,
            minimum_mass: iv,
            m2: iv,
            total_mass: iv,
            p_total_above_1: 0.25,
            p_total_above_chandrasekhar: 0.05,
            n_mass_samples: 4,
            grid: CompanionGrid {
                mass_function: 0.1,
                m1: vec![0.2, 0.4],
                inclination_deg: vec![30.0, 60.0],
                m2: vec![vec![0.5, 0.3], vec![0.7, 0.4]],
            },
            mass_function_samples: vec![0.08, 0.1, 0.12, 0.1],
            minimum_mass_samples: vec![0.3, 0.32, 0.35, 0.33],
            m2_samples: vec![0.35, 0.4, 0.6, 0.9],
            total_samples: vec![0.95, 1.0, 1.2, 1.5],
        }
    }

    #[test]
    fn grid_plot_draws_one_cell_per_grid_point() {
        let art = companion_grid_plot(&inference()).unwrap();
        assert_eq!(art.file_name("x"), "x_010_m1_m2_inc.svg");
        assert!(art.svg.matches("<rect").count() >= 4 + 64);
    }

    #[test]
    fn posterior_plot_reports_exceedance() {
        let art = mass_posterior_plot(&inference()).unwrap();
        assert!(art.svg.contains("P(Mt &gt; 1) = 0.250") || art.svg.contains("P(Mt > 1) = 0.250"));
    }

    #[test]
    fn dashes_cover_half_the_line() {
        let segs: Vec<_> = dashes((0.5, 0.0), (0.5, 10.0), 5).collect();
        assert_eq!(segs.len(), 5);
        assert_eq!(segs[0], vec![(0.5, 0.0), (0.5, 1.0)]);
        assert_eq!(segs[4], vec![(0.5, 8.0), (0.5, 9.0)]);
    }

    #[test]
    fn histogram_peak_has_headroom() {
        assert_eq!(peak(&[]), 1.0);
        assert!((peak(&[(0.0, 2.0)]) - 2.3).abs() < 1e-12);
    }
}
