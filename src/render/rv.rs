//! 004–006 and 008: RV curve, periodogram and orbit figures, plus the
//! unnumbered least-squares diagnostic.

use plotters::prelude::*;

use crate::domain::{RvSeries, RvVariability};
use crate::error::AppError;
use crate::fit::orbit::{OrbitFit, OrbitParams, model_curve, series_phases};
use crate::period::Periodogram;
use crate::render::{Artifact, FONT, PLOT_SIZE, WIDE_PLOT_SIZE, corner_text, draw_error_points, padded_range, render_svg};
use crate::sampler::posterior::OrbitPosterior;

const MODEL_POINTS: usize = 200;
/// Vertical headroom around the RV data (km/s).
const RV_MARGIN: f64 = 150.0;

fn rv_window(series: &RvSeries) -> (f64, f64) {
    let lo = series.points().iter().map(|p| p.rv).fold(f64::INFINITY, f64::min);
    let hi = series.points().iter().map(|p| p.rv).fold(f64::NEG_INFINITY, f64::max);
    if lo.is_finite() && hi.is_finite() {
        (lo - RV_MARGIN, hi + RV_MARGIN)
    } else {
        (-RV_MARGIN, RV_MARGIN)
    }
}

fn phased_points(series: &RvSeries, period_hours: f64) -> Vec<(f64, f64, f64)> {
    series_phases(series, period_hours)
        .into_iter()
        .zip(series.points())
        .map(|(ph, p)| (ph, p.rv, p.e_rv))
        .collect()
}

/// 004: RV against time.
pub fn rv_time_plot(series: &RvSeries, variability: Option<&RvVariability>) -> Result<Artifact, AppError> {
    let points: Vec<(f64, f64, f64)> = series.points().iter().map(|p| (p.mjd, p.rv, p.e_rv)).collect();
    let (x0, x1) = padded_range(series.times(), 0.05);
    let (y0, y1) = rv_window(series);
    let text = match variability {
        Some(v) => vec![
            format!("χ²_r = {:.2}", v.redchi),
            format!("ΔRV_max = {:.1} km/s", v.delta_rv_max),
        ],
        None => Vec::new(),
    };

    render_svg(Some(4), "rvs", WIDE_PLOT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption("Radial velocities", (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("MJD")
            .y_desc("RV [km/s]")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .x_label_formatter(&|x| format!("{x:.1}"))
            .draw()?;
        draw_error_points(&mut chart, &points, BLACK)?;
        corner_text(root, &text, 18)?;
        Ok(())
    })
}

/// 005: Lomb–Scargle power against frequency.
pub fn periodogram_plot(pgram: &Periodogram) -> Result<Artifact, AppError> {
    let (x0, x1) = padded_range(pgram.frequency.iter().copied(), 0.0);
    let top = pgram.power.iter().copied().filter(|p| p.is_finite()).fold(0.0, f64::max);
    let y1 = if top > 0.0 { top * 1.1 } else { 1.0 };
    let caption = format!("P_best = {:.3} hr", pgram.period_hours());
    let curve: Vec<(f64, f64)> = pgram.frequency.iter().copied().zip(pgram.power.iter().copied()).collect();
    let best = (pgram.best_frequency, pgram.best_power);

    render_svg(Some(5), "lspgram", WIDE_PLOT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(caption, (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, 0.0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Frequency [1/day]")
            .y_desc("Power")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;
        chart.draw_series(LineSeries::new(curve, BLACK.stroke_width(1)))?;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(best.0, 0.0), (best.0, y1)],
            RED.mix(0.6).stroke_width(1),
        )))?;
        Ok(())
    })
}

/// 006: RVs folded on the best period, shown over two cycles.
pub fn phase_folded_plot(series: &RvSeries, period_hours: f64) -> Result<Artifact, AppError> {
    let points = phased_points(series, period_hours);
    let doubled: Vec<(f64, f64, f64)> = points
        .iter()
        .flat_map(|&(ph, rv, e)| [(ph, rv, e), (ph + 1.0, rv, e)])
        .collect();
    let (y0, y1) = rv_window(series);
    let caption = format!("Folded at P = {period_hours:.3} hr");

    render_svg(Some(6), "rvs_pp", PLOT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(caption, (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.1..2.1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Phase")
            .y_desc("RV [km/s]")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;
        draw_error_points(&mut chart, &doubled, BLACK)?;
        Ok(())
    })
}

fn curve_label(params: &OrbitParams) -> String {
    format!("γ = {:.1}, K = {:.1}, φ = {:.2}", params.gamma, params.k, params.phi)
}

/// Least-squares orbit with its linear starting point. Written alongside the
/// numbered figures but left off the summary page.
pub fn orbit_fit_plot(series: &RvSeries, fit: &OrbitFit) -> Result<Artifact, AppError> {
    let points = phased_points(series, fit.period_hours);
    let (y0, y1) = rv_window(series);
    let initial = model_curve(&fit.initial, MODEL_POINTS);
    let best = model_curve(&fit.params, MODEL_POINTS);
    let text = vec![curve_label(&fit.params), format!("χ²_r = {:.2}", fit.redchi)];

    render_svg(None, "init_rvfit", PLOT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(format!("Least-squares orbit, P = {:.3} hr", fit.period_hours), (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.1..1.1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Phase")
            .y_desc("RV [km/s]")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;
        draw_error_points(&mut chart, &points, BLACK)?;
        chart
            .draw_series(LineSeries::new(initial, BLUE.mix(0.7).stroke_width(2)))?
            .label("Initial")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.stroke_width(2)));
        chart
            .draw_series(LineSeries::new(best, RED.stroke_width(2)))?
            .label("Fit")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .label_font((FONT, 16))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        corner_text(root, &text, 16)?;
        Ok(())
    })
}

/// 008: data against posterior predictive curves.
pub fn posterior_plot(series: &RvSeries, posterior: &OrbitPosterior) -> Result<Artifact, AppError> {
    let points = phased_points(series, posterior.period_hours);
    let (y0, y1) = rv_window(series);
    let text = posterior
        .summary
        .iter()
        .map(|s| format!("{} = {:.2} +{:.2} -{:.2}", s.name, s.p50, s.p84 - s.p50, s.p50 - s.p16))
        .collect::<Vec<_>>();

    render_svg(Some(8), "fit_rvs", PLOT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(format!("Posterior draws, P = {:.3} hr", posterior.period_hours), (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(-0.1..1.1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Phase")
            .y_desc("RV [km/s]")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;
        for curve in &posterior.predictive {
            chart.draw_series(LineSeries::new(curve.iter().copied(), RED.mix(0.1).stroke_width(1)))?;
        }
        draw_error_points(&mut chart, &points, BLACK)?;
        corner_text(root, &text, 16)?;
        Ok(())
    })
}
