//! 001 co-added spectrum and 002 Balmer-line fits.

use plotters::prelude::*;

use crate::domain::CoaddSpectrum;
use crate::error::AppError;
use crate::math::percentile;
use crate::models::NormalizedLine;
use crate::render::{Artifact, FONT, WIDE_PLOT_SIZE, corner_text, render_svg};

/// Identification printed on the co-add figure.
#[derive(Debug, Clone)]
pub struct TargetLabel {
    pub catalog_id: u64,
    pub gaia_source_id: Option<i64>,
    pub ra: f64,
    pub dec: f64,
    pub g_mag: Option<f64>,
}

impl TargetLabel {
    fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(id) = self.gaia_source_id {
            out.push(format!("Gaia EDR3 {id}"));
        }
        out.push(sdss_name(self.ra, self.dec));
        out.push(format!("CID {}", self.catalog_id));
        out.push(format!("[{:.5}, {:.5}]", self.ra, self.dec));
        if let Some(g) = self.g_mag {
            out.push(format!("G = {g:.1}"));
        }
        out
    }
}

/// IAU-style designation `SDSS Jhhmmss.s±ddmmss.s`.
pub fn sdss_name(ra_deg: f64, dec_deg: f64) -> String {
    // Work in tenths of a time/arc second so rounding carries cleanly.
    let ra_tenths = ((ra_deg.rem_euclid(360.0) / 15.0) * 36_000.0).round() as i64 % (24 * 36_000);
    let (h, rem) = (ra_tenths / 36_000, ra_tenths % 36_000);
    let (m, s) = (rem / 600, rem % 600);

    let sign = if dec_deg < 0.0 { '-' } else { '+' };
    let dec_tenths = (dec_deg.abs() * 36_000.0).round() as i64;
    let (d, rem) = (dec_tenths / 36_000, dec_tenths % 36_000);
    let (am, asec) = (rem / 600, rem % 600);

    format!(
        "SDSS J{h:02}{m:02}{:02}.{}{sign}{d:02}{am:02}{:02}.{}",
        s / 10,
        s % 10,
        asec / 10,
        asec % 10
    )
}

/// 001: rest-frame co-add with the target's identification.
pub fn coadd_plot(coadd: &CoaddSpectrum, label: &TargetLabel) -> Result<Artifact, AppError> {
    let wl = coadd.wavelength();
    let points: Vec<(f64, f64)> = wl
        .iter()
        .zip(coadd.flux.iter().zip(coadd.ivar.iter()))
        .filter(|(_, (f, iv))| f.is_finite() && **iv > 0.0)
        .map(|(&w, (&f, _))| (w, f))
        .collect();
    let fluxes: Vec<f64> = points.iter().map(|p| p.1).collect();
    let lo = percentile(&fluxes, 0.5).unwrap_or(0.0);
    let hi = percentile(&fluxes, 99.5).unwrap_or(1.0);
    let (y0, y1) = (lo.min(0.0), if hi > lo { hi * 1.35 } else { lo + 1.0 });
    let (x0, x1) = (
        wl.first().copied().unwrap_or(3600.0),
        wl.last().copied().unwrap_or(9000.0),
    );
    let text = label.lines();

    render_svg(Some(1), "spec_coadd", WIDE_PLOT_SIZE, |root| {
        let mut chart = ChartBuilder::on(root)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x0..x1, y0..y1)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Wavelength (Å)")
            .y_desc("Flux (1e-17 erg/cm²/s/Å)")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;
        chart.draw_series(LineSeries::new(points.iter().copied(), &BLACK))?;
        corner_text(root, &text, 20)?;
        Ok(())
    })
}

/// Vertical offset between stacked lines.
const LINE_GAP: f64 = 0.35;

/// 002: normalised Balmer lines with the best-fit model, stacked bottom-up
/// from the reddest line.
pub fn line_fit_plot(lines: &[NormalizedLine], teff: f64, logg: f64, rv: f64) -> Result<Artifact, AppError> {
    let mut ordered: Vec<&NormalizedLine> = lines.iter().collect();
    ordered.sort_by(|a, b| b.line.centre.partial_cmp(&a.line.centre).unwrap_or(std::cmp::Ordering::Equal));

    let x_half = ordered.iter().map(|l| l.line.window).fold(50.0, f64::max);
    let n = ordered.len() as f64;
    let caption = format!("Teff = {teff:.0} K, log g = {logg:.2}");

    render_svg(Some(2), "spec_gfp", (600, 700), |root| {
        let mut chart = ChartBuilder::on(root)
            .caption(caption, (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(-x_half..x_half, 0.2..(1.25 + LINE_GAP * n))?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Δλ (Å)")
            .y_desc("Normalized flux + offset")
            .axis_desc_style((FONT, 18))
            .label_style((FONT, 14))
            .draw()?;

        for (k, line) in ordered.iter().enumerate() {
            let offset = LINE_GAP * k as f64;
            let model = line.model(teff, logg, rv);
            let data = line
                .wavelength
                .iter()
                .zip(line.flux.iter())
                .map(|(&w, &f)| (w - line.line.centre, f + offset));
            chart.draw_series(LineSeries::new(data, &BLACK))?;
            let fit = line
                .wavelength
                .iter()
                .zip(model.iter())
                .map(|(&w, &m)| (w - line.line.centre, m + offset));
            chart.draw_series(LineSeries::new(fit, RED.stroke_width(2)))?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticStar, synthetic_spectrum};
    use crate::domain::LineSet;
    use crate::models::normalize_lines;

    #[test]
    fn sdss_designation_formats_and_carries() {
        assert_eq!(sdss_name(150.0, 2.25), "SDSS J100000.0+021500.0");
        assert_eq!(sdss_name(0.5, -0.5), "SDSS J000200.0-003000.0");
        // 59.99 s rounds up into the next minute.
        assert_eq!(sdss_name(15.0 * (59.99 / 3600.0), 0.0), "SDSS J000100.0+000000.0");
    }

    #[test]
    fn line_plot_draws_every_window() {
        let spec = synthetic_spectrum(&SyntheticStar::default(), 0.0, 3);
        let lines = normalize_lines(&spec, LineSet::Full.lines()).unwrap();
        let art = line_fit_plot(&lines, 15_000.0, 8.0, 0.0).unwrap();
        assert_eq!(art.index, Some(2));
        assert!(art.svg.matches("<polyline").count() >= 2 * lines.len());
    }

    #[test]
    fn coadd_plot_labels_target() {
        let spec = synthetic_spectrum(&SyntheticStar::default(), 0.0, 3);
        let coadd = CoaddSpectrum {
            log_wavelength: spec.wavelength.iter().map(|w| w.log10()).collect(),
            flux: spec.flux.clone(),
            ivar: spec.ivar.clone(),
        };
        let label = TargetLabel { catalog_id: 42, gaia_source_id: Some(7), ra: 150.0, dec: 2.0, g_mag: Some(17.2) };
        let art = coadd_plot(&coadd, &label).unwrap();
        assert!(art.svg.contains("CID 42"));
        assert!(art.svg.contains("Gaia EDR3 7"));
    }
}
