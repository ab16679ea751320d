//! 003 colour–magnitude diagram.

use plotters::prelude::*;

use crate::data::cmd::CmdStage;
use crate::error::AppError;
use crate::io::ingest::ReferenceStar;
use crate::render::{Artifact, FONT, PLOT_SIZE, corner_text, render_svg};

const X_RANGE: (f64, f64) = (-0.6, 1.6);
const Y_RANGE: (f64, f64) = (7.0, 16.5);
const DENSITY_BINS: usize = 120;

/// Log-scaled 2-D counts of reference stars on the plot window.
fn density(stars: &[ReferenceStar]) -> Vec<(usize, usize, f64)> {
    let mut counts = vec![0u32; DENSITY_BINS * DENSITY_BINS];
    let bx = (X_RANGE.1 - X_RANGE.0) / DENSITY_BINS as f64;
    let by = (Y_RANGE.1 - Y_RANGE.0) / DENSITY_BINS as f64;
    for s in stars {
        if !(s.bp_rp >= X_RANGE.0 && s.bp_rp < X_RANGE.1 && s.g_abs >= Y_RANGE.0 && s.g_abs < Y_RANGE.1) {
            continue;
        }
        let i = ((s.bp_rp - X_RANGE.0) / bx) as usize;
        let j = ((s.g_abs - Y_RANGE.0) / by) as usize;
        counts[i.min(DENSITY_BINS - 1) * DENSITY_BINS + j.min(DENSITY_BINS - 1)] += 1;
    }
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return Vec::new();
    }
    let scale = (max as f64 + 1.0).ln();
    counts
        .iter()
        .enumerate()
        .filter(|(_, c)| **c > 0)
        .map(|(k, &c)| (k / DENSITY_BINS, k % DENSITY_BINS, (c as f64 + 1.0).ln() / scale))
        .collect()
}

/// 003: reference white dwarfs, cooling tracks and the target.
pub fn cmd_plot(stage: &CmdStage, reference: &[ReferenceStar]) -> Result<Artifact, AppError> {
    let cells = density(reference);
    let pos = stage.position;
    let mut text = vec!["CMD & cooling grid:".to_string()];
    match &stage.photometric {
        Some(p) => {
            let e_t = p.e_teff.map_or_else(String::new, |e| format!(" ± {e:.0}"));
            let e_g = p.e_logg.map_or_else(String::new, |e| format!(" ± {e:.1}"));
            text.push(format!("Teff = {:.0}{e_t} K", p.teff));
            text.push(format!("log g = {:.1}{e_g} dex", p.logg));
        }
        None => text.push("off grid".to_string()),
    }
    let caption = format!("EDR3 {}", stage.source.source_id);

    render_svg(Some(3), "cmd", PLOT_SIZE, |root| {
        // Magnitudes grow downward.
        let mut chart = ChartBuilder::on(root)
            .caption(caption, (FONT, 22))
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(60)
            .build_cartesian_2d(X_RANGE.0..X_RANGE.1, Y_RANGE.1..Y_RANGE.0)?;
        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("BP - RP")
            .y_desc("G_abs")
            .axis_desc_style((FONT, 20))
            .label_style((FONT, 16))
            .draw()?;

        let bx = (X_RANGE.1 - X_RANGE.0) / DENSITY_BINS as f64;
        let by = (Y_RANGE.1 - Y_RANGE.0) / DENSITY_BINS as f64;
        chart.draw_series(cells.iter().map(|&(i, j, t)| {
            let x = X_RANGE.0 + bx * i as f64;
            let y = Y_RANGE.0 + by * j as f64;
            let grey = (235.0 - 200.0 * t).round() as u8;
            Rectangle::new([(x, y), (x + bx, y + by)], RGBColor(grey, grey, grey).filled())
        }))?;

        let tracks = [
            (&stage.tracks.single, RGBColor(30, 144, 255), "0.6 M☉"),
            (&stage.tracks.equal_pair, RGBColor(214, 39, 40), "0.6 + 0.6 M☉"),
            (&stage.tracks.low_mass_pair, RGBColor(255, 127, 14), "0.6 + 0.2 M☉"),
        ];
        for (track, color, label) in tracks {
            if track.is_empty() {
                continue;
            }
            chart
                .draw_series(LineSeries::new(track.iter().copied(), color.stroke_width(2)))?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }

        chart.draw_series(std::iter::once(PathElement::new(
            vec![(pos.bp_rp, pos.g_abs_lo), (pos.bp_rp, pos.g_abs_hi)],
            BLACK.stroke_width(2),
        )))?;
        chart
            .draw_series(std::iter::once(Circle::new((pos.bp_rp, pos.g_abs), 9, RED.filled())))?
            .label("Candidate")
            .legend(|(x, y)| Circle::new((x + 10, y), 5, RED.filled()));
        chart.draw_series(std::iter::once(Circle::new((pos.bp_rp, pos.g_abs), 9, BLACK.stroke_width(2))))?;

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerLeft)
            .label_font((FONT, 16))
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        corner_text(root, &text, 18)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn density_ignores_stars_off_the_window() {
        let stars = [
            ReferenceStar { bp_rp: 0.0, g_abs: 12.0 },
            ReferenceStar { bp_rp: 0.0, g_abs: 12.0 },
            ReferenceStar { bp_rp: 5.0, g_abs: 12.0 },
        ];
        let cells = density(&stars);
        assert_eq!(cells.len(), 1);
        assert!((cells[0].2 - 1.0).abs() < 1e-12);
    }
}
