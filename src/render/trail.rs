//! 007 trailed Balmer spectra: one panel per line, phase down, velocity across.

use plotters::prelude::*;

use crate::error::AppError;
use crate::render::{Artifact, FONT, heat_color, render_svg};
use crate::spectrum::TrailedSpectra;

/// Normalised flux spanned by the colour ramp.
const FLUX_RANGE: (f64, f64) = (0.5, 1.0);
const TRAIL_SIZE: (u32, u32) = (1000, 520);

/// Lower and upper phase of each row: halfway to the neighbouring rows, and a
/// half step beyond the outermost ones.
fn row_edges(phase: &[f64]) -> Vec<(f64, f64)> {
    let n = phase.len();
    match n {
        0 => Vec::new(),
        1 => vec![(phase[0] - 0.05, phase[0] + 0.05)],
        _ => (0..n)
            .map(|i| {
                let lo = if i == 0 {
                    phase[0] - (phase[1] - phase[0]) / 2.0
                } else {
                    (phase[i - 1] + phase[i]) / 2.0
                };
                let hi = if i == n - 1 {
                    phase[n - 1] + (phase[n - 1] - phase[n - 2]) / 2.0
                } else {
                    (phase[i] + phase[i + 1]) / 2.0
                };
                (lo, hi)
            })
            .collect(),
    }
}

/// 007: continuum-normalised Hγ, Hβ and Hα profiles of every exposure,
/// sorted by orbital phase.
pub fn trailed_spectra_plot(trail: &TrailedSpectra) -> Result<Artifact, AppError> {
    let rows = row_edges(&trail.phase);
    let (y_top, y_bottom) = (
        rows.first().map_or(0.0, |r| r.0),
        rows.last().map_or(1.0, |r| r.1),
    );
    let dv = match trail.velocity.as_slice() {
        [a, b, ..] => b - a,
        _ => 1.0,
    };
    let (v0, v1) = (
        trail.velocity.first().copied().unwrap_or(-1.0) - dv / 2.0,
        trail.velocity.last().copied().unwrap_or(1.0) + dv / 2.0,
    );
    let title = format!("Phase-folded Balmer lines, P = {:.3} hr", trail.period_hours);

    render_svg(Some(7), "balmer_pp", TRAIL_SIZE, |root| {
        let root = root.titled(&title, (FONT, 22))?;
        let panels = root.split_evenly((1, trail.lines.len().max(1)));
        for (k, (panel, line)) in panels.iter().zip(&trail.lines).enumerate() {
            let first = k == 0;
            // Phase grows downward.
            let mut chart = ChartBuilder::on(panel)
                .caption(format!("{} (λ{:.0} Å)", line.name, line.centre), (FONT, 18))
                .margin(10)
                .x_label_area_size(45)
                .y_label_area_size(if first { 55 } else { 0 })
                .build_cartesian_2d(v0..v1, y_bottom..y_top)?;

            let mut mesh = chart.configure_mesh();
            mesh.disable_mesh()
                .x_desc("ΔRV [km/s]")
                .x_labels(5)
                .axis_desc_style((FONT, 16))
                .label_style((FONT, 13));
            if first {
                mesh.y_desc("Phase");
            } else {
                mesh.disable_y_axis();
            }
            mesh.draw()?;

            chart.draw_series(line.flux.iter().zip(rows.iter()).flat_map(|(row, &(lo, hi))| {
                trail
                    .velocity
                    .iter()
                    .zip(row.iter())
                    .filter(|(_, f)| f.is_finite())
                    .map(move |(&v, &f)| {
                        let t = (f - FLUX_RANGE.0) / (FLUX_RANGE.1 - FLUX_RANGE.0);
                        Rectangle::new([(v - dv / 2.0, lo), (v + dv / 2.0, hi)], heat_color(t).filled())
                    })
            }))?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::TrailedLine;

    #[test]
    fn row_edges_meet_halfway() {
        let edges = row_edges(&[0.2, 0.4, 0.8]);
        let want = [(0.1, 0.3), (0.3, 0.6), (0.6, 1.0)];
        assert_eq!(edges.len(), 3);
        for ((lo, hi), (wlo, whi)) in edges.iter().zip(want) {
            assert!((lo - wlo).abs() < 1e-12 && (hi - whi).abs() < 1e-12, "{lo}..{hi}");
        }
        let single = row_edges(&[0.5])[0];
        assert!((single.0 - 0.45).abs() < 1e-12 && (single.1 - 0.55).abs() < 1e-12);
        assert!(row_edges(&[]).is_empty());
    }

    #[test]
    fn every_finite_cell_is_drawn() {
        let velocity = vec![-100.0, 0.0, 100.0];
        let line = |name| TrailedLine {
            name,
            centre: 4861.0,
            flux: vec![vec![1.0, 0.6, 1.0], vec![1.0, f64::NAN, 0.7]],
        };
        let trail = TrailedSpectra {
            period_hours: 3.5,
            phase: vec![0.25, 0.75],
            velocity,
            lines: vec![line("Hβ"), line("Hα")],
            rejected_pixels: 0,
        };
        let art = trailed_spectra_plot(&trail).unwrap();
        assert_eq!(art.index, Some(7));
        assert_eq!(art.file_name("9"), "9_007_balmer_pp.svg");
        assert!(art.svg.contains("Hα"));
        // 5 finite cells per panel, plus the white background.
        assert!(art.svg.matches("<rect").count() >= 2 * 5 + 1);
    }
}
