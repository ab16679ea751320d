//! Phase-resolved Balmer profiles for the trailed-spectra figure.
//!
//! Each exposure is cleaned of cosmic rays and interpolated onto the co-add
//! grid. A window around Hγ, Hβ and Hα is continuum-normalised with a straight
//! line through its end pixels, then resampled onto a shared velocity grid.
//! Rows are ordered by orbital phase at the adopted period.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{Exposure, HOURS_PER_DAY, SPEED_OF_LIGHT_KMS};
use crate::error::AppError;
use crate::fit::orbit::orbital_phase;
use crate::math::{interp, linspace, median, solve_least_squares};

/// Lines shown in the trailed spectra: label and rest wavelength (Å, vacuum).
pub const TRAIL_LINES: [(&str, f64); 3] = [("Hγ", 4341.68), ("Hβ", 4862.68), ("Hα", 6564.61)];
/// Half-width of each line window (km/s).
pub const TRAIL_VELOCITY_LIMIT: f64 = 1000.0;
pub const TRAIL_VELOCITY_BINS: usize = 201;
/// Pixels more than this many σ above their running median are cosmic rays.
pub const CR_NSIGMA: f64 = 3.5;
const CR_HALF_WINDOW: usize = 5;
/// Pixels at each end of a window that define the continuum.
const EDGE_PIXELS: usize = 6;

#[derive(Debug, Clone)]
pub struct TrailedLine {
    pub name: &'static str,
    pub centre: f64,
    /// `flux[row][bin]`; rows follow [`TrailedSpectra::phase`].
    pub flux: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct TrailedSpectra {
    pub period_hours: f64,
    /// Orbital phase of each row, increasing.
    pub phase: Vec<f64>,
    /// Velocity bin centres (km/s).
    pub velocity: Vec<f64>,
    /// Lines covered by the grid; may be empty.
    pub lines: Vec<TrailedLine>,
    /// Cosmic-ray pixels replaced, over all exposures.
    pub rejected_pixels: usize,
}

/// Replace pixels lying more than `nsigma` above the median of their
/// neighbourhood with that median, and mask them (ivar = 0).
///
/// Only upward outliers are touched; absorption lines are left alone.
pub fn reject_cosmic_rays(flux: &[f64], ivar: &[f64], nsigma: f64) -> (Vec<f64>, Vec<f64>, usize) {
    let n = flux.len().min(ivar.len());
    let mut clean_flux = flux[..n].to_vec();
    let mut clean_ivar = ivar[..n].to_vec();
    let mut rejected = 0;

    for i in 0..n {
        if !(ivar[i] > 0.0 && flux[i].is_finite()) {
            continue;
        }
        let lo = i.saturating_sub(CR_HALF_WINDOW);
        let hi = (i + CR_HALF_WINDOW + 1).min(n);
        let neighbours: Vec<f64> = (lo..hi)
            .filter(|&j| ivar[j] > 0.0 && flux[j].is_finite())
            .map(|j| flux[j])
            .collect();
        let Some(med) = median(&neighbours) else { continue };
        if (flux[i] - med) * ivar[i].sqrt() > nsigma {
            clean_flux[i] = med;
            clean_ivar[i] = 0.0;
            rejected += 1;
        }
    }
    (clean_flux, clean_ivar, rejected)
}

/// Build the trailed spectra of `exposures` on the co-add `grid` (log10 Å).
pub fn trailed_spectra(exposures: &[Exposure], grid: &[f64], period_hours: f64) -> Result<TrailedSpectra, AppError> {
    if exposures.is_empty() {
        return Err(AppError::insufficient("No exposures for the trailed spectra."));
    }
    if !(period_hours.is_finite() && period_hours > 0.0) {
        return Err(AppError::data(format!("Invalid orbital period: {period_hours} h.")));
    }

    let wavelength: Vec<f64> = grid.iter().map(|&l| 10f64.powf(l)).collect();
    let velocity = linspace(-TRAIL_VELOCITY_LIMIT, TRAIL_VELOCITY_LIMIT, TRAIL_VELOCITY_BINS);
    let windows: Vec<LineWindow> = TRAIL_LINES
        .iter()
        .filter_map(|&(name, centre)| {
            let window = LineWindow::new(name, centre, &wavelength);
            if window.is_none() {
                log::debug!("{name} is not covered by the co-add grid; left out of the trailed spectra.");
            }
            window
        })
        .collect();

    let rows: Vec<(f64, Vec<Vec<f64>>, usize)> = exposures
        .par_iter()
        .map(|exp| {
            let (flux, _, rejected) = reject_cosmic_rays(&exp.flux, &exp.ivar, CR_NSIGMA);
            let on_grid = interp(grid, &exp.log_wavelength, &flux);
            let profiles = windows.iter().map(|w| w.profile(&on_grid, &velocity)).collect();
            let phase = orbital_phase(exp.header.tai_mjd() * HOURS_PER_DAY, period_hours);
            (phase, profiles, rejected)
        })
        .collect();

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by(|&a, &b| rows[a].0.total_cmp(&rows[b].0));

    let rejected_pixels = rows.iter().map(|r| r.2).sum();
    let lines = windows
        .iter()
        .enumerate()
        .map(|(k, w)| TrailedLine {
            name: w.name,
            centre: w.centre,
            flux: order.iter().map(|&i| rows[i].1[k].clone()).collect(),
        })
        .collect();

    Ok(TrailedSpectra {
        period_hours,
        phase: order.iter().map(|&i| rows[i].0).collect(),
        velocity,
        lines,
        rejected_pixels,
    })
}

/// Grid pixels around one line, with their velocities.
struct LineWindow {
    name: &'static str,
    centre: f64,
    pixels: Vec<usize>,
    velocity: Vec<f64>,
}

impl LineWindow {
    fn new(name: &'static str, centre: f64, wavelength: &[f64]) -> Option<Self> {
        // A little wider than the velocity grid so resampling never clamps.
        let limit = 1.05 * TRAIL_VELOCITY_LIMIT;
        let (pixels, velocity): (Vec<usize>, Vec<f64>) = wavelength
            .iter()
            .enumerate()
            .map(|(i, &wl)| (i, SPEED_OF_LIGHT_KMS * (wl - centre) / wl))
            .filter(|(_, v)| v.abs() <= limit)
            .unzip();

        let spans = velocity.first().is_some_and(|&v| v <= -TRAIL_VELOCITY_LIMIT)
            && velocity.last().is_some_and(|&v| v >= TRAIL_VELOCITY_LIMIT);
        if !spans || pixels.len() < 2 * EDGE_PIXELS + 1 {
            return None;
        }
        Some(Self { name, centre, pixels, velocity })
    }

    /// Continuum-normalised flux of this window resampled onto `grid_velocity`.
    /// A window whose continuum cannot be fitted comes back as NaN.
    fn profile(&self, flux: &[f64], grid_velocity: &[f64]) -> Vec<f64> {
        let fl: Vec<f64> = self.pixels.iter().map(|&i| flux[i]).collect();
        let n = fl.len();
        let edges: Vec<usize> = (0..EDGE_PIXELS).chain(n - EDGE_PIXELS..n).collect();

        let mut x = DMatrix::<f64>::zeros(edges.len(), 2);
        let mut y = DVector::<f64>::zeros(edges.len());
        for (row, &i) in edges.iter().enumerate() {
            x[(row, 0)] = 1.0;
            x[(row, 1)] = self.velocity[i];
            y[row] = fl[i];
        }
        let Some(beta) = solve_least_squares(&x, &y) else {
            return vec![f64::NAN; grid_velocity.len()];
        };

        let normalised: Vec<f64> = fl
            .iter()
            .zip(self.velocity.iter())
            .map(|(&f, &v)| {
                let cont = beta[0] + beta[1] * v;
                if cont > 0.0 { f / cont } else { f64::NAN }
            })
            .collect();
        interp(grid_velocity, &self.velocity, &normalised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticStar, synthetic_exposure};
    use crate::spectrum::log_grid;

    fn argmin(values: &[f64]) -> usize {
        (0..values.len())
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap()
    }

    #[test]
    fn cosmic_ray_spike_is_replaced() {
        let mut flux = vec![10.0; 40];
        flux[20] = 60.0;
        flux[5] = 9.0;
        let ivar = vec![1.0; 40];
        let (clean, civar, n) = reject_cosmic_rays(&flux, &ivar, CR_NSIGMA);
        assert_eq!(n, 1);
        assert_eq!(clean[20], 10.0);
        assert_eq!(civar[20], 0.0);
        // Dips are not cosmic rays.
        assert_eq!(clean[5], 9.0);
    }

    #[test]
    fn rows_follow_phase_and_line_cores_follow_velocity() {
        let star = SyntheticStar { snr: 1e5, ..SyntheticStar::default() };
        let period_hours = 4.0;
        // Phases 0.75, 0.25 and 0.5 of the period, moving at -300, +300 and 0 km/s.
        let base = 60_000.0;
        let epochs = [(0.75, -300.0), (0.25, 300.0), (0.5, 0.0)];
        let mut exposures: Vec<Exposure> = epochs
            .iter()
            .enumerate()
            .map(|(i, &(ph, rv))| synthetic_exposure(&star, base + ph * period_hours / HOURS_PER_DAY, rv, i as u64))
            .collect();
        let mid = exposures[2].flux.len() / 2;
        exposures[2].flux[mid] += 1e3;

        let grid = log_grid(3600.0, 9000.0, 6500).unwrap();
        let trail = trailed_spectra(&exposures, &grid, period_hours).unwrap();

        assert_eq!(trail.lines.len(), 3);
        assert_eq!(trail.velocity.len(), TRAIL_VELOCITY_BINS);
        assert_eq!(trail.phase.len(), 3);
        assert!(trail.phase.windows(2).all(|w| w[0] <= w[1]));
        assert!(trail.rejected_pixels >= 1);

        let half = TRAIL_VELOCITY_BINS / 2;
        let expected: [f64; 3] = [300.0, 0.0, -300.0];
        for line in &trail.lines {
            for (row, want) in line.flux.iter().zip(expected) {
                assert!(row.iter().all(|f| f.is_finite()));
                // The edge continuum leans into the broad wings, pulling a
                // shifted core up to ~120 km/s back toward zero.
                let core = trail.velocity[argmin(row)];
                if want == 0.0 {
                    assert!(core.abs() < 50.0, "{} core at {core}", line.name);
                } else {
                    let along = core * want.signum();
                    assert!(along > 120.0 && along < 350.0, "{} core at {core}, expected {want}", line.name);
                }
                assert!((row[0] - 1.0).abs() < 0.1, "{} continuum {}", line.name, row[0]);

                let blue = row[..half].iter().sum::<f64>();
                let red = row[half + 1..].iter().sum::<f64>();
                if want > 0.0 {
                    assert!(red < blue);
                } else if want < 0.0 {
                    assert!(blue < red);
                }
            }
        }
    }

    #[test]
    fn uncovered_lines_are_left_out() {
        let star = SyntheticStar::default();
        let exposures = vec![synthetic_exposure(&star, 60_000.0, 0.0, 1)];
        let grid = log_grid(3600.0, 5500.0, 3000).unwrap();
        let trail = trailed_spectra(&exposures, &grid, 3.0).unwrap();
        let names: Vec<&str> = trail.lines.iter().map(|l| l.name).collect();
        assert_eq!(names, vec!["Hγ", "Hβ"]);
    }
}
