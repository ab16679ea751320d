//! White-dwarf cooling-model grid.
//!
//! The grid is a CSV of model points with columns
//! `mass,logteff,logg,bp_rp,g_abs`, one cooling track per mass. Lookups use
//! track interpolation:
//!
//! - `(logteff, logg) -> mass`: interpolate every track's logg at the requested
//!   logteff, then interpolate mass across tracks at the requested logg
//! - `(bp_rp, g_abs) -> (teff, logg, mass)`: same in the colour–magnitude plane
//!
//! Points outside the span of the tracks are off grid and return `None`.

use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;
use crate::math::{interp_one, linspace};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CoolingPoint {
    pub mass: f64,
    pub logteff: f64,
    pub logg: f64,
    pub bp_rp: f64,
    pub g_abs: f64,
}

/// Model points of a single mass, sorted by increasing logteff.
#[derive(Debug, Clone)]
pub struct CoolingTrack {
    pub mass: f64,
    pub points: Vec<CoolingPoint>,
}

impl CoolingTrack {
    fn column(&self, f: impl Fn(&CoolingPoint) -> f64) -> Vec<f64> {
        self.points.iter().map(f).collect()
    }

    fn logteff_range(&self) -> (f64, f64) {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => (a.logteff, b.logteff),
            _ => (f64::NAN, f64::NAN),
        }
    }

    /// Track quantity at `logteff`, or `None` outside the track.
    fn at_logteff(&self, logteff: f64, f: impl Fn(&CoolingPoint) -> f64) -> Option<f64> {
        let (lo, hi) = self.logteff_range();
        if !(logteff >= lo && logteff <= hi) {
            return None;
        }
        Some(interp_one(logteff, &self.column(|p| p.logteff), &self.column(f)))
    }

    /// Solve for the logteff at which the track reaches colour `bp_rp`.
    fn logteff_at_colour(&self, bp_rp: f64) -> Option<f64> {
        // Colour reddens monotonically as the star cools; sort by colour.
        let mut pairs: Vec<(f64, f64)> = self.points.iter().map(|p| (p.bp_rp, p.logteff)).collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let (first, last) = (pairs.first()?.0, pairs.last()?.0);
        if !(bp_rp >= first && bp_rp <= last) {
            return None;
        }
        let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        Some(interp_one(bp_rp, &xs, &ys))
    }
}

/// Photometric solution from the colour–magnitude diagram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CmdSolution {
    pub teff: f64,
    pub logg: f64,
    pub mass: f64,
}

#[derive(Debug, Clone)]
pub struct CoolingGrid {
    tracks: Vec<CoolingTrack>,
}

impl CoolingGrid {
    /// Group model points into tracks (sorted by mass, each by logteff).
    pub fn from_points(points: Vec<CoolingPoint>) -> Result<Self, AppError> {
        let mut tracks: Vec<CoolingTrack> = Vec::new();
        for p in points {
            if ![p.mass, p.logteff, p.logg, p.bp_rp, p.g_abs].iter().all(|v| v.is_finite()) {
                continue;
            }
            match tracks.iter_mut().find(|t| t.mass == p.mass) {
                Some(track) => track.points.push(p),
                None => tracks.push(CoolingTrack { mass: p.mass, points: vec![p] }),
            }
        }
        tracks.retain(|t| t.points.len() >= 2);
        if tracks.len() < 2 {
            return Err(AppError::data("Cooling grid needs at least two tracks with two points each."));
        }
        for t in &mut tracks {
            t.points
                .sort_by(|a, b| a.logteff.partial_cmp(&b.logteff).unwrap_or(std::cmp::Ordering::Equal));
        }
        tracks.sort_by(|a, b| a.mass.partial_cmp(&b.mass).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Self { tracks })
    }

    pub fn from_csv(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| {
            AppError::input(format!("Failed to open cooling grid '{}': {e}", path.display()))
        })?;
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
        let mut points = Vec::new();
        for (idx, row) in reader.deserialize::<CoolingPoint>().enumerate() {
            let p = row.map_err(|e| {
                AppError::data(format!("Cooling grid '{}' line {}: {e}", path.display(), idx + 2))
            })?;
            points.push(p);
        }
        Self::from_points(points)
    }

    pub fn tracks(&self) -> &[CoolingTrack] {
        &self.tracks
    }

    /// Spectroscopic mass from `teff` (K) and `logg`; `None` when off grid.
    pub fn mass_from_teff_logg(&self, teff: f64, logg: f64) -> Option<f64> {
        if !(teff.is_finite() && teff > 0.0 && logg.is_finite()) {
            return None;
        }
        let logteff = teff.log10();
        let pairs: Vec<(f64, f64)> = self
            .tracks
            .iter()
            .filter_map(|t| t.at_logteff(logteff, |p| p.logg).map(|g| (g, t.mass)))
            .collect();
        interpolate_across(&pairs, logg)
    }

    /// Photometric teff, logg and mass from Gaia colour and absolute magnitude.
    pub fn from_cmd(&self, bp_rp: f64, g_abs: f64) -> Option<CmdSolution> {
        if !(bp_rp.is_finite() && g_abs.is_finite()) {
            return None;
        }
        // For each track: (g_abs, mass, logteff, logg) at the requested colour.
        let mut rows: Vec<(f64, f64, f64, f64)> = Vec::new();
        for t in &self.tracks {
            let Some(lt) = t.logteff_at_colour(bp_rp) else { continue };
            let (Some(mag), Some(logg)) = (t.at_logteff(lt, |p| p.g_abs), t.at_logteff(lt, |p| p.logg)) else {
                continue;
            };
            rows.push((mag, t.mass, lt, logg));
        }
        let pick = |f: fn(&(f64, f64, f64, f64)) -> f64| {
            let pairs: Vec<(f64, f64)> = rows.iter().map(|r| (r.0, f(r))).collect();
            interpolate_across(&pairs, g_abs)
        };
        Some(CmdSolution {
            mass: pick(|r| r.1)?,
            teff: 10f64.powf(pick(|r| r.2)?),
            logg: pick(|r| r.3)?,
        })
    }

    /// Colour–magnitude points `(bp_rp, g_abs)` of a `mass` track at each
    /// `logteff`. Masses between tracks are interpolated linearly; points off
    /// the grid are `None`.
    pub fn cmd_track(&self, mass: f64, logteffs: &[f64]) -> Vec<Option<(f64, f64)>> {
        let Some((lo, hi, w)) = self.bracket(mass) else {
            return vec![None; logteffs.len()];
        };
        logteffs
            .iter()
            .map(|&lt| {
                let colour = |t: &CoolingTrack| t.at_logteff(lt, |p| p.bp_rp);
                let mag = |t: &CoolingTrack| t.at_logteff(lt, |p| p.g_abs);
                let c = colour(lo)? * (1.0 - w) + colour(hi)? * w;
                let m = mag(lo)? * (1.0 - w) + mag(hi)? * w;
                Some((c, m))
            })
            .collect()
    }

    fn bracket(&self, mass: f64) -> Option<(&CoolingTrack, &CoolingTrack, f64)> {
        let first = self.tracks.first()?;
        let last = self.tracks.last()?;
        if !(mass >= first.mass && mass <= last.mass) {
            return None;
        }
        for pair in self.tracks.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if mass >= a.mass && mass <= b.mass {
                let w = if b.mass > a.mass { (mass - a.mass) / (b.mass - a.mass) } else { 0.0 };
                return Some((a, b, w));
            }
        }
        None
    }
}

/// Interpolate `y` at `x` across `(x, y)` pairs; `None` outside their span.
fn interpolate_across(pairs: &[(f64, f64)], x: f64) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let (lo, hi) = (sorted[0].0, sorted[sorted.len() - 1].0);
    if !(x >= lo && x <= hi) {
        return None;
    }
    let xs: Vec<f64> = sorted.iter().map(|p| p.0).collect();
    let ys: Vec<f64> = sorted.iter().map(|p| p.1).collect();
    Some(interp_one(x, &xs, &ys))
}

/// Small analytic grid used by tests and the offline demo.
///
/// logg rises with mass and slightly with cooling; colour reddens and the star
/// fades as it cools; heavier (smaller) stars are fainter.
pub fn toy_cooling_grid() -> CoolingGrid {
    let mut points = Vec::new();
    for &mass in &[0.2, 0.4, 0.6, 0.8, 1.0, 1.2] {
        for lt in linspace(3.5, 4.8, 27) {
            let logg = 7.0 + 2.5 * (mass - 0.2) + 0.05 * (4.8 - lt);
            points.push(CoolingPoint {
                mass,
                logteff: lt,
                logg,
                bp_rp: 2.2 * (4.2 - lt),
                g_abs: 11.0 + 2.0 * (mass - 0.6) + 5.0 * (4.5 - lt),
            });
        }
    }
    // Two tracks of two points each are always present, so this cannot fail.
    CoolingGrid::from_points(points).unwrap_or(CoolingGrid { tracks: Vec::new() })
}
