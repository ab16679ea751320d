//! Colour–magnitude diagram stage.
//!
//! Places the target on the Gaia CMD from its photometry and geometric
//! distance, reads a photometric teff/logg/mass off the cooling grid, and
//! samples the reference cooling tracks drawn behind it.

use serde::Serialize;

use crate::data::cooling::CoolingGrid;
use crate::data::gaia::{CatalogService, GaiaSource, GeometricDistance};
use crate::error::AppError;
use crate::math::linspace;

/// Track temperature span (K), hot to cool.
pub const TRACK_TEFF_RANGE: (f64, f64) = (55_000.0, 3_000.0);
pub const TRACK_POINTS: usize = 100;
/// Mass of the single-star reference track and of the unresolved pairs (M☉).
pub const TRACK_PRIMARY_MASS: f64 = 0.6;
pub const TRACK_LOW_MASS: f64 = 0.2;

/// Target position on the CMD. `g_abs_lo`/`g_abs_hi` come from the far and
/// near ends of the distance interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CmdPosition {
    pub bp_rp: f64,
    pub g_abs: f64,
    pub g_abs_lo: f64,
    pub g_abs_hi: f64,
}

impl CmdPosition {
    pub fn new(source: &GaiaSource, distance: &GeometricDistance) -> Self {
        let abs_mag = |d: f64| source.phot_g_mean_mag - 5.0 * d.log10() + 5.0;
        Self {
            bp_rp: source.bp_rp,
            g_abs: abs_mag(distance.r_med_geo),
            g_abs_lo: abs_mag(distance.r_hi_geo),
            g_abs_hi: abs_mag(distance.r_lo_geo),
        }
    }
}

/// Photometric solution with half-range errors across the distance interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PhotometricEstimate {
    pub teff: f64,
    pub e_teff: Option<f64>,
    pub logg: f64,
    pub e_logg: Option<f64>,
    pub mass: f64,
}

pub fn photometric_estimate(grid: &CoolingGrid, pos: &CmdPosition) -> Option<PhotometricEstimate> {
    let mid = grid.from_cmd(pos.bp_rp, pos.g_abs)?;
    let lo = grid.from_cmd(pos.bp_rp, pos.g_abs_lo);
    let hi = grid.from_cmd(pos.bp_rp, pos.g_abs_hi);
    let half = |f: fn(&crate::data::cooling::CmdSolution) -> f64| match (lo, hi) {
        (Some(a), Some(b)) => Some((f(&a) - f(&b)).abs() / 2.0),
        _ => None,
    };
    Some(PhotometricEstimate {
        teff: mid.teff,
        e_teff: half(|s| s.teff),
        logg: mid.logg,
        e_logg: half(|s| s.logg),
        mass: mid.mass,
    })
}

/// Reference tracks: a single 0.6 M☉ white dwarf and two unresolved pairs.
#[derive(Debug, Clone, Default)]
pub struct CmdTracks {
    pub single: Vec<(f64, f64)>,
    pub equal_pair: Vec<(f64, f64)>,
    pub low_mass_pair: Vec<(f64, f64)>,
}

/// Magnitude of two unresolved stars.
pub fn combined_magnitude(m1: f64, m2: f64) -> f64 {
    -2.5 * (10f64.powf(-0.4 * m1) + 10f64.powf(-0.4 * m2)).log10()
}

pub fn reference_tracks(grid: &CoolingGrid) -> CmdTracks {
    let logteffs = linspace(TRACK_TEFF_RANGE.0.log10(), TRACK_TEFF_RANGE.1.log10(), TRACK_POINTS);
    let primary = grid.cmd_track(TRACK_PRIMARY_MASS, &logteffs);
    let low = grid.cmd_track(TRACK_LOW_MASS, &logteffs);
    let mut tracks = CmdTracks::default();
    for (p, l) in primary.iter().zip(low.iter()) {
        let Some((c, m)) = *p else { continue };
        tracks.single.push((c, m));
        tracks.equal_pair.push((c, combined_magnitude(m, m)));
        if let Some((_, ml)) = *l {
            // Colour stays on the primary's track.
            tracks.low_mass_pair.push((c, combined_magnitude(m, ml)));
        }
    }
    tracks
}

/// Everything the CMD artifact and the summary need.
#[derive(Debug, Clone)]
pub struct CmdStage {
    pub source: GaiaSource,
    pub distance: GeometricDistance,
    pub position: CmdPosition,
    pub photometric: Option<PhotometricEstimate>,
    pub tracks: CmdTracks,
}

pub fn run_cmd_stage(
    catalog: &dyn CatalogService,
    source_id: i64,
    grid: Option<&CoolingGrid>,
) -> Result<CmdStage, AppError> {
    let source = catalog.source(source_id)?;
    let distance = catalog.distance(source_id)?;
    let position = CmdPosition::new(&source, &distance);
    let photometric = grid.and_then(|g| photometric_estimate(g, &position));
    match &photometric {
        Some(p) => log::info!(
            "CMD: G_abs={:.2} BP-RP={:.3}; photometric teff={:.0} K logg={:.2} M={:.3}",
            position.g_abs,
            position.bp_rp,
            p.teff,
            p.logg,
            p.mass
        ),
        None => log::info!(
            "CMD: G_abs={:.2} BP-RP={:.3}; no photometric solution on the cooling grid",
            position.g_abs,
            position.bp_rp
        ),
    }
    let tracks = grid.map(reference_tracks).unwrap_or_default();
    Ok(CmdStage {
        source,
        distance,
        position,
        photometric,
        tracks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cooling::toy_cooling_grid;
    use crate::data::gaia::StaticCatalog;

    fn catalog(g: f64, bp_rp: f64) -> StaticCatalog {
        StaticCatalog {
            source: GaiaSource {
                source_id: 0,
                ra: 150.0,
                dec: 2.0,
                parallax: Some(10.0),
                phot_g_mean_mag: g,
                bp_rp,
            },
            distance: GeometricDistance { r_med_geo: 100.0, r_lo_geo: 95.0, r_hi_geo: 105.0 },
        }
    }

    #[test]
    fn near_distance_gives_fainter_absolute_magnitude() {
        let c = catalog(16.0, 0.0);
        let pos = CmdPosition::new(&c.source, &c.distance);
        assert!((pos.g_abs - 11.0).abs() < 1e-12);
        assert!(pos.g_abs_lo < pos.g_abs && pos.g_abs < pos.g_abs_hi);
    }

    #[test]
    fn equal_pair_is_brighter_by_0_75_mag() {
        let m = combined_magnitude(12.0, 12.0);
        assert!((m - (12.0 - 2.5 * 2f64.log10())).abs() < 1e-12);
    }

    #[test]
    fn stage_recovers_toy_track_point() {
        // 0.6 M☉ toy track at logteff 4.0: bp_rp 0.44, G_abs 13.5.
        let grid = toy_cooling_grid();
        let c = catalog(13.5 + 5.0, 0.44);
        let stage = run_cmd_stage(&c, 7, Some(&grid)).unwrap();
        assert_eq!(stage.source.source_id, 7);
        let p = stage.photometric.unwrap();
        assert!((p.mass - 0.6).abs() < 1e-6, "mass={}", p.mass);
        assert!((p.teff.log10() - 4.0).abs() < 1e-6);
        assert!(p.e_logg.is_some());
        assert!(!stage.tracks.single.is_empty());
        assert_eq!(stage.tracks.single.len(), stage.tracks.equal_pair.len());
    }
}
