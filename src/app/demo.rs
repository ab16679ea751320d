//! `wdrv demo`: a synthetic binary pushed through the full pipeline offline.
//!
//! The synthetic exposures are split into arms and staged as JSON dumps with a
//! lookup table, so the demo goes through the same loader as a real run. The
//! catalog lookups are answered by a [`StaticCatalog`] placed on the toy
//! cooling grid at the injected atmosphere.

use std::fs;
use std::path::{Path, PathBuf};

use crate::data::synthetic::{SyntheticOrbit, SyntheticStar, synthetic_binary};
use crate::data::{CoolingGrid, GaiaSource, GeometricDistance, ResourcePaths, Resources, StaticCatalog, toy_cooling_grid};
use crate::domain::Exposure;
use crate::error::AppError;
use crate::io::arms::{split_arms, write_arm_json};

/// Distance (pc) the demo star is placed at.
const DEMO_DISTANCE_PC: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct DemoSetup {
    pub catalog_id: u64,
    pub star: SyntheticStar,
    pub orbit: SyntheticOrbit,
    pub n_exposures: usize,
    pub baseline_days: f64,
    pub seed: u64,
}

/// Write each exposure as a blue/red JSON pair plus a lookup table into `dir`.
/// Returns the lookup table path.
pub fn stage_inputs(dir: &Path, catalog_id: u64, exposures: &[Exposure], arm_break_wl: f64) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir).map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;

    let table = dir.join("lookup.csv");
    let mut wtr = csv::Writer::from_path(&table)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", table.display())))?;
    wtr.write_record(["catalogid", "bluefiles", "redfiles"])
        .map_err(|e| AppError::new(2, format!("Failed to write lookup table: {e}")))?;

    for (i, exp) in exposures.iter().enumerate() {
        let (blue, red) = split_arms(exp, arm_break_wl);
        let (b_name, r_name) = (format!("exp{i:03}-b.json"), format!("exp{i:03}-r.json"));
        write_arm_json(&dir.join(&b_name), &blue)?;
        write_arm_json(&dir.join(&r_name), &red)?;
        wtr.write_record([catalog_id.to_string(), b_name, r_name])
            .map_err(|e| AppError::new(2, format!("Failed to write lookup table: {e}")))?;
    }
    wtr.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush '{}': {e}", table.display())))?;
    Ok(table)
}

/// Catalog answers consistent with `star` on `grid`, or `None` when the star
/// is off the grid.
pub fn demo_catalog(star: &SyntheticStar, source_id: i64, grid: &CoolingGrid) -> Option<StaticCatalog> {
    let mass = grid.mass_from_teff_logg(star.teff, star.logg)?;
    let (bp_rp, g_abs) = grid.cmd_track(mass, &[star.teff.log10()]).into_iter().next()??;
    let g_mag = g_abs + 5.0 * DEMO_DISTANCE_PC.log10() - 5.0;
    Some(StaticCatalog {
        source: GaiaSource {
            source_id,
            ra: star.ra,
            dec: star.dec,
            parallax: Some(1000.0 / DEMO_DISTANCE_PC),
            phot_g_mean_mag: g_mag,
            bp_rp,
        },
        distance: GeometricDistance {
            r_med_geo: DEMO_DISTANCE_PC,
            r_lo_geo: 0.95 * DEMO_DISTANCE_PC,
            r_hi_geo: 1.05 * DEMO_DISTANCE_PC,
        },
    })
}

/// Generate the synthetic binary, stage it under `input_dir` and build the
/// resources for the run.
pub fn prepare_demo(
    setup: &DemoSetup,
    input_dir: &Path,
    output_root: PathBuf,
    arm_break_wl: f64,
) -> Result<Resources, AppError> {
    log::info!(
        "Demo: {} exposures over {:.1} d, injected P={:.3} hr K={:.1} km/s gamma={:.1} km/s",
        setup.n_exposures,
        setup.baseline_days,
        setup.orbit.period_hours,
        setup.orbit.k,
        setup.orbit.gamma
    );
    let exposures = synthetic_binary(&setup.star, &setup.orbit, setup.n_exposures, setup.baseline_days, setup.seed);
    let table = stage_inputs(input_dir, setup.catalog_id, &exposures, arm_break_wl)?;

    let grid = toy_cooling_grid();
    let source_id = exposures.iter().find_map(|e| e.header.gaia_source_id);
    let catalog = source_id.and_then(|id| demo_catalog(&setup.star, id, &grid));
    if catalog.is_none() {
        log::warn!("Demo star is off the toy cooling grid; the CMD stage is skipped.");
    }

    Ok(Resources {
        paths: ResourcePaths {
            data_root: input_dir.to_path_buf(),
            lookup_table: Some(table),
            cooling_grid: None,
            reference_catalog: None,
            output_root,
        },
        cooling: Some(grid),
        reference: None,
        catalog: catalog.map(|c| Box::new(c) as Box<dyn crate::data::CatalogService>),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::run_cmd_stage;
    use crate::io::ingest::load_exposure_files;

    #[test]
    fn staged_inputs_load_back() {
        let dir = std::env::temp_dir().join(format!("wdrv-demo-stage-{}", std::process::id()));
        let star = SyntheticStar { n_pixels: 400, ..SyntheticStar::default() };
        let orbit = SyntheticOrbit { gamma: 0.0, k: 100.0, period_hours: 3.0, phi: 0.0 };
        let exposures = synthetic_binary(&star, &orbit, 3, 1.0, 5);

        let table = stage_inputs(&dir, 9, &exposures, 6000.0).unwrap();
        let found = load_exposure_files(&table, &dir, 9).unwrap();
        assert_eq!(found.files.len(), 3);
        let loaded = crate::io::arms::load_exposures(&found.files, 6000.0).unwrap();
        assert_eq!(loaded[0].header, exposures[0].header);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn demo_catalog_places_star_on_its_track() {
        let grid = toy_cooling_grid();
        let star = SyntheticStar::default();
        let catalog = demo_catalog(&star, 11, &grid).unwrap();
        let stage = run_cmd_stage(&catalog, 11, Some(&grid)).unwrap();
        let phot = stage.photometric.unwrap();
        assert!((phot.teff - star.teff).abs() / star.teff < 0.05, "teff {}", phot.teff);
        assert!((phot.logg - star.logg).abs() < 0.1, "logg {}", phot.logg);
    }
}
