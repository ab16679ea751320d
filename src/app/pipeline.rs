//! Shared run logic used by both `wdrv run` and `wdrv demo`.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! exposures -> template refinement -> RV series -> period -> trailed spectra -> orbit -> posterior -> masses
//!
//! The two front-ends differ only in where exposures and resources come from.

use std::fs;
use std::path::{Path, PathBuf};

use crate::data::{CmdStage, Resources, run_cmd_stage};
use crate::domain::{
    CoaddSpectrum, Exposure, LineSet, PipelineConfig, RvPoint, RvSeries, RvVariability, SpectralFit,
};
use crate::error::AppError;
use crate::fit::{
    LineProfileFitter, OrbitFit, PARAM_LOGG, PARAM_RV, PARAM_TEFF, Refinement, TemplateFitter, fit_orbit,
    refine_template, rv_series_from_exposures,
};
use crate::io::arms::load_exposures;
use crate::io::export::{
    CmdSummary, ConvergenceFlags, ExposureCounts, RunSummary, timestamp, write_rv_csv, write_summary_json,
};
use crate::io::ingest::load_exposure_files;
use crate::mass::{MassInference, infer_masses, primary_mass};
use crate::models::NormalizedLine;
use crate::period::{FrequencyGrid, Periodogram, lomb_scargle};
use crate::render::spectra::TargetLabel;
use crate::render::{Artifact, compose_summary};
use crate::sampler::posterior::{OrbitPosterior, sample_orbit};
use crate::spectrum::{Spectrum, TrailedSpectra, doppler_corrected, log_grid, make_coadd, trailed_spectra};

/// Summary page rows, by artifact index.
const SUMMARY_ROWS: [&[u32]; 4] = [&[1, 2, 3], &[4, 5, 6], &[7, 8], &[9, 10, 11]];

/// All computed outputs of a single run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub catalog_id: u64,
    pub n_loaded: usize,
    pub refinement: Refinement,
    /// Co-add of the Doppler-corrected exposures.
    pub rest_coadd: CoaddSpectrum,
    pub atmosphere: SpectralFit,
    pub atmosphere_lines: Vec<NormalizedLine>,
    pub series: RvSeries,
    pub dropped: Vec<RvPoint>,
    pub variability: Option<RvVariability>,
    pub periodogram: Periodogram,
    /// Balmer profiles of every exposure, ordered by phase at the periodogram peak.
    pub trail: TrailedSpectra,
    pub orbit: OrbitFit,
    pub posterior: OrbitPosterior,
    pub cmd: Option<CmdStage>,
    pub mass: MassInference,
}

impl RunOutput {
    pub fn teff(&self) -> f64 {
        self.atmosphere.value(PARAM_TEFF).unwrap_or(f64::NAN)
    }

    pub fn logg(&self) -> f64 {
        self.atmosphere.value(PARAM_LOGG).unwrap_or(f64::NAN)
    }

    pub fn measured(&self) -> &[Exposure] {
        &self.refinement.exposures
    }

    /// Gaia source id from the first exposure header that carries one.
    pub fn gaia_source_id(&self) -> Option<i64> {
        gaia_source_id(self.measured())
    }
}

fn gaia_source_id(exposures: &[Exposure]) -> Option<i64> {
    exposures.iter().find_map(|e| e.header.gaia_source_id)
}

/// Look up and load every exposure of `catalog_id`.
pub fn load_target(resources: &Resources, catalog_id: u64, config: &PipelineConfig) -> Result<Vec<Exposure>, AppError> {
    let table = resources.paths.lookup_table()?;
    let found = load_exposure_files(table, &resources.paths.data_root, catalog_id)?;
    for err in &found.row_errors {
        log::warn!("Lookup table line {}: {}", err.line, err.message);
    }
    log::info!("Catalog id {catalog_id}: {} exposures listed", found.files.len());
    load_exposures(&found.files, config.arm_break_wl)
}

/// Execute the full pipeline on loaded exposures.
pub fn run_pipeline(
    catalog_id: u64,
    exposures: &[Exposure],
    resources: &Resources,
    config: &PipelineConfig,
) -> Result<RunOutput, AppError> {
    // 1) Template refinement on the core lines.
    let grid = log_grid(config.grid_min_wl, config.grid_max_wl, config.grid_points)?;
    let core = LineProfileFitter::new(LineSet::Core);
    let refinement = refine_template(exposures, &grid, config, &core)?;
    if !refinement.settled && refinement.passes.len() > 1 {
        log::info!(
            "Template refinement stopped after {} passes without settling.",
            refinement.passes.len()
        );
    }

    // 2) Atmospheric parameters from the rest-frame co-add.
    let corrected = refinement
        .exposures
        .iter()
        .map(doppler_corrected)
        .collect::<Result<Vec<_>, _>>()?;
    let rest_coadd = make_coadd(&corrected, &grid)?;
    let full = LineProfileFitter::new(LineSet::Full);
    let rest = Spectrum::from_coadd(&rest_coadd);
    let atmosphere = full.fit_spectrum(&rest)?;
    let atmosphere_lines = full.normalize(&rest)?;
    if !atmosphere.converged {
        log::warn!("Atmospheric fit ({}) did not converge.", LineSet::Full.display_name());
    }
    let (teff, logg) = match (atmosphere.value(PARAM_TEFF), atmosphere.value(PARAM_LOGG)) {
        (Some(t), Some(g)) => (t, g),
        _ => return Err(AppError::data("Atmospheric fit is missing teff/logg.")),
    };
    log::info!("Atmosphere: teff={teff:.0} K logg={logg:.2}");

    // 3) RV series and variability.
    let (series, dropped) = rv_series_from_exposures(&refinement.exposures);
    for p in &dropped {
        log::warn!("Dropping epoch MJD {:.5} (rv={:.1} km/s): no usable uncertainty.", p.mjd, p.rv);
    }
    let variability = series.variability();
    if let Some(v) = &variability {
        log::info!(
            "RVs: n={} redchi={:.2} ΔRV_max={:.1} km/s",
            series.len(),
            v.redchi,
            v.delta_rv_max
        );
    }

    // 4) Period search.
    let periodogram = lomb_scargle(
        &series,
        &FrequencyGrid {
            min_frequency: config.min_frequency,
            max_frequency: config.max_frequency,
            samples_per_peak: config.samples_per_peak,
        },
    )?;
    log::info!(
        "Periodogram: {} frequencies, best P={:.4} hr (power {:.3})",
        periodogram.frequency.len(),
        periodogram.period_hours(),
        periodogram.best_power
    );

    // 5) Trailed spectra at the periodogram period.
    let trail = trailed_spectra(&refinement.exposures, &grid, periodogram.period_hours())?;
    if trail.rejected_pixels > 0 {
        log::info!("Trailed spectra: replaced {} cosmic-ray pixels.", trail.rejected_pixels);
    }

    // 6) Orbit: least squares then posterior sampling.
    let orbit = fit_orbit(&series, periodogram.period_hours())?;
    if !orbit.converged {
        log::warn!("Least-squares orbit fit did not converge.");
    }
    log::info!(
        "LSQ orbit: gamma={:.1} K={:.1} phi={:.3} redchi={:.2}",
        orbit.params.gamma,
        orbit.params.k,
        orbit.params.phi,
        orbit.redchi
    );
    let posterior = sample_orbit(&series, &orbit, config)?;

    // 7) Optional CMD stage.
    let cmd = match (&resources.catalog, gaia_source_id(&refinement.exposures)) {
        (Some(catalog), Some(id)) => Some(run_cmd_stage(catalog.as_ref(), id, resources.cooling.as_ref())?),
        (Some(_), None) => {
            log::warn!("No Gaia source id in the exposure headers; skipping the CMD stage.");
            None
        }
        (None, _) => {
            log::info!("Offline: skipping the CMD stage.");
            None
        }
    };

    // 8) Masses.
    let photometric = cmd.as_ref().and_then(|c| c.photometric).map(|p| p.mass);
    let primary = primary_mass(config.m1_override, resources.cooling.as_ref(), teff, logg, photometric)?;
    log::info!("Primary mass {:.3} M☉ ({:?})", primary.mass, primary.source);
    let mass = infer_masses(&posterior, primary, config)?;
    log::info!(
        "Mass inference: P(Mt>1)={:.3} P(Mt>1.4)={:.3}",
        mass.p_total_above_1,
        mass.p_total_above_chandrasekhar
    );

    Ok(RunOutput {
        catalog_id,
        n_loaded: exposures.len(),
        refinement,
        rest_coadd,
        atmosphere,
        atmosphere_lines,
        series,
        dropped,
        variability,
        periodogram,
        trail,
        orbit,
        posterior,
        cmd,
        mass,
    })
}

/// Render every artifact the run supports, in index order, with the
/// unnumbered least-squares diagnostic after 007.
pub fn render_artifacts(run: &RunOutput, resources: &Resources) -> Result<Vec<Artifact>, AppError> {
    use crate::render::{cmd, mass, rv, spectra, trail};

    let first = run.measured().first().map(|e| &e.header);
    let label = TargetLabel {
        catalog_id: run.catalog_id,
        gaia_source_id: run.gaia_source_id(),
        ra: first.map_or(f64::NAN, |h| h.ra),
        dec: first.map_or(f64::NAN, |h| h.dec),
        g_mag: run.cmd.as_ref().map(|c| c.source.phot_g_mean_mag),
    };
    let rv_rest = run.atmosphere.value(PARAM_RV).unwrap_or(0.0);

    let mut out = vec![
        spectra::coadd_plot(&run.rest_coadd, &label)?,
        spectra::line_fit_plot(&run.atmosphere_lines, run.teff(), run.logg(), rv_rest)?,
    ];
    if let Some(stage) = &run.cmd {
        let stars = resources.reference.as_ref().map(|r| r.stars.as_slice()).unwrap_or(&[]);
        out.push(cmd::cmd_plot(stage, stars)?);
    }
    out.push(rv::rv_time_plot(&run.series, run.variability.as_ref())?);
    out.push(rv::periodogram_plot(&run.periodogram)?);
    out.push(rv::phase_folded_plot(&run.series, run.periodogram.period_hours())?);
    if run.trail.lines.is_empty() {
        log::warn!("No Balmer line is covered by the co-add grid; skipping the trailed spectra.");
    } else {
        out.push(trail::trailed_spectra_plot(&run.trail)?);
    }
    out.push(rv::orbit_fit_plot(&run.series, &run.orbit)?);
    out.push(rv::posterior_plot(&run.series, &run.posterior)?);
    out.push(mass::mass_function_plot(&run.mass)?);
    out.push(mass::companion_grid_plot(&run.mass)?);
    out.push(mass::mass_posterior_plot(&run.mass)?);
    Ok(out)
}

/// Compose the summary page from whichever artifacts exist.
pub fn summary_page(artifacts: &[Artifact], width: u32) -> String {
    let rows: Vec<Vec<&Artifact>> = SUMMARY_ROWS
        .iter()
        .map(|row| {
            row.iter()
                .filter_map(|idx| artifacts.iter().find(|a| a.index == Some(*idx)))
                .collect::<Vec<_>>()
        })
        .filter(|row| !row.is_empty())
        .collect();
    compose_summary(&rows, width)
}

/// `<output_root>/<id>/`, removed first if it already exists.
pub fn prepare_output_dir(output_root: &Path, catalog_id: u64) -> Result<PathBuf, AppError> {
    let dir = output_root.join(catalog_id.to_string());
    if dir.exists() {
        eprintln!("Output directory '{}' exists; replacing it.", dir.display());
        fs::remove_dir_all(&dir)
            .map_err(|e| AppError::new(2, format!("Failed to remove '{}': {e}", dir.display())))?;
    }
    fs::create_dir_all(&dir)
        .map_err(|e| AppError::new(2, format!("Failed to create '{}': {e}", dir.display())))?;
    Ok(dir)
}

/// Write artifacts, the summary page, the summary JSON and the RV table.
pub fn write_outputs(
    run: &RunOutput,
    artifacts: &[Artifact],
    config: &PipelineConfig,
    dir: &Path,
) -> Result<Vec<PathBuf>, AppError> {
    let prefix = run.catalog_id.to_string();
    let mut written = Vec::with_capacity(artifacts.len() + 3);

    for art in artifacts {
        let path = dir.join(art.file_name(&prefix));
        write_text(&path, &art.svg)?;
        written.push(path);
    }

    let page = dir.join(format!("{prefix}_summary.svg"));
    write_text(&page, &summary_page(artifacts, config.summary_width))?;
    written.push(page);

    let summary = RunSummary {
        catalog_id: run.catalog_id,
        generated_at: timestamp(),
        version: env!("CARGO_PKG_VERSION"),
        config,
        exposures: ExposureCounts {
            loaded: run.n_loaded,
            measured: run.series.len(),
            dropped: run.dropped.len(),
        },
        refinement: &run.refinement.passes,
        template: &run.refinement.template,
        atmosphere: &run.atmosphere,
        variability: run.variability,
        periodogram: &run.periodogram,
        orbit_lsq: &run.orbit,
        posterior: &run.posterior,
        cmd: run.cmd.as_ref().map(|c| CmdSummary {
            source: &c.source,
            distance: &c.distance,
            position: c.position,
            photometric: c.photometric,
        }),
        mass: &run.mass,
        converged: ConvergenceFlags {
            template: run.refinement.template.converged,
            refinement_settled: run.refinement.settled,
            atmosphere: run.atmosphere.converged,
            exposures_converged: run
                .measured()
                .iter()
                .filter(|e| e.rv.is_some_and(|m| m.converged))
                .count(),
            orbit_lsq: run.orbit.converged,
            point_estimate: run.posterior.point_estimate_converged,
        },
        artifacts: artifacts.iter().map(|a| a.file_name(&prefix)).collect(),
    };
    let json = dir.join(format!("{prefix}_summary.json"));
    write_summary_json(&json, &summary)?;
    written.push(json);

    let csv = dir.join(format!("{prefix}_rvs.csv"));
    write_rv_csv(&csv, run.measured())?;
    written.push(csv);

    Ok(written)
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    fs::write(path, text).map_err(|e| AppError::new(2, format!("Failed to write '{}': {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(index: u32) -> Artifact {
        Artifact { index: Some(index), name: "t", width: 100, height: 100, svg: "<svg></svg>".to_string() }
    }

    #[test]
    fn summary_page_skips_missing_artifacts() {
        // No CMD (003) and nothing from the last row.
        let arts: Vec<Artifact> = [1, 2, 4, 5, 6, 7, 8].into_iter().map(artifact).collect();
        let page = summary_page(&arts, 3000);
        assert_eq!(page.matches("<svg").count(), 1 + arts.len());
        // Widest row has three figures: 300 px scaled to 3000.
        assert!(page.contains("scale(10.000000)"));
    }

    #[test]
    fn unnumbered_artifacts_stay_off_the_summary_page() {
        let mut arts: Vec<Artifact> = [1, 2, 3].into_iter().map(artifact).collect();
        arts.push(Artifact { index: None, ..artifact(0) });
        let page = summary_page(&arts, 3000);
        assert_eq!(page.matches("<svg").count(), 1 + 3);
    }

    #[test]
    fn output_dir_is_recreated_empty() {
        let root = std::env::temp_dir().join(format!("wdrv-outdir-{}", std::process::id()));
        let dir = prepare_output_dir(&root, 77).unwrap();
        fs::write(dir.join("stale.svg"), "old").unwrap();

        let again = prepare_output_dir(&root, 77).unwrap();
        assert_eq!(again, root.join("77"));
        assert_eq!(fs::read_dir(&again).unwrap().count(), 0);
        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn demo_binary_runs_end_to_end() {
        use crate::app::demo::{DemoSetup, prepare_demo};
        use crate::data::synthetic::{SyntheticOrbit, SyntheticStar};
        use crate::sampler::posterior::IDX_K;

        let tag = format!("{}-e2e", std::process::id());
        let input_dir = std::env::temp_dir().join(format!("wdrv-in-{tag}"));
        let output_root = std::env::temp_dir().join(format!("wdrv-out-{tag}"));
        let setup = DemoSetup {
            catalog_id: 4242,
            star: SyntheticStar::default(),
            orbit: SyntheticOrbit { gamma: 20.0, k: 150.0, period_hours: 3.5, phi: 0.0 },
            n_exposures: 20,
            baseline_days: 3.0,
            seed: 42,
        };
        let config = PipelineConfig {
            walkers: 32,
            steps: 300,
            burn_in: 150,
            predictive_draws: 10,
            mass_samples: 200,
            plot: false,
            ..PipelineConfig::default()
        };

        let resources = prepare_demo(&setup, &input_dir, output_root.clone(), config.arm_break_wl).unwrap();
        let exposures = load_target(&resources, setup.catalog_id, &config).unwrap();
        assert_eq!(exposures.len(), setup.n_exposures);
        let run = run_pipeline(setup.catalog_id, &exposures, &resources, &config).unwrap();

        // Period within one frequency-resolution element of the injected one.
        let injected = 24.0 / setup.orbit.period_hours;
        assert!(
            (run.periodogram.best_frequency - injected).abs() <= 1.0 / setup.baseline_days,
            "best frequency {} c/d, injected {injected}",
            run.periodogram.best_frequency
        );
        let k = run.posterior.param(IDX_K);
        assert!((k.mean - setup.orbit.k).abs() < 4.0 * k.std + 10.0, "K = {} ± {}", k.mean, k.std);
        assert_eq!(run.trail.lines.len(), 3);
        assert_eq!(run.trail.phase.len(), run.measured().len());
        assert!(run.cmd.is_some());

        let artifacts = render_artifacts(&run, &resources).unwrap();
        let dir = prepare_output_dir(&output_root, setup.catalog_id).unwrap();
        let written = write_outputs(&run, &artifacts, &config, &dir).unwrap();
        assert_eq!(written.len(), artifacts.len() + 3);

        let id = setup.catalog_id;
        for name in [
            format!("{id}_001_spec_coadd.svg"),
            format!("{id}_003_cmd.svg"),
            format!("{id}_007_balmer_pp.svg"),
            format!("{id}_init_rvfit.svg"),
            format!("{id}_011_prob_m2.svg"),
            format!("{id}_summary.svg"),
            format!("{id}_rvs.csv"),
        ] {
            assert!(dir.join(&name).is_file(), "missing {name}");
        }

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join(format!("{id}_summary.json"))).unwrap()).unwrap();
        assert_eq!(json["catalog_id"], id);
        let listed = json["artifacts"].as_array().unwrap();
        assert_eq!(listed.len(), artifacts.len());
        assert!(listed.iter().any(|a| a == &format!("{id}_007_balmer_pp.svg")));

        fs::remove_dir_all(&input_dir).ok();
        fs::remove_dir_all(&output_root).ok();
    }
}
