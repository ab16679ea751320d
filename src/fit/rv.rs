//! Per-exposure velocities and the template refinement loop.
//!
//! One refinement pass is:
//!
//! 1. co-add the (rest-frame) exposures
//! 2. fit the template to the co-add
//! 3. fit each original exposure's velocity with the template shape held fixed
//!
//! The first pass co-adds the exposures as observed. Later passes co-add
//! Doppler-corrected copies built from the previous pass's velocities. The loop
//! stops after `refine_passes` or once teff and logg move by less than
//! `refine_epsilon` (relative) between passes.

use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{CoaddSpectrum, Exposure, PipelineConfig, RvMeasurement, RvPoint, RvSeries, SpectralFit};
use crate::error::AppError;
use crate::fit::template::{PARAM_LOGG, PARAM_RV, PARAM_TEFF, TemplateFitter};
use crate::spectrum::{Spectrum, doppler_corrected, make_coadd};

/// Fit the velocity of every exposure against `template`.
///
/// Returns new exposure records carrying their [`RvMeasurement`]; the input set
/// is not modified. Only pixels with `fit_min_wl < λ < fit_max_wl` are used.
pub fn fit_exposure_rvs(
    exposures: &[Exposure],
    template: &SpectralFit,
    fitter: &dyn TemplateFitter,
    config: &PipelineConfig,
) -> Result<Vec<Exposure>, AppError> {
    exposures
        .par_iter()
        .enumerate()
        .map(|(idx, exp)| {
            let spectrum = Spectrum::from_exposure_in_range(exp, config.fit_min_wl, config.fit_max_wl);
            let fit = fitter.fit_velocity(&spectrum, template).map_err(|e| {
                AppError::new(e.exit_code(), format!("Exposure {idx}: {}", e.message()))
            })?;
            let Some(rv) = fit.get(PARAM_RV) else {
                return Err(AppError::data(format!("Exposure {idx}: velocity fit returned no rv.")));
            };
            if !fit.converged {
                log::warn!("Exposure {idx}: velocity fit did not converge (rv={:.1} km/s).", rv.value);
            }
            log::debug!(
                "Exposure {idx}: rv={:.2} ± {} km/s",
                rv.value,
                rv.stderr.map_or_else(|| "n/a".to_string(), |e| format!("{e:.2}"))
            );
            Ok(exp.with_rv(RvMeasurement {
                rv: rv.value,
                e_rv: rv.stderr,
                converged: fit.converged,
            }))
        })
        .collect()
}

/// Template parameters after one refinement pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RefinePass {
    pub pass: usize,
    pub teff: f64,
    pub logg: f64,
    pub rv: f64,
    pub converged: bool,
}

/// Result of [`refine_template`].
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Co-add of the exposures as observed (first pass).
    pub initial_coadd: CoaddSpectrum,
    /// Co-add used by the last pass (rest frame when more than one pass ran).
    pub coadd: CoaddSpectrum,
    pub template: SpectralFit,
    /// Original exposures with the last pass's velocities attached.
    pub exposures: Vec<Exposure>,
    pub passes: Vec<RefinePass>,
    /// True when the loop stopped on the epsilon criterion.
    pub settled: bool,
}

/// Run the fit → correct → re-fit loop.
pub fn refine_template(
    exposures: &[Exposure],
    grid: &[f64],
    config: &PipelineConfig,
    fitter: &dyn TemplateFitter,
) -> Result<Refinement, AppError> {
    if exposures.is_empty() {
        return Err(AppError::insufficient("No exposures to fit."));
    }
    let max_passes = config.refine_passes.max(1);

    let initial_coadd = make_coadd(exposures, grid)?;
    let mut coadd = initial_coadd.clone();
    let mut template = fitter.fit_spectrum(&Spectrum::from_coadd(&coadd))?;
    let mut measured = fit_exposure_rvs(exposures, &template, fitter, config)?;
    let mut passes = vec![summarize_pass(1, &template)?];
    log_pass(&passes[0]);
    let mut settled = false;

    for pass in 2..=max_passes {
        let corrected = measured
            .iter()
            .map(doppler_corrected)
            .collect::<Result<Vec<_>, _>>()?;
        coadd = make_coadd(&corrected, grid)?;
        template = fitter.fit_spectrum(&Spectrum::from_coadd(&coadd))?;
        measured = fit_exposure_rvs(exposures, &template, fitter, config)?;

        let current = summarize_pass(pass, &template)?;
        log_pass(&current);
        let prev = passes[passes.len() - 1];
        passes.push(current);

        if relative_change(prev.teff, current.teff) < config.refine_epsilon
            && relative_change(prev.logg, current.logg) < config.refine_epsilon
        {
            settled = true;
            break;
        }
    }

    Ok(Refinement {
        initial_coadd,
        coadd,
        template,
        exposures: measured,
        passes,
        settled,
    })
}

fn summarize_pass(pass: usize, fit: &SpectralFit) -> Result<RefinePass, AppError> {
    let (Some(teff), Some(logg)) = (fit.value(PARAM_TEFF), fit.value(PARAM_LOGG)) else {
        return Err(AppError::data("Template fit is missing teff/logg."));
    };
    if !fit.converged {
        log::warn!("Template fit (pass {pass}) did not converge after {} iterations.", fit.iterations);
    }
    Ok(RefinePass {
        pass,
        teff,
        logg,
        rv: fit.value(PARAM_RV).unwrap_or(0.0),
        converged: fit.converged,
    })
}

fn log_pass(p: &RefinePass) {
    log::info!(
        "Template pass {}: teff={:.0} K logg={:.2} rv={:.1} km/s",
        p.pass,
        p.teff,
        p.logg,
        p.rv
    );
}

fn relative_change(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(f64::MIN_POSITIVE);
    (b - a).abs() / scale
}

/// Build the RV series from measured exposures (time = TAI start as MJD).
///
/// Exposures without a usable uncertainty are returned separately.
pub fn rv_series_from_exposures(exposures: &[Exposure]) -> (RvSeries, Vec<RvPoint>) {
    let mut points = Vec::with_capacity(exposures.len());
    let mut missing = Vec::new();
    for exp in exposures {
        let Some(m) = exp.rv else { continue };
        let point = RvPoint {
            mjd: exp.header.tai_mjd(),
            rv: m.rv,
            e_rv: m.e_rv.unwrap_or(f64::NAN),
        };
        if m.e_rv.is_some() {
            points.push(point);
        } else {
            missing.push(point);
        }
    }
    let (series, mut dropped) = RvSeries::new(points);
    dropped.extend(missing);
    (series, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticStar, synthetic_exposure};
    use crate::domain::LineSet;
    use crate::fit::template::LineProfileFitter;
    use crate::spectrum::log_grid;

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            grid_points: 3000,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn two_exposure_correction_recovers_rest_frame() {
        let star = SyntheticStar::default();
        let exposures = vec![
            synthetic_exposure(&star, 60_000.1, 100.0, 21),
            synthetic_exposure(&star, 60_000.2, 0.0, 22),
        ];
        let config = test_config();
        let grid = log_grid(config.grid_min_wl, config.grid_max_wl, config.grid_points).unwrap();
        let fitter = LineProfileFitter::new(LineSet::Core);

        let out = refine_template(&exposures, &grid, &config, &fitter).unwrap();
        assert!(out.passes.len() >= 2);

        // After correction the co-add sits at rest.
        let final_rv = out.template.value(PARAM_RV).unwrap();
        assert!(final_rv.abs() < 5.0, "co-add rv={final_rv}");

        let rvs: Vec<f64> = out.exposures.iter().map(|e| e.rv.unwrap().rv).collect();
        assert!((rvs[0] - 100.0).abs() < 10.0, "rv0={}", rvs[0]);
        assert!(rvs[1].abs() < 10.0, "rv1={}", rvs[1]);

        // Inputs are untouched.
        assert!(exposures.iter().all(|e| e.rv.is_none()));
    }

    #[test]
    fn series_skips_exposures_without_errors() {
        let star = SyntheticStar { n_pixels: 50, ..SyntheticStar::default() };
        let a = synthetic_exposure(&star, 60_000.5, 0.0, 1)
            .with_rv(RvMeasurement { rv: 10.0, e_rv: Some(2.0), converged: true });
        let b = synthetic_exposure(&star, 60_000.25, 0.0, 2)
            .with_rv(RvMeasurement { rv: 5.0, e_rv: None, converged: false });
        let (series, dropped) = rv_series_from_exposures(&[a, b]);
        assert_eq!(series.len(), 1);
        assert_eq!(dropped.len(), 1);
        assert!((series.points()[0].mjd - 60_000.5).abs() < 1e-9);
    }
}
