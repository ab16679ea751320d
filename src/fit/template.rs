//! Template fitting: atmospheric parameters and velocities from Balmer lines.
//!
//! The pipeline only depends on the [`TemplateFitter`] trait. The built-in
//! [`LineProfileFitter`] works in three stages:
//!
//! - continuum-normalise each line window once (independent of parameters)
//! - evaluate a deterministic coarse grid in parallel to pick starting points
//! - refine with bounded Levenberg–Marquardt and report covariance-based errors
//!
//! Full fits are started from the best grid point on each side of the Balmer
//! maximum (cool and hot), and the lower chi-square solution wins.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::domain::{LineSet, ParamEstimate, SpectralFit};
use crate::error::AppError;
use crate::fit::seed_grid::{atmosphere_grid, velocity_grid};
use crate::math::{LmOptions, LmResult, levenberg_marquardt};
use crate::models::{NormalizedLine, line_residuals, normalize_lines};
use crate::spectrum::Spectrum;

pub const PARAM_TEFF: &str = "teff";
pub const PARAM_LOGG: &str = "logg";
pub const PARAM_RV: &str = "rv";

/// Temperature (K) of maximum Balmer-line strength; splits the cool and hot seeds.
const BALMER_MAXIMUM_TEFF: f64 = 12_600.0;

/// Fits a parametrised atmosphere model to a spectrum.
pub trait TemplateFitter: Sync {
    /// Fit teff, logg and rv simultaneously.
    fn fit_spectrum(&self, spectrum: &Spectrum) -> Result<SpectralFit, AppError>;

    /// Fit rv only, holding teff and logg at the values in `template`.
    fn fit_velocity(&self, spectrum: &Spectrum, template: &SpectralFit) -> Result<SpectralFit, AppError>;
}

/// Settings for [`LineProfileFitter`].
#[derive(Debug, Clone)]
pub struct LineProfileOptions {
    pub line_set: LineSet,
    pub teff_bounds: (f64, f64),
    pub logg_bounds: (f64, f64),
    pub rv_bounds: (f64, f64),
    pub teff_seeds: usize,
    pub logg_seeds: usize,
    /// Velocity scan half-range and step (km/s).
    pub rv_scan_limit: f64,
    pub rv_scan_step: f64,
    pub lm: LmOptions,
}

impl LineProfileOptions {
    pub fn new(line_set: LineSet) -> Self {
        Self {
            line_set,
            teff_bounds: (5_000.0, 40_000.0),
            logg_bounds: (6.0, 9.5),
            rv_bounds: (-1_500.0, 1_500.0),
            teff_seeds: 14,
            logg_seeds: 8,
            rv_scan_limit: 1_000.0,
            rv_scan_step: 10.0,
            lm: LmOptions::default(),
        }
    }
}

/// Lorentzian Balmer-line fitter.
#[derive(Debug, Clone)]
pub struct LineProfileFitter {
    opts: LineProfileOptions,
}

impl LineProfileFitter {
    pub fn new(line_set: LineSet) -> Self {
        Self::with_options(LineProfileOptions::new(line_set))
    }

    pub fn with_options(opts: LineProfileOptions) -> Self {
        Self { opts }
    }

    pub fn line_set(&self) -> LineSet {
        self.opts.line_set
    }

    /// Normalised line windows of `spectrum` for this fitter's line set.
    pub fn normalize(&self, spectrum: &Spectrum) -> Result<Vec<NormalizedLine>, AppError> {
        let lines = normalize_lines(spectrum, self.opts.line_set.lines())?;
        let n: usize = lines.iter().map(|l| l.len()).sum();
        if n <= 3 {
            return Err(AppError::insufficient(format!(
                "Only {n} usable pixels in the {} line windows.",
                self.opts.line_set.display_name()
            )));
        }
        Ok(lines)
    }

    /// Best velocity on the scan grid for fixed teff/logg (lowest index wins ties).
    fn scan_velocity(&self, lines: &[NormalizedLine], teff: f64, logg: f64) -> Result<f64, AppError> {
        let grid = velocity_grid(self.opts.rv_scan_limit, self.opts.rv_scan_step)?;
        let scored: Vec<(usize, f64)> = grid
            .par_iter()
            .enumerate()
            .map(|(idx, &rv)| (idx, chi2(lines, teff, logg, rv)))
            .collect();
        best_index(&scored)
            .map(|idx| grid[idx])
            .ok_or_else(|| AppError::data("Velocity scan produced no finite chi-square."))
    }
}

impl TemplateFitter for LineProfileFitter {
    fn fit_spectrum(&self, spectrum: &Spectrum) -> Result<SpectralFit, AppError> {
        let lines = self.normalize(spectrum)?;
        let opts = &self.opts;

        let seeds = atmosphere_grid(opts.teff_bounds, opts.teff_seeds, opts.logg_bounds, opts.logg_seeds)?;
        let scored: Vec<(usize, f64)> = seeds
            .par_iter()
            .enumerate()
            .map(|(idx, s)| (idx, chi2(&lines, s[0], s[1], 0.0)))
            .collect();

        let (cool, hot): (Vec<(usize, f64)>, Vec<(usize, f64)>) = scored
            .iter()
            .copied()
            .partition(|&(idx, _)| seeds[idx][0] < BALMER_MAXIMUM_TEFF);

        let bounds = [opts.teff_bounds, opts.logg_bounds, opts.rv_bounds];
        let mut best: Option<LmResult> = None;
        for side in [&cool, &hot] {
            let Some(idx) = best_index(side) else { continue };
            let [teff, logg] = seeds[idx];
            let rv = self.scan_velocity(&lines, teff, logg)?;
            log::debug!("Seed teff={teff:.0} logg={logg:.2} rv={rv:.1}");

            let res = levenberg_marquardt(
                |p| line_residuals(&lines, p[0], p[1], p[2]),
                &[teff, logg, rv],
                &bounds,
                &opts.lm,
            )?;
            let better = match &best {
                Some(b) => res.chi2 < b.chi2,
                None => true,
            };
            if better {
                best = Some(res);
            }
        }

        let Some(res) = best else {
            return Err(AppError::data("No finite seed for the atmospheric fit."));
        };
        let stderr = res.stderr();
        let mut params = BTreeMap::new();
        params.insert(PARAM_TEFF.to_string(), ParamEstimate { value: res.x[0], stderr: stderr[0] });
        params.insert(PARAM_LOGG.to_string(), ParamEstimate { value: res.x[1], stderr: stderr[1] });
        params.insert(PARAM_RV.to_string(), ParamEstimate { value: res.x[2], stderr: stderr[2] });
        Ok(to_spectral_fit(params, &res))
    }

    fn fit_velocity(&self, spectrum: &Spectrum, template: &SpectralFit) -> Result<SpectralFit, AppError> {
        let (Some(teff), Some(logg)) = (template.value(PARAM_TEFF), template.value(PARAM_LOGG)) else {
            return Err(AppError::data("Template fit is missing teff/logg."));
        };
        let lines = self.normalize(spectrum)?;
        let rv0 = self.scan_velocity(&lines, teff, logg)?;

        let res = levenberg_marquardt(
            |p| line_residuals(&lines, teff, logg, p[0]),
            &[rv0],
            &[self.opts.rv_bounds],
            &self.opts.lm,
        )?;

        let mut params = BTreeMap::new();
        params.insert(PARAM_TEFF.to_string(), ParamEstimate { value: teff, stderr: None });
        params.insert(PARAM_LOGG.to_string(), ParamEstimate { value: logg, stderr: None });
        params.insert(PARAM_RV.to_string(), ParamEstimate { value: res.x[0], stderr: res.stderr()[0] });
        Ok(to_spectral_fit(params, &res))
    }
}

fn chi2(lines: &[NormalizedLine], teff: f64, logg: f64, rv: f64) -> f64 {
    let v: f64 = line_residuals(lines, teff, logg, rv).iter().map(|r| r * r).sum();
    if v.is_finite() { v } else { f64::INFINITY }
}

/// Deterministic selection: minimum chi-square, ties broken by original index.
fn best_index(scored: &[(usize, f64)]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for &(idx, c) in scored {
        if !c.is_finite() {
            continue;
        }
        best = match best {
            Some((bi, bc)) if bc < c || (bc == c && bi < idx) => Some((bi, bc)),
            _ => Some((idx, c)),
        };
    }
    best.map(|(idx, _)| idx)
}

fn to_spectral_fit(params: BTreeMap<String, ParamEstimate>, res: &LmResult) -> SpectralFit {
    SpectralFit {
        params,
        residuals: res.residuals.clone(),
        chi2: res.chi2,
        redchi: res.redchi(),
        n_data: res.n_data(),
        converged: res.converged,
        iterations: res.iterations,
    }
}
