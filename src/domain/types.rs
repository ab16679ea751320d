//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON/CSV
//! - loaded from JSON exposure dumps in tests and demos
//!
//! Records follow value semantics: a stage that changes an exposure (attaching a
//! velocity, shifting it to the rest frame) returns a new record and leaves the
//! loaded set untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::constants::SECONDS_PER_DAY;

/// Header metadata carried by each exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureHeader {
    /// Exposure start (TAI seconds).
    pub tai_beg: f64,
    pub mjd: f64,
    pub airmass: f64,
    /// Heliocentric velocity correction (km/s).
    pub helio_rv: f64,
    pub az: f64,
    pub alt: f64,
    pub ra: f64,
    pub dec: f64,
    /// Gaia EDR3 source id, when the plate file carries one.
    pub gaia_source_id: Option<i64>,
}

impl ExposureHeader {
    /// Exposure start as fractional MJD, derived from the TAI timestamp.
    pub fn tai_mjd(&self) -> f64 {
        self.tai_beg / SECONDS_PER_DAY
    }
}

/// A fitted velocity and its parametric standard error (km/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RvMeasurement {
    pub rv: f64,
    /// `None` when the fitter could not estimate a covariance.
    pub e_rv: Option<f64>,
    pub converged: bool,
}

/// One observation epoch (blue and red arms already merged).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exposure {
    pub header: ExposureHeader,
    /// log10 wavelength (Å), increasing.
    pub log_wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
    /// Instrumental dispersion per pixel.
    pub wdisp: Vec<f64>,
    pub sky: Vec<f64>,
    #[serde(default)]
    pub rv: Option<RvMeasurement>,
}

impl Exposure {
    /// Linear wavelengths (Å).
    pub fn wavelength(&self) -> Vec<f64> {
        self.log_wavelength.iter().map(|&l| 10f64.powf(l)).collect()
    }

    /// Return a copy carrying the given velocity measurement.
    pub fn with_rv(&self, rv: RvMeasurement) -> Exposure {
        Exposure {
            rv: Some(rv),
            ..self.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.log_wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log_wavelength.is_empty()
    }
}

/// Co-added flux and inverse variance on a fixed log-wavelength grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoaddSpectrum {
    pub log_wavelength: Vec<f64>,
    pub flux: Vec<f64>,
    pub ivar: Vec<f64>,
}

impl CoaddSpectrum {
    pub fn wavelength(&self) -> Vec<f64> {
        self.log_wavelength.iter().map(|&l| 10f64.powf(l)).collect()
    }
}

/// A value with an optional parametric standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamEstimate {
    pub value: f64,
    pub stderr: Option<f64>,
}

/// Output of one template-fitter call. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralFit {
    pub params: BTreeMap<String, ParamEstimate>,
    /// Per-pixel normalized residuals `(data - model) * sqrt(ivar)`.
    #[serde(skip)]
    pub residuals: Vec<f64>,
    pub chi2: f64,
    pub redchi: f64,
    pub n_data: usize,
    pub converged: bool,
    pub iterations: usize,
}

impl SpectralFit {
    pub fn get(&self, name: &str) -> Option<ParamEstimate> {
        self.params.get(name).copied()
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.params.get(name).map(|p| p.value)
    }
}

/// One Balmer line used by the line-profile model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalmerLine {
    pub name: &'static str,
    /// Vacuum rest wavelength (Å).
    pub centre: f64,
    /// Half-width of the fitting window (Å).
    pub window: f64,
    /// Width of the continuum edge regions at each end of the window (Å).
    pub edge: f64,
}

const CORE_LINES: [BalmerLine; 4] = [
    BalmerLine { name: "d", centre: 4102.89, window: 70.0, edge: 20.0 },
    BalmerLine { name: "g", centre: 4341.68, window: 85.0, edge: 20.0 },
    BalmerLine { name: "b", centre: 4862.68, window: 200.0, edge: 50.0 },
    BalmerLine { name: "a", centre: 6564.61, window: 200.0, edge: 50.0 },
];

const FULL_LINES: [BalmerLine; 7] = [
    BalmerLine { name: "n", centre: 3835.5, window: 15.0, edge: 5.0 },
    BalmerLine { name: "z", centre: 3890.12, window: 25.0, edge: 5.0 },
    BalmerLine { name: "e", centre: 3971.20, window: 30.0, edge: 5.0 },
    BalmerLine { name: "d", centre: 4102.89, window: 70.0, edge: 20.0 },
    BalmerLine { name: "g", centre: 4341.68, window: 85.0, edge: 20.0 },
    BalmerLine { name: "b", centre: 4862.68, window: 100.0, edge: 25.0 },
    BalmerLine { name: "a", centre: 6564.61, window: 100.0, edge: 25.0 },
];

/// Which Balmer lines the template fitter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSet {
    /// Hα–Hδ with wide windows; used for velocities.
    Core,
    /// Hα–H8 with tighter windows; used for atmospheric parameters.
    Full,
}

impl LineSet {
    pub fn lines(self) -> &'static [BalmerLine] {
        match self {
            LineSet::Core => &CORE_LINES,
            LineSet::Full => &FULL_LINES,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            LineSet::Core => "Hα–Hδ",
            LineSet::Full => "Hα–H8",
        }
    }
}

/// One RV epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RvPoint {
    pub mjd: f64,
    pub rv: f64,
    pub e_rv: f64,
}

/// Time-ordered RV epochs with finite values and positive uncertainties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RvSeries {
    points: Vec<RvPoint>,
}

/// Simple variability diagnostics against a constant-velocity model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RvVariability {
    pub weighted_mean: f64,
    /// Reduced chi-square of the constant model (`n - 1` degrees of freedom).
    pub redchi: f64,
    pub delta_rv_max: f64,
}

impl RvSeries {
    /// Build a series, sorting by time. Points with a non-finite value or a
    /// non-positive uncertainty are returned separately so callers can report them.
    pub fn new(points: Vec<RvPoint>) -> (RvSeries, Vec<RvPoint>) {
        let (mut kept, dropped): (Vec<RvPoint>, Vec<RvPoint>) = points.into_iter().partition(|p| {
            p.mjd.is_finite() && p.rv.is_finite() && p.e_rv.is_finite() && p.e_rv > 0.0
        });
        kept.sort_by(|a, b| a.mjd.partial_cmp(&b.mjd).unwrap_or(std::cmp::Ordering::Equal));
        (RvSeries { points: kept }, dropped)
    }

    pub fn points(&self) -> &[RvPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mjd).collect()
    }

    pub fn rvs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.rv).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.e_rv).collect()
    }

    /// Time baseline (days).
    pub fn baseline(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => b.mjd - a.mjd,
            _ => 0.0,
        }
    }

    pub fn variability(&self) -> Option<RvVariability> {
        if self.points.len() < 2 {
            return None;
        }
        let mut sw = 0.0;
        let mut swy = 0.0;
        let mut rv_min = f64::INFINITY;
        let mut rv_max = f64::NEG_INFINITY;
        for p in &self.points {
            let w = 1.0 / (p.e_rv * p.e_rv);
            sw += w;
            swy += w * p.rv;
            rv_min = rv_min.min(p.rv);
            rv_max = rv_max.max(p.rv);
        }
        let mean = swy / sw;
        let chi2: f64 = self
            .points
            .iter()
            .map(|p| ((p.rv - mean) / p.e_rv).powi(2))
            .sum();
        Some(RvVariability {
            weighted_mean: mean,
            redchi: chi2 / (self.points.len() as f64 - 1.0),
            delta_rv_max: rv_max - rv_min,
        })
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults). `Default` reproduces the
/// reference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Co-add grid bounds (Å) and size.
    pub grid_min_wl: f64,
    pub grid_max_wl: f64,
    pub grid_points: usize,
    /// Wavelength (Å) where the blue and red arms are joined.
    pub arm_break_wl: f64,
    /// Per-exposure fits only use pixels strictly inside this range (Å).
    pub fit_min_wl: f64,
    pub fit_max_wl: f64,

    /// Template refinement: maximum fit → correct → re-fit passes.
    pub refine_passes: usize,
    /// Stop refining once teff/logg change by less than this (relative).
    pub refine_epsilon: f64,

    /// Periodogram search range (cycles/day) and grid density.
    pub min_frequency: f64,
    pub max_frequency: f64,
    pub samples_per_peak: f64,

    /// Ensemble sampler settings.
    pub walkers: usize,
    pub steps: usize,
    pub burn_in: usize,
    pub thin: usize,
    pub stretch_scale: f64,
    /// Relative spread of the initial walker ball.
    pub init_spread: f64,
    /// Starting jitter for the point estimate (km/s).
    pub jitter_init: f64,
    pub predictive_draws: usize,

    /// Number of posterior draws pushed through the M2 inversion.
    pub mass_samples: usize,
    /// Assumed primary mass (M☉); bypasses the cooling-grid lookup.
    pub m1_override: Option<f64>,

    pub seed: u64,

    /// Terminal ASCII plot of the phase-folded RVs.
    pub plot: bool,
    pub plot_width: usize,
    pub plot_height: usize,
    /// Width (px) of the composite summary image.
    pub summary_width: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid_min_wl: 3600.0,
            grid_max_wl: 9000.0,
            grid_points: 6500,
            arm_break_wl: 6000.0,
            fit_min_wl: 3600.0,
            fit_max_wl: 9000.0,
            refine_passes: 2,
            refine_epsilon: 1e-3,
            min_frequency: 2.0,
            max_frequency: 30.0,
            samples_per_peak: 100.0,
            walkers: 250,
            steps: 1000,
            burn_in: 500,
            thin: 5,
            stretch_scale: 2.0,
            init_spread: 1e-3,
            jitter_init: 10.0,
            predictive_draws: 100,
            mass_samples: 1000,
            m1_override: None,
            seed: 42,
            plot: true,
            plot_width: 80,
            plot_height: 20,
            summary_width: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(mjd: f64, rv: f64, e_rv: f64) -> RvPoint {
        RvPoint { mjd, rv, e_rv }
    }

    #[test]
    fn rv_series_sorts_and_drops_bad_points() {
        let (series, dropped) = RvSeries::new(vec![
            point(3.0, 10.0, 1.0),
            point(1.0, -10.0, 2.0),
            point(2.0, f64::NAN, 1.0),
            point(4.0, 5.0, 0.0),
        ]);
        assert_eq!(series.times(), vec![1.0, 3.0]);
        assert_eq!(dropped.len(), 2);
        assert!((series.baseline() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn variability_of_constant_series_is_zero() {
        let (series, _) = RvSeries::new(vec![point(0.0, 7.0, 1.0), point(1.0, 7.0, 3.0)]);
        let v = series.variability().unwrap();
        assert!((v.weighted_mean - 7.0).abs() < 1e-12);
        assert!(v.redchi.abs() < 1e-12);
        assert!(v.delta_rv_max.abs() < 1e-12);
    }

    #[test]
    fn line_sets_are_ordered_by_wavelength() {
        for set in [LineSet::Core, LineSet::Full] {
            let lines = set.lines();
            assert!(lines.windows(2).all(|w| w[0].centre < w[1].centre));
        }
    }
}
