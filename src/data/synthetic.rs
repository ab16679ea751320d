//! Synthetic white-dwarf spectra and RV series with known parameters.
//!
//! Used by the `demo` subcommand (an offline end-to-end run with an injected
//! orbit) and by tests. All generators are seeded and deterministic.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;

use crate::domain::{
    Exposure, ExposureHeader, HOURS_PER_DAY, LineSet, RvMeasurement, RvPoint, RvSeries,
    SECONDS_PER_DAY,
};
use crate::fit::orbit::{OrbitParams, orbital_phase, rv_model};
use crate::models::model_flux;
use crate::spectrum::{Spectrum, log_grid};

/// First epoch of synthetic observations (MJD).
const EPOCH_START_MJD: f64 = 60_000.0;

/// Atmosphere and instrument settings of a synthetic star.
#[derive(Debug, Clone)]
pub struct SyntheticStar {
    pub teff: f64,
    pub logg: f64,
    /// Per-pixel signal-to-noise at the continuum.
    pub snr: f64,
    /// Continuum level at 5000 Å (1e-17 erg/s/cm²/Å).
    pub continuum: f64,
    pub min_wl: f64,
    pub max_wl: f64,
    pub n_pixels: usize,
    pub ra: f64,
    pub dec: f64,
}

impl Default for SyntheticStar {
    fn default() -> Self {
        Self {
            teff: 15_000.0,
            logg: 8.0,
            snr: 40.0,
            continuum: 10.0,
            min_wl: 3_600.0,
            max_wl: 9_000.0,
            n_pixels: 4_500,
            ra: 150.0,
            dec: 2.0,
        }
    }
}

/// Injected circular orbit.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticOrbit {
    pub gamma: f64,
    pub k: f64,
    pub period_hours: f64,
    pub phi: f64,
}

impl SyntheticOrbit {
    /// Velocity (km/s) at a time given as MJD.
    pub fn rv_at(&self, mjd: f64) -> f64 {
        let params = OrbitParams { gamma: self.gamma, k: self.k, phi: self.phi };
        rv_model(orbital_phase(mjd * HOURS_PER_DAY, self.period_hours), &params)
    }
}

fn continuum(star: &SyntheticStar, wl: f64) -> f64 {
    // Blue Rayleigh–Jeans-like slope of a hot white dwarf.
    star.continuum * (wl / 5_000.0).powi(-2)
}

fn noisy_flux(star: &SyntheticStar, log_wavelength: &[f64], rv: f64, rng: &mut StdRng) -> (Vec<f64>, Vec<f64>) {
    let wavelength: Vec<f64> = log_wavelength.iter().map(|&l| 10f64.powf(l)).collect();
    let profile = model_flux(&wavelength, LineSet::Full.lines(), star.teff, star.logg, rv);

    let mut flux = Vec::with_capacity(wavelength.len());
    let mut ivar = Vec::with_capacity(wavelength.len());
    for (wl, p) in wavelength.iter().zip(profile.iter()) {
        let c = continuum(star, *wl);
        let sigma = c / star.snr;
        let z: f64 = rng.sample(StandardNormal);
        flux.push(c * p + sigma * z);
        ivar.push(1.0 / (sigma * sigma));
    }
    (flux, ivar)
}

fn pixel_grid(star: &SyntheticStar) -> Vec<f64> {
    log_grid(star.min_wl, star.max_wl, star.n_pixels.max(2)).unwrap_or_default()
}

/// A noisy spectrum of `star` at velocity `rv` (km/s).
pub fn synthetic_spectrum(star: &SyntheticStar, rv: f64, seed: u64) -> Spectrum {
    let mut rng = StdRng::seed_from_u64(seed);
    let grid = pixel_grid(star);
    let (flux, ivar) = noisy_flux(star, &grid, rv, &mut rng);
    Spectrum {
        wavelength: grid.iter().map(|&l| 10f64.powf(l)).collect(),
        flux,
        ivar,
    }
}

fn header(star: &SyntheticStar, mjd: f64) -> ExposureHeader {
    ExposureHeader {
        tai_beg: mjd * SECONDS_PER_DAY,
        mjd: mjd.floor(),
        airmass: 1.2,
        helio_rv: 0.0,
        az: 180.0,
        alt: 60.0,
        ra: star.ra,
        dec: star.dec,
        gaia_source_id: Some(3_000_000_000_000_000_000),
    }
}

/// One noisy exposure taken at `mjd` with the star moving at `rv`.
pub fn synthetic_exposure(star: &SyntheticStar, mjd: f64, rv: f64, seed: u64) -> Exposure {
    let mut rng = StdRng::seed_from_u64(seed);
    let grid = pixel_grid(star);
    let (flux, ivar) = noisy_flux(star, &grid, rv, &mut rng);
    let n = grid.len();
    Exposure {
        header: header(star, mjd),
        log_wavelength: grid,
        flux,
        ivar,
        wdisp: vec![1.0; n],
        sky: vec![0.0; n],
        rv: None,
    }
}

/// `n` sorted observation epochs (MJD) spread uniformly over `baseline_days`.
pub fn synthetic_epochs(n: usize, baseline_days: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t: Vec<f64> = (0..n)
        .map(|_| EPOCH_START_MJD + rng.gen_range(0.0..baseline_days))
        .collect();
    t.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    t
}

/// Exposures of a star in `orbit`, observed at `n` random epochs.
pub fn synthetic_binary(
    star: &SyntheticStar,
    orbit: &SyntheticOrbit,
    n: usize,
    baseline_days: f64,
    seed: u64,
) -> Vec<Exposure> {
    synthetic_epochs(n, baseline_days, seed)
        .into_iter()
        .enumerate()
        .map(|(i, mjd)| synthetic_exposure(star, mjd, orbit.rv_at(mjd), seed.wrapping_add(1 + i as u64)))
        .collect()
}

/// RV epochs drawn from `orbit` with Gaussian errors of `e_rv` km/s.
pub fn synthetic_rv_series(orbit: &SyntheticOrbit, n: usize, baseline_days: f64, e_rv: f64, seed: u64) -> RvSeries {
    let times = synthetic_epochs(n, baseline_days, seed);
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(0x5eed));
    let points = times
        .into_iter()
        .map(|mjd| RvPoint {
            mjd,
            rv: orbit.rv_at(mjd) + e_rv * rng.sample::<f64, _>(StandardNormal),
            e_rv,
        })
        .collect();
    RvSeries::new(points).0
}

/// Noise-free exposure with log-uniform sampling and a constant ivar.
pub fn flat_exposure<F>(min_wl: f64, max_wl: f64, n: usize, flux_fn: F, ivar: f64) -> Exposure
where
    F: Fn(f64) -> f64,
{
    let grid = log_grid(min_wl, max_wl, n.max(2)).unwrap_or_default();
    let flux = grid.iter().map(|&l| flux_fn(10f64.powf(l))).collect();
    let len = grid.len();
    Exposure {
        header: header(&SyntheticStar::default(), EPOCH_START_MJD),
        log_wavelength: grid,
        flux,
        ivar: vec![ivar; len],
        wdisp: vec![1.0; len],
        sky: vec![0.0; len],
        rv: None,
    }
}

/// Attach a velocity measurement without fitting (for tests of later stages).
pub fn with_known_rv(exposure: &Exposure, rv: f64, e_rv: f64) -> Exposure {
    exposure.with_rv(RvMeasurement { rv, e_rv: Some(e_rv), converged: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generators_are_deterministic() {
        let star = SyntheticStar { n_pixels: 200, ..SyntheticStar::default() };
        let a = synthetic_spectrum(&star, 50.0, 9);
        let b = synthetic_spectrum(&star, 50.0, 9);
        assert_eq!(a, b);
        let orbit = SyntheticOrbit { gamma: 0.0, k: 100.0, period_hours: 2.0, phi: 0.0 };
        assert_eq!(
            synthetic_rv_series(&orbit, 10, 3.0, 5.0, 1),
            synthetic_rv_series(&orbit, 10, 3.0, 5.0, 1)
        );
    }

    #[test]
    fn epochs_are_sorted_within_baseline() {
        let t = synthetic_epochs(50, 5.0, 4);
        assert!(t.windows(2).all(|w| w[0] <= w[1]));
        assert!(t.iter().all(|&x| (EPOCH_START_MJD..EPOCH_START_MJD + 5.0).contains(&x)));
    }
}
