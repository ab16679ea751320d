//! Relativistic Doppler shifts of sampled spectra.

use crate::domain::{Exposure, SPEED_OF_LIGHT_KMS};
use crate::error::AppError;
use crate::math::interp;

/// Relativistic wavelength factor for a velocity `dv` (km/s, positive = receding).
pub fn doppler_factor(dv: f64) -> f64 {
    let beta = dv / SPEED_OF_LIGHT_KMS;
    ((1.0 + beta) / (1.0 - beta)).sqrt()
}

/// Shift `values` sampled at `wavelength` by `dv` km/s, resampling onto the
/// same wavelength array. Positive `dv` moves features redward.
pub fn doppler_shift(wavelength: &[f64], values: &[f64], dv: f64) -> Vec<f64> {
    let inv = 1.0 / doppler_factor(dv);
    let sample_at: Vec<f64> = wavelength.iter().map(|&wl| wl * inv).collect();
    interp(&sample_at, wavelength, values)
}

/// Return a rest-frame copy of `exposure`: flux and ivar shifted by `-rv`.
///
/// The wavelength array is unchanged, so the corrected copy can go straight
/// back into the co-adder.
pub fn doppler_corrected(exposure: &Exposure) -> Result<Exposure, AppError> {
    let Some(rv) = exposure.rv else {
        return Err(AppError::data(
            "Cannot Doppler-correct an exposure without a fitted velocity.",
        ));
    };
    if !rv.rv.is_finite() {
        return Err(AppError::data(format!(
            "Cannot Doppler-correct with non-finite velocity {}.",
            rv.rv
        )));
    }

    let wl = exposure.wavelength();
    Ok(Exposure {
        flux: doppler_shift(&wl, &exposure.flux, -rv.rv),
        ivar: doppler_shift(&wl, &exposure.ivar, -rv.rv),
        ..exposure.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::flat_exposure;
    use crate::domain::RvMeasurement;

    fn gaussian_dip(wl: f64, centre: f64) -> f64 {
        1.0 - 0.5 * (-0.5 * ((wl - centre) / 5.0).powi(2)).exp()
    }

    fn argmin(v: &[f64]) -> usize {
        v.iter()
            .enumerate()
            .fold((0, f64::INFINITY), |acc, (i, &x)| if x < acc.1 { (i, x) } else { acc })
            .0
    }

    #[test]
    fn zero_shift_is_identity() {
        let wl: Vec<f64> = (0..100).map(|i| 4000.0 + i as f64).collect();
        let fl: Vec<f64> = wl.iter().map(|&w| gaussian_dip(w, 4050.0)).collect();
        assert_eq!(doppler_shift(&wl, &fl, 0.0), fl);
    }

    #[test]
    fn positive_velocity_moves_features_redward() {
        let wl: Vec<f64> = (0..2000).map(|i| 4000.0 + i as f64 * 0.1).collect();
        let fl: Vec<f64> = wl.iter().map(|&w| gaussian_dip(w, 4100.0)).collect();
        let shifted = doppler_shift(&wl, &fl, 300.0);
        let expected = 4100.0 * doppler_factor(300.0);
        let got = wl[argmin(&shifted)];
        assert!((got - expected).abs() < 0.15, "got {got}, expected {expected}");
    }

    #[test]
    fn correction_leaves_original_untouched() {
        let exp = flat_exposure(4000.0, 4200.0, 400, |wl| gaussian_dip(wl, 4100.0 * doppler_factor(80.0)), 1.0)
            .with_rv(RvMeasurement { rv: 80.0, e_rv: Some(1.0), converged: true });
        let corrected = doppler_corrected(&exp).unwrap();
        assert_ne!(corrected.flux, exp.flux);
        assert_eq!(corrected.log_wavelength, exp.log_wavelength);
        let wl = corrected.wavelength();
        let centre = wl[argmin(&corrected.flux)];
        assert!((centre - 4100.0).abs() < 0.6, "centre={centre}");
    }

    #[test]
    fn correction_requires_velocity() {
        let exp = flat_exposure(4000.0, 4200.0, 10, |_| 1.0, 1.0);
        assert!(doppler_corrected(&exp).is_err());
    }
}
