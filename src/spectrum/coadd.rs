//! Median co-addition of exposures on a shared log-wavelength grid.
//!
//! For each grid pixel:
//! - flux is the median of the interpolated exposure fluxes
//! - masked pixels (ivar == 0) are given a dummy ivar of 1
//! - variance is `Σ(1/ivar) / N²`, ivar its reciprocal
//! - ivar is forced back to 0 where every exposure was masked

use rayon::prelude::*;

use crate::domain::{CoaddSpectrum, Exposure};
use crate::error::AppError;
use crate::math::{interp, median};

/// `n` points uniform in log10(λ) between `min_wl` and `max_wl` (inclusive).
pub fn log_grid(min_wl: f64, max_wl: f64, n: usize) -> Result<Vec<f64>, AppError> {
    if !(min_wl.is_finite() && max_wl.is_finite() && min_wl > 0.0 && max_wl > min_wl) {
        return Err(AppError::input(format!(
            "Invalid co-add grid: min={min_wl}, max={max_wl} (must be finite, >0, and max>min)."
        )));
    }
    if n < 2 {
        return Err(AppError::input("Co-add grid needs at least 2 points."));
    }
    let lo = min_wl.log10();
    let step = (max_wl.log10() - lo) / (n as f64 - 1.0);
    Ok((0..n).map(|i| lo + step * i as f64).collect())
}

/// Co-add `exposures` onto `grid` (log10 wavelengths).
pub fn make_coadd(exposures: &[Exposure], grid: &[f64]) -> Result<CoaddSpectrum, AppError> {
    if exposures.is_empty() {
        return Err(AppError::insufficient("No exposures to co-add."));
    }
    if let Some(bad) = exposures.iter().position(|e| e.is_empty()) {
        return Err(AppError::data(format!("Exposure {bad} has no pixels.")));
    }

    let fluxes: Vec<Vec<f64>> = exposures
        .iter()
        .map(|e| interp(grid, &e.log_wavelength, &e.flux))
        .collect();
    let ivars: Vec<Vec<f64>> = exposures
        .iter()
        .map(|e| interp(grid, &e.log_wavelength, &e.ivar))
        .collect();

    let n = exposures.len() as f64;
    let (flux, ivar): (Vec<f64>, Vec<f64>) = (0..grid.len())
        .into_par_iter()
        .map(|px| {
            let column: Vec<f64> = fluxes.iter().map(|f| f[px]).collect();
            let fl = median(&column).unwrap_or(f64::NAN);

            let mut all_masked = true;
            let mut var_sum = 0.0;
            for iv in &ivars {
                let v = iv[px];
                if v == 0.0 {
                    var_sum += 1.0;
                } else {
                    all_masked = false;
                    var_sum += 1.0 / v;
                }
            }
            let ivar = if all_masked { 0.0 } else { 1.0 / (var_sum / (n * n)) };
            (fl, ivar)
        })
        .unzip();

    Ok(CoaddSpectrum {
        log_wavelength: grid.to_vec(),
        flux,
        ivar,
    })
}
