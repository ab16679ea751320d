//! Seed grids for the nonlinear fits.
//!
//! Levenberg–Marquardt on line profiles is local, and the teff axis has two
//! minima (either side of the Balmer maximum). We therefore evaluate a
//! deterministic coarse grid first and start the local solver from the best
//! grid points.

use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::input(format!(
            "Invalid seed range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::input("Seed grid steps must be >= 2."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// `(teff, logg)` seeds: log-spaced teff crossed with linear logg.
pub fn atmosphere_grid(
    teff: (f64, f64),
    teff_steps: usize,
    logg: (f64, f64),
    logg_steps: usize,
) -> Result<Vec<[f64; 2]>, AppError> {
    let teffs = log_space(teff.0, teff.1, teff_steps)?;
    if !(logg.0.is_finite() && logg.1.is_finite() && logg.1 > logg.0) || logg_steps < 2 {
        return Err(AppError::input(format!(
            "Invalid logg seed range: {}..{} with {logg_steps} steps.",
            logg.0, logg.1
        )));
    }
    let dg = (logg.1 - logg.0) / (logg_steps as f64 - 1.0);

    let mut out = Vec::with_capacity(teffs.len() * logg_steps);
    for &t in &teffs {
        for j in 0..logg_steps {
            out.push([t, logg.0 + dg * j as f64]);
        }
    }
    Ok(out)
}

/// Velocity scan from `-limit` to `+limit` km/s in steps of `step`.
pub fn velocity_grid(limit: f64, step: f64) -> Result<Vec<f64>, AppError> {
    if !(limit.is_finite() && step.is_finite() && limit > 0.0 && step > 0.0) {
        return Err(AppError::input(format!(
            "Invalid velocity scan: limit={limit}, step={step}."
        )));
    }
    let n = (2.0 * limit / step).round() as usize;
    Ok((0..=n).map(|i| -limit + step * i as f64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(6000.0, 40000.0, 5).unwrap();
        assert!((v[0] - 6000.0).abs() < 1e-9);
        assert!((v[v.len() - 1] - 40000.0).abs() < 1e-9);
    }

    #[test]
    fn atmosphere_grid_is_full_product() {
        let grid = atmosphere_grid((6000.0, 40000.0), 4, (7.0, 9.0), 3).unwrap();
        assert_eq!(grid.len(), 12);
        assert!((grid[2][1] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn velocity_grid_is_symmetric() {
        let v = velocity_grid(500.0, 10.0).unwrap();
        assert_eq!(v.len(), 101);
        assert!((v[0] + 500.0).abs() < 1e-12);
        assert!((v[100] - 500.0).abs() < 1e-9);
        assert!(velocity_grid(0.0, 1.0).is_err());
    }
}
