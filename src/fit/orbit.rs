//! Circular-orbit radial-velocity model and its fits.
//!
//! ```text
//! phase(t) = (t mod P) / P            (t and P in hours, Euclidean remainder)
//! rv(phase) = gamma + K * sin(2π phase + phi)
//! ```
//!
//! With the period fixed, the model is linear in `(gamma, A, B)` where
//! `K sin(x + phi) = A sin x + B cos x`, so the least-squares fit is seeded by
//! an exact weighted linear solve and then refined with bounded
//! Levenberg–Marquardt on `(gamma, K, phi)` with `K >= 0` and `|phi| <= 2π`.
//!
//! The probabilistic model adds a jitter term `s` in quadrature to each
//! measurement error.

use std::f64::consts::TAU;

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::domain::{HOURS_PER_DAY, ParamEstimate, RvSeries};
use crate::error::AppError;
use crate::math::{LmOptions, levenberg_marquardt, solve_least_squares};

/// Orbit parameters without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrbitParams {
    pub gamma: f64,
    pub k: f64,
    pub phi: f64,
}

/// Orbital phase in `[0, 1)` of a time (hours) for a period (hours).
pub fn orbital_phase(t_hours: f64, period_hours: f64) -> f64 {
    t_hours.rem_euclid(period_hours) / period_hours
}

pub fn rv_model(phase: f64, params: &OrbitParams) -> f64 {
    params.gamma + params.k * (TAU * phase + params.phi).sin()
}

/// Phases of every epoch in `series` for the given period (hours).
pub fn series_phases(series: &RvSeries, period_hours: f64) -> Vec<f64> {
    series
        .times()
        .iter()
        .map(|&mjd| orbital_phase(mjd * HOURS_PER_DAY, period_hours))
        .collect()
}

/// Least-squares orbit solution at fixed period.
#[derive(Debug, Clone, Serialize)]
pub struct OrbitFit {
    pub period_hours: f64,
    /// Linear-solve starting point.
    pub initial: OrbitParams,
    pub params: OrbitParams,
    pub gamma: ParamEstimate,
    pub k: ParamEstimate,
    pub phi: ParamEstimate,
    pub chi2: f64,
    pub redchi: f64,
    pub converged: bool,
}

/// Weighted least-squares fit of `(gamma, K, phi)` with the period held fixed.
pub fn fit_orbit(series: &RvSeries, period_hours: f64) -> Result<OrbitFit, AppError> {
    if series.len() < 3 {
        return Err(AppError::insufficient(format!(
            "Orbit fit needs at least 3 RV epochs (have {}).",
            series.len()
        )));
    }
    if !(period_hours.is_finite() && period_hours > 0.0) {
        return Err(AppError::data(format!("Invalid orbital period: {period_hours} h.")));
    }

    let phases = series_phases(series, period_hours);
    let rvs = series.rvs();
    let errs = series.errors();

    let initial = linear_seed(&phases, &rvs, &errs)
        .ok_or_else(|| AppError::data("Linear orbit seed is singular."))?;

    let res = levenberg_marquardt(
        |p| {
            let params = OrbitParams { gamma: p[0], k: p[1], phi: p[2] };
            phases
                .iter()
                .zip(rvs.iter().zip(errs.iter()))
                .map(|(&ph, (&rv, &e))| (rv - rv_model(ph, &params)) / e)
                .collect()
        },
        &[initial.gamma, initial.k, initial.phi],
        &[
            (f64::NEG_INFINITY, f64::INFINITY),
            (0.0, f64::INFINITY),
            (-TAU, TAU),
        ],
        &LmOptions::default(),
    )?;

    if !res.converged {
        log::warn!("Orbit least-squares fit did not converge after {} iterations.", res.iterations);
    }

    let stderr = res.stderr();
    let params = OrbitParams { gamma: res.x[0], k: res.x[1], phi: res.x[2] };
    Ok(OrbitFit {
        period_hours,
        initial,
        params,
        gamma: ParamEstimate { value: params.gamma, stderr: stderr[0] },
        k: ParamEstimate { value: params.k, stderr: stderr[1] },
        phi: ParamEstimate { value: params.phi, stderr: stderr[2] },
        chi2: res.chi2,
        redchi: res.redchi(),
        converged: res.converged,
    })
}

/// Exact weighted solve of `rv = gamma + A sin(2π ph) + B cos(2π ph)`.
fn linear_seed(phases: &[f64], rvs: &[f64], errs: &[f64]) -> Option<OrbitParams> {
    let n = phases.len();
    let mut x = DMatrix::<f64>::zeros(n, 3);
    let mut y = DVector::<f64>::zeros(n);
    for i in 0..n {
        let w = 1.0 / errs[i];
        let arg = TAU * phases[i];
        x[(i, 0)] = w;
        x[(i, 1)] = arg.sin() * w;
        x[(i, 2)] = arg.cos() * w;
        y[i] = rvs[i] * w;
    }
    let beta = solve_least_squares(&x, &y)?;
    let (a, b) = (beta[1], beta[2]);
    // A sin x + B cos x = K sin(x + phi) with K = hypot(A, B), phi = atan2(B, A).
    Some(OrbitParams {
        gamma: beta[0],
        k: a.hypot(b),
        phi: b.atan2(a),
    })
}

/// RV data at a fixed period, prepared for likelihood evaluation.
#[derive(Debug, Clone)]
pub struct OrbitData {
    pub phases: Vec<f64>,
    pub rvs: Vec<f64>,
    pub errors: Vec<f64>,
}

impl OrbitData {
    pub fn new(series: &RvSeries, period_hours: f64) -> Self {
        Self {
            phases: series_phases(series, period_hours),
            rvs: series.rvs(),
            errors: series.errors(),
        }
    }
}

/// Flat prior with hard walls at `K < 0` and `s < 0`. `theta = [gamma, K, phi, s]`.
pub fn log_prior(theta: &[f64]) -> f64 {
    if theta[1] < 0.0 || theta[3] < 0.0 {
        return f64::NEG_INFINITY;
    }
    0.0
}

/// Gaussian likelihood with variance `e_rv² + s²`.
pub fn log_likelihood(theta: &[f64], data: &OrbitData) -> f64 {
    let params = OrbitParams { gamma: theta[0], k: theta[1], phi: theta[2] };
    let s2 = theta[3] * theta[3];
    let mut sum = 0.0;
    for i in 0..data.phases.len() {
        let sigma2 = data.errors[i] * data.errors[i] + s2;
        let r = data.rvs[i] - rv_model(data.phases[i], &params);
        sum += r * r / sigma2 + sigma2.ln();
    }
    -0.5 * sum
}

pub fn log_probability(theta: &[f64], data: &OrbitData) -> f64 {
    let lp = log_prior(theta);
    if !lp.is_finite() {
        return f64::NEG_INFINITY;
    }
    let ll = log_likelihood(theta, data);
    if ll.is_nan() { f64::NEG_INFINITY } else { lp + ll }
}

/// Model curve sampled on `n` phases spanning `[0, 1]`.
pub fn model_curve(params: &OrbitParams, n: usize) -> Vec<(f64, f64)> {
    crate::math::linspace(0.0, 1.0, n)
        .into_iter()
        .map(|ph| (ph, rv_model(ph, params)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use crate::data::synthetic::{SyntheticOrbit, synthetic_rv_series};

    fn wrap_phase_angle(phi: f64) -> f64 {
        (phi + PI).rem_euclid(TAU) - PI
    }

    #[test]
    fn model_is_periodic_in_phase() {
        let p = OrbitParams { gamma: 12.0, k: 150.0, phi: 0.7 };
        for i in 0..20 {
            let ph = i as f64 * 0.05;
            assert!((rv_model(ph, &p) - rv_model(ph + 1.0, &p)).abs() < 1e-9);
        }
    }

    #[test]
    fn phase_uses_euclidean_remainder() {
        assert!((orbital_phase(-1.0, 4.0) - 0.75).abs() < 1e-12);
        assert!((orbital_phase(9.0, 4.0) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn prior_walls_reject_negative_amplitude_and_jitter() {
        let (series, _) = RvSeries::new(vec![
            crate::domain::RvPoint { mjd: 0.0, rv: 1.0, e_rv: 1.0 },
            crate::domain::RvPoint { mjd: 0.1, rv: 2.0, e_rv: 1.0 },
        ]);
        let data = OrbitData::new(&series, 3.0);
        assert_eq!(log_probability(&[0.0, -1.0, 0.0, 1.0], &data), f64::NEG_INFINITY);
        assert_eq!(log_probability(&[0.0, 1.0, 0.0, -0.1], &data), f64::NEG_INFINITY);
        assert!(log_probability(&[0.0, 1.0, 0.0, 0.0], &data).is_finite());
    }

    #[test]
    fn least_squares_recovers_injected_orbit() {
        let orbit = SyntheticOrbit { gamma: 20.0, k: 150.0, period_hours: 3.5, phi: 1.0 };
        let series = synthetic_rv_series(&orbit, 30, 5.0, 8.0, 3);
        let fit = fit_orbit(&series, orbit.period_hours).unwrap();
        assert!(fit.converged);
        assert!((fit.params.k - 150.0).abs() < 10.0, "K={}", fit.params.k);
        assert!((fit.params.gamma - 20.0).abs() < 6.0, "gamma={}", fit.params.gamma);
        let dphi = wrap_phase_angle(fit.params.phi - 1.0);
        assert!(dphi.abs() < 0.15, "dphi={dphi}");
        assert!(fit.k.stderr.is_some());
    }

}
