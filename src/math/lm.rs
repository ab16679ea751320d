//! Bounded Levenberg–Marquardt for small nonlinear least-squares problems.
//!
//! The caller supplies a residual function `r(x)` (already weighted, i.e.
//! `(data - model) / sigma`) and box bounds per parameter. Each iteration solves
//! the damped normal equations as an augmented least-squares system with the
//! shared SVD solver and projects the trial point back into the box.
//!
//! The covariance is `(JᵀJ)⁻¹` at the solution; standard errors are scaled by the
//! reduced chi-square, which is the usual convention for fits whose per-point
//! uncertainties are only known up to a constant.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;
use crate::math::solve_least_squares;

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e10;

#[derive(Debug, Clone)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Relative chi-square decrease below which the fit is considered converged.
    pub ftol: f64,
    /// Relative step size below which the fit is considered converged.
    pub xtol: f64,
    pub lambda_init: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            lambda_init: 1e-3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmResult {
    pub x: Vec<f64>,
    pub residuals: Vec<f64>,
    pub chi2: f64,
    pub covariance: Option<DMatrix<f64>>,
    pub converged: bool,
    pub iterations: usize,
}

impl LmResult {
    pub fn n_data(&self) -> usize {
        self.residuals.len()
    }

    /// Degrees of freedom (clamped at 1).
    pub fn dof(&self) -> usize {
        self.residuals.len().saturating_sub(self.x.len()).max(1)
    }

    pub fn redchi(&self) -> f64 {
        self.chi2 / self.dof() as f64
    }

    /// Standard errors scaled by the reduced chi-square.
    pub fn stderr(&self) -> Vec<Option<f64>> {
        let Some(cov) = &self.covariance else {
            return vec![None; self.x.len()];
        };
        let scale = self.redchi();
        (0..self.x.len())
            .map(|j| {
                let v = cov[(j, j)] * scale;
                (v.is_finite() && v >= 0.0).then(|| v.sqrt())
            })
            .collect()
    }
}

/// Minimise `Σ r_i(x)^2` subject to `bounds[j].0 <= x_j <= bounds[j].1`.
///
/// Unbounded parameters use `f64::NEG_INFINITY` / `f64::INFINITY`.
pub fn levenberg_marquardt<F>(
    residual_fn: F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    opts: &LmOptions,
) -> Result<LmResult, AppError>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    if x0.is_empty() || bounds.len() != x0.len() {
        return Err(AppError::data("Levenberg–Marquardt: parameter/bounds length mismatch."));
    }

    let mut x = project(x0, bounds);
    let mut r = residual_fn(&x);
    if r.is_empty() {
        return Err(AppError::insufficient("Levenberg–Marquardt: no data points to fit."));
    }
    if r.iter().any(|v| !v.is_finite()) {
        return Err(AppError::data("Levenberg–Marquardt: non-finite residuals at the starting point."));
    }
    let mut chi2 = sum_sq(&r);

    let p = x.len();
    let mut lambda = opts.lambda_init;
    let mut converged = false;
    let mut iterations = 0;

    'outer: while iterations < opts.max_iter {
        iterations += 1;
        if chi2 <= f64::MIN_POSITIVE {
            converged = true;
            break;
        }

        let jac = jacobian(&residual_fn, &x, &r, bounds);
        let jtj_diag: Vec<f64> = (0..p)
            .map(|j| jac.column(j).iter().map(|v| v * v).sum::<f64>().max(1e-12))
            .collect();

        // Retry the step with increasing damping until chi-square decreases.
        loop {
            let step = match damped_step(&jac, &r, &jtj_diag, lambda) {
                Some(s) => s,
                None => {
                    lambda *= 10.0;
                    if lambda > LAMBDA_MAX {
                        converged = true;
                        break 'outer;
                    }
                    continue;
                }
            };

            let trial: Vec<f64> = x.iter().zip(step.iter()).map(|(xi, di)| xi + di).collect();
            let trial = project(&trial, bounds);
            let r_trial = residual_fn(&trial);
            let chi2_trial = if r_trial.iter().all(|v| v.is_finite()) {
                sum_sq(&r_trial)
            } else {
                f64::INFINITY
            };

            if chi2_trial < chi2 {
                let rel_decrease = (chi2 - chi2_trial) / chi2;
                let small_step = x
                    .iter()
                    .zip(trial.iter())
                    .all(|(a, b)| (a - b).abs() <= opts.xtol * (a.abs() + opts.xtol));
                x = trial;
                r = r_trial;
                chi2 = chi2_trial;
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                if rel_decrease < opts.ftol || small_step {
                    converged = true;
                    break 'outer;
                }
                break;
            }

            lambda *= 10.0;
            if lambda > LAMBDA_MAX {
                // No descent direction left inside the box: we are at a minimum.
                converged = true;
                break 'outer;
            }
        }
    }

    let jac = jacobian(&residual_fn, &x, &r, bounds);
    let jtj = jac.transpose() * &jac;
    let covariance = jtj.pseudo_inverse(1e-14).ok();

    Ok(LmResult {
        x,
        residuals: r,
        chi2,
        covariance,
        converged,
        iterations,
    })
}

fn damped_step(jac: &DMatrix<f64>, r: &[f64], jtj_diag: &[f64], lambda: f64) -> Option<Vec<f64>> {
    let n = jac.nrows();
    let p = jac.ncols();
    let mut aug = DMatrix::<f64>::zeros(n + p, p);
    aug.view_mut((0, 0), (n, p)).copy_from(jac);
    for j in 0..p {
        aug[(n + j, j)] = (lambda * jtj_diag[j]).sqrt();
    }
    let mut rhs = DVector::<f64>::zeros(n + p);
    for i in 0..n {
        rhs[i] = -r[i];
    }
    solve_least_squares(&aug, &rhs).map(|d| d.iter().copied().collect())
}

/// Central-difference Jacobian, falling back to one-sided differences at bounds.
fn jacobian<F>(residual_fn: &F, x: &[f64], r0: &[f64], bounds: &[(f64, f64)]) -> DMatrix<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let n = r0.len();
    let p = x.len();
    let mut jac = DMatrix::<f64>::zeros(n, p);
    let mut xp = x.to_vec();

    for j in 0..p {
        let h = 6e-6 * x[j].abs().max(1.0);
        let (lo, hi) = bounds[j];
        let x_plus = (x[j] + h).min(hi);
        let x_minus = (x[j] - h).max(lo);
        let span = x_plus - x_minus;
        if span <= 0.0 {
            continue;
        }

        let r_plus = if x_plus != x[j] {
            xp[j] = x_plus;
            let v = residual_fn(&xp);
            xp[j] = x[j];
            v
        } else {
            r0.to_vec()
        };
        let r_minus = if x_minus != x[j] {
            xp[j] = x_minus;
            let v = residual_fn(&xp);
            xp[j] = x[j];
            v
        } else {
            r0.to_vec()
        };

        for i in 0..n {
            let d = (r_plus[i] - r_minus[i]) / span;
            jac[(i, j)] = if d.is_finite() { d } else { 0.0 };
        }
    }

    jac
}

fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .zip(bounds.iter())
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect()
}

fn sum_sq(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREE: (f64, f64) = (f64::NEG_INFINITY, f64::INFINITY);

    #[test]
    fn fits_exponential_decay() {
        let t: Vec<f64> = (0..30).map(|i| i as f64 * 0.2).collect();
        let y: Vec<f64> = t.iter().map(|&ti| 3.0 * (-0.7 * ti).exp() + 0.5).collect();
        let res = levenberg_marquardt(
            |p| t.iter().zip(&y).map(|(&ti, &yi)| yi - (p[0] * (-p[1] * ti).exp() + p[2])).collect(),
            &[1.0, 0.2, 0.0],
            &[FREE, FREE, FREE],
            &LmOptions::default(),
        )
        .unwrap();
        assert!(res.converged);
        assert!((res.x[0] - 3.0).abs() < 1e-5, "amp={}", res.x[0]);
        assert!((res.x[1] - 0.7).abs() < 1e-5, "rate={}", res.x[1]);
        assert!((res.x[2] - 0.5).abs() < 1e-5, "offset={}", res.x[2]);
    }

    #[test]
    fn respects_bounds() {
        // Unconstrained optimum is x = -2; with x >= 0 the solution sits on the bound.
        let res = levenberg_marquardt(
            |p| vec![p[0] + 2.0],
            &[1.0],
            &[(0.0, f64::INFINITY)],
            &LmOptions::default(),
        )
        .unwrap();
        assert!(res.x[0].abs() < 1e-12);
    }

    #[test]
    fn stderr_matches_weighted_mean_error() {
        // Fitting a constant to points with unit sigma: stderr = sqrt(redchi / n).
        let y = [1.0, 2.0, 3.0, 4.0];
        let res = levenberg_marquardt(
            |p| y.iter().map(|&v| v - p[0]).collect(),
            &[0.0],
            &[FREE],
            &LmOptions::default(),
        )
        .unwrap();
        assert!((res.x[0] - 2.5).abs() < 1e-8);
        let redchi = 5.0 / 3.0;
        let expected = (redchi / 4.0_f64).sqrt();
        let got = res.stderr()[0].unwrap();
        assert!((got - expected).abs() < 1e-6, "got {got}, expected {expected}");
    }
}
