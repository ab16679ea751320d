//! Linear least squares solver.
//!
//! Two places in the pipeline reduce to small linear problems of the form:
//!
//! ```text
//! minimize || X β - y ||^2
//! ```
//!
//! - the sinusoid seed for the orbit fit (`gamma + A sin + B cos` is linear for a
//!   fixed period)
//! - each damped Gauss–Newton step of the Levenberg–Marquardt solver, written as
//!   an augmented tall system `[J; sqrt(λ D)] δ = [-r; 0]`
//!
//! Implementation choices:
//! - Rows are expected to be pre-scaled by `sqrt(w_i)` by the caller.
//! - SVD handles tall, rank-deficient systems without panicking
//!   (nalgebra's `QR::solve` is intended for square systems).
//! - Parameter dimensions are tiny (1–4 columns), so SVD cost is irrelevant.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn least_squares_recovers_sinusoid_coefficients() {
        let a = 120.0;
        let b = -35.0;
        let gamma = 12.0;
        let phases: Vec<f64> = (0..20).map(|i| i as f64 / 20.0).collect();
        let mut rows = Vec::new();
        let mut ys = Vec::new();
        for &ph in &phases {
            let arg = 2.0 * std::f64::consts::PI * ph;
            rows.extend_from_slice(&[1.0, arg.sin(), arg.cos()]);
            ys.push(gamma + a * arg.sin() + b * arg.cos());
        }
        let x = DMatrix::from_row_slice(phases.len(), 3, &rows);
        let y = DVector::from_vec(ys);
        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - gamma).abs() < 1e-9);
        assert!((beta[1] - a).abs() < 1e-9);
        assert!((beta[2] - b).abs() < 1e-9);
    }
}
