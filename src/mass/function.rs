//! Binary mass function and its inversion for the companion mass.

use crate::domain::constants::{GRAVITATIONAL_CONSTANT, SOLAR_MASS_KG};
use crate::error::AppError;
use crate::math::minimize_bounded;

/// Search interval for the companion mass (M☉).
pub const M2_SEARCH_MAX: f64 = 500.0;

const M2_XATOL: f64 = 1e-8;
const M2_MAX_EVAL: usize = 500;

/// Mass function `P K³ / (2π G)` in M☉ for `P` in hours and `K` in km/s.
pub fn mass_function(period_hours: f64, k_kms: f64) -> f64 {
    let p = period_hours * 3600.0;
    let k = k_kms * 1000.0;
    p * k.powi(3) / (2.0 * std::f64::consts::PI * GRAVITATIONAL_CONSTANT) / SOLAR_MASS_KG
}

/// Mass function implied by a companion `m2` at inclination `inc_deg` around `m1`.
pub fn implied_mass_function(m2: f64, inc_deg: f64, m1: f64) -> f64 {
    let sin_i = inc_deg.to_radians().sin();
    (m2 * sin_i).powi(3) / (m1 + m2).powi(2)
}

/// Companion mass solving `(M2 sin i)³ / (M1 + M2)² = f`.
///
/// Solved numerically by bounded minimisation of the squared residual on
/// `[0, 500]` M☉. The implied mass function grows monotonically with `M2`, so a
/// mass function beyond what 500 M☉ can produce returns the upper bound.
pub fn companion_mass(f: f64, inc_deg: f64, m1: f64) -> Result<f64, AppError> {
    if !(f.is_finite() && f >= 0.0) {
        return Err(AppError::data(format!("Invalid mass function {f}.")));
    }
    if !(inc_deg.is_finite() && inc_deg > 0.0 && inc_deg <= 90.0) {
        return Err(AppError::data(format!("Inclination {inc_deg}° outside (0, 90].")));
    }
    if !(m1.is_finite() && m1 > 0.0) {
        return Err(AppError::data(format!("Invalid primary mass {m1}.")));
    }
    let min = minimize_bounded(
        |m2| (implied_mass_function(m2, inc_deg, m1) - f).powi(2),
        0.0,
        M2_SEARCH_MAX,
        M2_XATOL,
        M2_MAX_EVAL,
    );
    if !min.converged {
        log::debug!("M2 inversion hit its evaluation limit (f={f:.4}, i={inc_deg:.1}, M1={m1:.3}).");
    }
    Ok(min.x[0])
}

/// Minimum-mass proxy `f^{1/3} M1^{2/3}`.
pub fn minimum_mass_proxy(f: f64, m1: f64) -> f64 {
    f.max(0.0).cbrt() * m1.powf(2.0 / 3.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_function_grows_with_period_and_amplitude() {
        let base = mass_function(3.5, 150.0);
        assert!(mass_function(7.0, 150.0) > base);
        assert!(mass_function(3.5, 200.0) > base);
        assert!((mass_function(7.0, 150.0) / base - 2.0).abs() < 1e-12);
        assert!((mass_function(3.5, 300.0) / base - 8.0).abs() < 1e-9);
    }

    #[test]
    fn mass_function_reference_value() {
        // 1 day and 100 km/s is about 0.1036 M☉.
        let f = mass_function(24.0, 100.0);
        assert!((f - 0.1036).abs() < 1e-3, "f={f}");
    }

    #[test]
    fn companion_mass_inverts_implied_function() {
        let (m1, m2, inc) = (0.6, 0.45, 60.0);
        let f = implied_mass_function(m2, inc, m1);
        let got = companion_mass(f, inc, m1).unwrap();
        assert!((got - m2).abs() < 1e-4, "got {got}");
    }

    #[test]
    fn companion_mass_rises_at_low_inclination() {
        let f = 0.1;
        let edge_on = companion_mass(f, 90.0, 0.6).unwrap();
        let tilted = companion_mass(f, 30.0, 0.6).unwrap();
        assert!(tilted > edge_on);
    }

    #[test]
    fn companion_mass_rejects_bad_inputs() {
        assert!(companion_mass(-0.1, 60.0, 0.6).is_err());
        assert!(companion_mass(0.1, 0.0, 0.6).is_err());
        assert!(companion_mass(0.1, 60.0, 0.0).is_err());
    }

    #[test]
    fn minimum_mass_proxy_matches_edge_on_limit_for_light_companions() {
        // For M2 << M1 and i = 90°, M2 ≈ f^{1/3} M1^{2/3}.
        let m1 = 0.8;
        let f = implied_mass_function(0.01, 90.0, m1);
        assert!((minimum_mass_proxy(f, m1) - 0.01).abs() < 1e-3);
    }
}
