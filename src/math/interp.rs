//! Piecewise-linear interpolation onto a new abscissa.
//!
//! Semantics follow the usual "interp" convention: `xp` must be increasing,
//! values outside `[xp[0], xp[last]]` take the nearest end value.

/// Linearly interpolate `fp(xp)` at each `x`. Empty input tables yield NaN.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter().map(|&xi| interp_one(xi, xp, fp)).collect()
}

/// Single-point variant of [`interp`].
pub fn interp_one(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return f64::NAN;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }

    // First index with xp[i] > x; x lies in [xp[i-1], xp[i]).
    let i = xp[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xp[i - 1], xp[i]);
    let (y0, y1) = (fp[i - 1], fp[i]);
    let span = x1 - x0;
    if span == 0.0 {
        return y1;
    }
    y0 + (y1 - y0) * (x - x0) / span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_and_clamps() {
        let xp = [1.0, 2.0, 4.0];
        let fp = [10.0, 20.0, 0.0];
        let out = interp(&[0.0, 1.5, 3.0, 4.0, 9.0], &xp, &fp);
        assert_eq!(out, vec![10.0, 15.0, 10.0, 0.0, 0.0]);
    }

    #[test]
    fn exact_knots_are_reproduced() {
        let xp = [0.0, 0.5, 1.0];
        let fp = [3.0, -1.0, 7.0];
        for (x, f) in xp.iter().zip(fp.iter()) {
            assert_eq!(interp_one(*x, &xp, &fp), *f);
        }
    }
}
