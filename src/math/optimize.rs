//! Derivative-free minimisers.
//!
//! - [`nelder_mead`]: unconstrained simplex search, used for the posterior point
//!   estimate. Infinite objective values (hard prior walls) are simply treated as
//!   "worse than anything finite".
//! - [`minimize_bounded`]: Brent's bounded scalar minimiser (golden section with
//!   parabolic steps), used to invert the mass function.

/// Result of a minimisation. `converged` is false when the iteration budget ran out.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub fx: f64,
    pub converged: bool,
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct NelderMeadOptions {
    pub max_iter: usize,
    pub xatol: f64,
    pub fatol: f64,
}

impl NelderMeadOptions {
    pub fn for_dim(dim: usize) -> Self {
        Self {
            max_iter: 400 * dim.max(1),
            xatol: 1e-6,
            fatol: 1e-8,
        }
    }
}

const NM_REFLECT: f64 = 1.0;
const NM_EXPAND: f64 = 2.0;
const NM_CONTRACT: f64 = 0.5;
const NM_SHRINK: f64 = 0.5;

/// Minimise `f` starting from `x0` with the Nelder–Mead simplex method.
pub fn nelder_mead<F>(f: F, x0: &[f64], opts: &NelderMeadOptions) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let eval = |x: &[f64]| {
        let v = f(x);
        if v.is_nan() { f64::INFINITY } else { v }
    };

    // Initial simplex: perturb each coordinate by 5% (or a small absolute step at zero).
    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for j in 0..n {
        let mut v = x0.to_vec();
        v[j] = if v[j] != 0.0 { v[j] * 1.05 } else { 0.00025 };
        simplex.push(v);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| eval(v)).collect();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iter {
        iterations += 1;

        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(std::cmp::Ordering::Equal));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(simplex[0].iter()).map(|(a, b)| (a - b).abs()))
            .fold(0.0, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0, f64::max);
        if x_spread <= opts.xatol && f_spread <= opts.fatol {
            converged = true;
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let worst = simplex[n].clone();
        let along = |t: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(worst.iter())
                .map(|(c, w)| c + t * (c - w))
                .collect()
        };

        let xr = along(NM_REFLECT);
        let fr = eval(&xr);

        if fr < values[0] {
            let xe = along(NM_REFLECT * NM_EXPAND);
            let fe = eval(&xe);
            if fe < fr {
                simplex[n] = xe;
                values[n] = fe;
            } else {
                simplex[n] = xr;
                values[n] = fr;
            }
            continue;
        }

        if fr < values[n - 1] {
            simplex[n] = xr;
            values[n] = fr;
            continue;
        }

        let (xc, fc, accept) = if fr < values[n] {
            let xc = along(NM_REFLECT * NM_CONTRACT);
            let fc = eval(&xc);
            let ok = fc <= fr;
            (xc, fc, ok)
        } else {
            let xc = along(-NM_CONTRACT);
            let fc = eval(&xc);
            let ok = fc < values[n];
            (xc, fc, ok)
        };

        if accept {
            simplex[n] = xc;
            values[n] = fc;
            continue;
        }

        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = best
                .iter()
                .zip(simplex[i].iter())
                .map(|(b, v)| b + NM_SHRINK * (v - b))
                .collect();
            values[i] = eval(&simplex[i]);
        }
    }

    let (best_idx, _) = values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |acc, (i, &v)| if v < acc.1 { (i, v) } else { acc });

    Minimum {
        x: simplex[best_idx].clone(),
        fx: values[best_idx],
        converged,
        iterations,
    }
}

/// Brent's bounded minimisation of a scalar function on `[lower, upper]`.
pub fn minimize_bounded<F>(f: F, lower: f64, upper: f64, xatol: f64, max_eval: usize) -> Minimum
where
    F: Fn(f64) -> f64,
{
    let sqrt_eps = f64::EPSILON.sqrt();
    let golden_mean = 0.5 * (3.0 - 5f64.sqrt());

    let (mut a, mut b) = (lower, upper);
    let mut fulc = a + golden_mean * (b - a);
    let mut nfc = fulc;
    let mut xf = fulc;
    let mut rat: f64 = 0.0;
    let mut e: f64 = 0.0;
    let mut fx = f(xf);
    let mut n_eval = 1;
    let mut ffulc = fx;
    let mut fnfc = fx;
    let mut xm = 0.5 * (a + b);
    let mut tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
    let mut tol2 = 2.0 * tol1;
    let mut converged = true;

    while (xf - xm).abs() > tol2 - 0.5 * (b - a) {
        let mut golden = true;

        if e.abs() > tol1 {
            golden = false;
            let mut r = (xf - nfc) * (fx - ffulc);
            let mut q = (xf - fulc) * (fx - fnfc);
            let mut p = (xf - fulc) * q - (xf - nfc) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            }
            q = q.abs();
            r = e;
            e = rat;

            if p.abs() < (0.5 * q * r).abs() && p > q * (a - xf) && p < q * (b - xf) {
                rat = p / q;
                let x = xf + rat;
                if (x - a) < tol2 || (b - x) < tol2 {
                    rat = tol1 * sign_or_one(xm - xf);
                }
            } else {
                golden = true;
            }
        }

        if golden {
            e = if xf >= xm { a - xf } else { b - xf };
            rat = golden_mean * e;
        }

        let x = xf + sign_or_one(rat) * rat.abs().max(tol1);
        let fu = f(x);
        n_eval += 1;

        if fu <= fx {
            if x >= xf {
                a = xf;
            } else {
                b = xf;
            }
            fulc = nfc;
            ffulc = fnfc;
            nfc = xf;
            fnfc = fx;
            xf = x;
            fx = fu;
        } else {
            if x < xf {
                a = x;
            } else {
                b = x;
            }
            if fu <= fnfc || nfc == xf {
                fulc = nfc;
                ffulc = fnfc;
                nfc = x;
                fnfc = fu;
            } else if fu <= ffulc || fulc == xf || fulc == nfc {
                fulc = x;
                ffulc = fu;
            }
        }

        xm = 0.5 * (a + b);
        tol1 = sqrt_eps * xf.abs() + xatol / 3.0;
        tol2 = 2.0 * tol1;

        if n_eval >= max_eval {
            converged = false;
            break;
        }
    }

    Minimum {
        x: vec![xf],
        fx,
        converged,
        iterations: n_eval,
    }
}

fn sign_or_one(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nelder_mead_finds_rosenbrock_minimum() {
        let rosen = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let min = nelder_mead(rosen, &[-1.2, 1.0], &NelderMeadOptions::for_dim(2));
        assert!(min.converged);
        assert!((min.x[0] - 1.0).abs() < 1e-3, "x0={}", min.x[0]);
        assert!((min.x[1] - 1.0).abs() < 1e-3, "x1={}", min.x[1]);
    }

    #[test]
    fn nelder_mead_stays_out_of_infinite_region() {
        // Minimum of (x+1)^2 is at -1 but x < 0 is forbidden.
        let f = |x: &[f64]| if x[0] < 0.0 { f64::INFINITY } else { (x[0] + 1.0).powi(2) };
        let min = nelder_mead(f, &[2.0], &NelderMeadOptions::for_dim(1));
        assert!(min.x[0] >= 0.0);
        assert!(min.x[0] < 1e-3);
    }

    #[test]
    fn bounded_brent_finds_interior_minimum() {
        let min = minimize_bounded(|x| (x - 0.37).powi(2), 0.0, 500.0, 1e-8, 500);
        assert!(min.converged);
        assert!((min.x[0] - 0.37).abs() < 1e-6, "x={}", min.x[0]);
    }

    #[test]
    fn bounded_brent_clamps_to_edge() {
        let min = minimize_bounded(|x| x, 1.0, 2.0, 1e-8, 500);
        assert!((min.x[0] - 1.0).abs() < 1e-6);
    }
}
