//! Companion-mass inference from the orbit posterior.
//!
//! Every posterior `K` draw gives a mass function at the adopted period. From
//! there:
//!
//! - a minimum-mass proxy `f^{1/3} M1^{2/3}` per draw
//! - an `M1 × i` grid of companion masses at the mean mass function
//! - a population estimate: `sin i` drawn from a grid on `[0.1, 1]` with
//!   weights `∝ sin² i`, each of the first `mass_samples` draws inverted for
//!   `M2` at the adopted primary mass, and the total-mass exceedance
//!   probabilities read off as sample fractions

use rand::distributions::WeightedIndex;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;

use crate::domain::PipelineConfig;
use crate::domain::constants::{CHANDRASEKHAR_MASS, MERGER_MASS_THRESHOLD};
use crate::error::AppError;
use crate::mass::function::{companion_mass, mass_function, minimum_mass_proxy};
use crate::mass::primary::PrimaryMass;
use crate::math::{fraction_above, linspace, mean, percentile};
use crate::sampler::posterior::{IDX_K, OrbitPosterior};

pub const GRID_M1_RANGE: (f64, f64) = (0.1, 1.0);
pub const GRID_INC_RANGE: (f64, f64) = (5.0, 90.0);
pub const GRID_SIZE: usize = 25;
pub const SIN_I_RANGE: (f64, f64) = (0.1, 1.0);

/// Seed offset for the inclination draws.
const INCLINATION_SEED_OFFSET: u64 = 0x85eb_ca6b;

/// Companion masses over primary mass × inclination, at one mass function.
#[derive(Debug, Clone, Serialize)]
pub struct CompanionGrid {
    pub mass_function: f64,
    pub m1: Vec<f64>,
    pub inclination_deg: Vec<f64>,
    /// `m2[i][j]` for `m1[i]`, `inclination_deg[j]`.
    pub m2: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Interval {
    pub p16: f64,
    pub p50: f64,
    pub p84: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MassInference {
    pub primary: PrimaryMass,
    pub period_hours: f64,
    pub mass_function_mean: f64,
    pub mass_function: Interval,
    pub minimum_mass: Interval,
    pub m2: Interval,
    pub total_mass: Interval,
    /// P(M1 + M2 > 1 M☉).
    pub p_total_above_1: f64,
    /// P(M1 + M2 > 1.4 M☉).
    pub p_total_above_chandrasekhar: f64,
    pub n_mass_samples: usize,
    pub grid: CompanionGrid,
    #[serde(skip)]
    pub mass_function_samples: Vec<f64>,
    #[serde(skip)]
    pub minimum_mass_samples: Vec<f64>,
    #[serde(skip)]
    pub m2_samples: Vec<f64>,
    #[serde(skip)]
    pub total_samples: Vec<f64>,
}

/// Run the mass inference for an orbit posterior and an adopted primary mass.
pub fn infer_masses(
    posterior: &OrbitPosterior,
    primary: PrimaryMass,
    config: &PipelineConfig,
) -> Result<MassInference, AppError> {
    let k = posterior.column(IDX_K);
    if k.is_empty() {
        return Err(AppError::insufficient("No posterior samples for the mass inference."));
    }
    let period_hours = posterior.period_hours;
    let m1 = primary.mass;

    let f: Vec<f64> = k.iter().map(|&k| mass_function(period_hours, k)).collect();
    let f_mean = mean(&f).ok_or_else(|| AppError::insufficient("Empty mass-function sample."))?;
    let proxy: Vec<f64> = f.iter().map(|&v| minimum_mass_proxy(v, m1)).collect();

    let grid = companion_grid(f_mean)?;

    let sin_i = draw_sin_inclinations(f.len(), config.seed.wrapping_add(INCLINATION_SEED_OFFSET))?;
    let n = config.mass_samples.min(f.len());
    let m2_samples: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| companion_mass(f[i], sin_i[i].asin().to_degrees(), m1))
        .collect::<Result<_, _>>()?;
    let total_samples: Vec<f64> = m2_samples.iter().map(|m2| m2 + m1).collect();

    let p_total_above_1 = fraction_above(&total_samples, MERGER_MASS_THRESHOLD);
    let p_total_above_chandrasekhar = fraction_above(&total_samples, CHANDRASEKHAR_MASS);
    log::info!(
        "M1={m1:.3} M☉ ({:?}); P(Mt > 1)={p_total_above_1:.2}, P(Mt > 1.4)={p_total_above_chandrasekhar:.2}",
        primary.source
    );

    Ok(MassInference {
        primary,
        period_hours,
        mass_function_mean: f_mean,
        mass_function: interval(&f)?,
        minimum_mass: interval(&proxy)?,
        m2: interval(&m2_samples)?,
        total_mass: interval(&total_samples)?,
        p_total_above_1,
        p_total_above_chandrasekhar,
        n_mass_samples: n,
        grid,
        mass_function_samples: f,
        minimum_mass_samples: proxy,
        m2_samples,
        total_samples,
    })
}

/// Companion mass over the default `M1 × i` grid at mass function `f`.
pub fn companion_grid(f: f64) -> Result<CompanionGrid, AppError> {
    let m1 = linspace(GRID_M1_RANGE.0, GRID_M1_RANGE.1, GRID_SIZE);
    let inclination_deg = linspace(GRID_INC_RANGE.0, GRID_INC_RANGE.1, GRID_SIZE);
    let m2 = m1
        .par_iter()
        .map(|&m| {
            inclination_deg
                .iter()
                .map(|&inc| companion_mass(f, inc, m))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompanionGrid {
        mass_function: f,
        m1,
        inclination_deg,
        m2,
    })
}

/// `n` draws of `sin i` from an `n`-point grid on `[0.1, 1]`, weighted by `sin² i`.
fn draw_sin_inclinations(n: usize, seed: u64) -> Result<Vec<f64>, AppError> {
    let grid = linspace(SIN_I_RANGE.0, SIN_I_RANGE.1, n);
    let dist = WeightedIndex::new(grid.iter().map(|s| s * s))
        .map_err(|e| AppError::data(format!("Invalid inclination weights: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..n).map(|_| grid[dist.sample(&mut rng)].min(1.0)).collect())
}

fn interval(values: &[f64]) -> Result<Interval, AppError> {
    let q = |p: f64| percentile(values, p).ok_or_else(|| AppError::insufficient("Empty mass sample."));
    Ok(Interval {
        p16: q(16.0)?,
        p50: q(50.0)?,
        p84: q(84.0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mass::primary::M1Source;
    use crate::sampler::posterior::{ORBIT_PARAM_NAMES, ParamSummary};

    fn posterior_with_k(k: &[f64], period_hours: f64) -> OrbitPosterior {
        let summary = ORBIT_PARAM_NAMES
            .iter()
            .map(|&name| ParamSummary { name, mean: 0.0, std: 0.0, p16: 0.0, p50: 0.0, p84: 0.0 })
            .collect();
        OrbitPosterior {
            period_hours,
            point_estimate: vec![0.0; 4],
            point_estimate_converged: true,
            summary,
            acceptance_fraction: 0.3,
            n_samples: k.len(),
            samples: k.iter().map(|&k| vec![0.0, k, 0.0, 1.0]).collect(),
            predictive: Vec::new(),
        }
    }

    #[test]
    fn sin_i_draws_favour_edge_on() {
        let draws = draw_sin_inclinations(2000, 7).unwrap();
        assert!(draws.iter().all(|s| (0.1..=1.0).contains(s)));
        // E[sin i] under p ∝ sin² i on [0.1, 1] is about 0.75.
        let m = mean(&draws).unwrap();
        assert!((m - 0.75).abs() < 0.03, "mean sin i = {m}");
    }

    #[test]
    fn grid_grows_toward_low_mass_primary_and_low_inclination() {
        let g = companion_grid(0.1).unwrap();
        assert_eq!(g.m2.len(), GRID_SIZE);
        assert!(g.m2.iter().all(|row| row.len() == GRID_SIZE));
        // Heavier primary needs a heavier companion for the same f.
        assert!(g.m2[GRID_SIZE - 1][GRID_SIZE - 1] > g.m2[0][GRID_SIZE - 1]);
        // Lower inclination needs a heavier companion.
        assert!(g.m2[10][0] > g.m2[10][GRID_SIZE - 1]);
    }

    #[test]
    fn inference_is_deterministic_and_bounded() {
        let k: Vec<f64> = (0..400).map(|i| 300.0 + (i % 7) as f64).collect();
        let post = posterior_with_k(&k, 3.5);
        let primary = PrimaryMass { mass: 0.6, source: M1Source::Override };
        let config = PipelineConfig { mass_samples: 200, ..PipelineConfig::default() };
        let a = infer_masses(&post, primary, &config).unwrap();
        let b = infer_masses(&post, primary, &config).unwrap();
        assert_eq!(a.m2_samples, b.m2_samples);
        assert_eq!(a.n_mass_samples, 200);
        assert!(a.p_total_above_chandrasekhar <= a.p_total_above_1);
        assert!((0.0..=1.0).contains(&a.p_total_above_1));
        // The proxy is the edge-on bound, so the median M2 sits above its median.
        assert!(a.m2.p50 >= a.minimum_mass.p50 * 0.99);
    }

    #[test]
    fn short_chains_invert_every_draw() {
        // Grid sizes whose computed endpoint used to land just above sin i = 1.
        let primary = PrimaryMass { mass: 0.6, source: M1Source::Override };
        for n in [8, 15, 26] {
            let k: Vec<f64> = (0..n).map(|i| 140.0 + i as f64).collect();
            let post = posterior_with_k(&k, 3.5);
            for seed in 0..5 {
                let config = PipelineConfig { seed, ..PipelineConfig::default() };
                let inf = infer_masses(&post, primary, &config).unwrap();
                assert_eq!(inf.m2_samples.len(), n);
                assert!(inf.m2_samples.iter().all(|m| m.is_finite() && *m > 0.0));
            }
        }
        assert!(draw_sin_inclinations(8, 1).unwrap().iter().all(|s| *s <= 1.0));
    }
}
