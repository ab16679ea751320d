//! Orbit posterior with a jitter term.
//!
//! Parameters are `theta = [gamma, K, phi, s]` at the periodogram period. The
//! workflow is:
//!
//! - point estimate: Nelder–Mead on `-log p` from the least-squares solution
//!   with `s` at its starting value
//! - walkers: a small Gaussian ball around the point estimate
//! - ensemble run, burn-in discarded, chain thinned and flattened
//! - summaries (mean, std, percentiles) and posterior-predictive curves

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use serde::Serialize;

use crate::domain::{PipelineConfig, RvSeries};
use crate::error::AppError;
use crate::fit::orbit::{OrbitData, OrbitFit, OrbitParams, log_probability, model_curve};
use crate::math::{NelderMeadOptions, mean, nelder_mead, percentile, sample_std_dev};
use crate::sampler::ensemble::EnsembleSampler;

pub const ORBIT_PARAM_NAMES: [&str; 4] = ["gamma", "K", "phi", "s"];
pub const IDX_GAMMA: usize = 0;
pub const IDX_K: usize = 1;
pub const IDX_PHI: usize = 2;
pub const IDX_JITTER: usize = 3;

/// Points per posterior-predictive curve.
const PREDICTIVE_POINTS: usize = 200;
/// Seed offset for predictive draws, so they do not reuse the sampler stream.
const PREDICTIVE_SEED_OFFSET: u64 = 0x9e37_79b9;

#[derive(Debug, Clone, Serialize)]
pub struct ParamSummary {
    pub name: &'static str,
    pub mean: f64,
    pub std: f64,
    pub p16: f64,
    pub p50: f64,
    pub p84: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrbitPosterior {
    pub period_hours: f64,
    pub point_estimate: Vec<f64>,
    pub point_estimate_converged: bool,
    pub summary: Vec<ParamSummary>,
    pub acceptance_fraction: f64,
    pub n_samples: usize,
    /// Flattened chain rows `[gamma, K, phi, s]`.
    #[serde(skip)]
    pub samples: Vec<Vec<f64>>,
    /// Model curves `(phase, rv)` for randomly drawn samples.
    #[serde(skip)]
    pub predictive: Vec<Vec<(f64, f64)>>,
}

impl OrbitPosterior {
    pub fn param(&self, idx: usize) -> &ParamSummary {
        &self.summary[idx]
    }

    /// Posterior-mean orbit.
    pub fn mean_orbit(&self) -> OrbitParams {
        OrbitParams {
            gamma: self.summary[IDX_GAMMA].mean,
            k: self.summary[IDX_K].mean,
            phi: self.summary[IDX_PHI].mean,
        }
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.samples.iter().map(|r| r[idx]).collect()
    }
}

/// Sample the orbit posterior starting from the least-squares solution.
pub fn sample_orbit(series: &RvSeries, lsq: &OrbitFit, config: &PipelineConfig) -> Result<OrbitPosterior, AppError> {
    if config.burn_in >= config.steps {
        return Err(AppError::input(format!(
            "Burn-in ({}) must be smaller than the number of steps ({}).",
            config.burn_in, config.steps
        )));
    }

    let data = OrbitData::new(series, lsq.period_hours);
    let log_prob = |theta: &[f64]| log_probability(theta, &data);

    let start = [lsq.params.gamma, lsq.params.k, lsq.params.phi, config.jitter_init];
    let min = nelder_mead(|theta| -log_prob(theta), &start, &NelderMeadOptions::for_dim(4));
    if !min.fx.is_finite() {
        return Err(AppError::data("Posterior point estimate has zero probability."));
    }
    if !min.converged {
        log::warn!("Posterior point estimate did not converge after {} iterations.", min.iterations);
    }
    log::info!(
        "Point estimate: gamma={:.1} K={:.1} phi={:.3} s={:.1}",
        min.x[IDX_GAMMA],
        min.x[IDX_K],
        min.x[IDX_PHI],
        min.x[IDX_JITTER]
    );

    let centre = min.x.clone();
    let spread = config.init_spread;
    let init = |rng: &mut StdRng| -> Vec<f64> {
        centre
            .iter()
            .map(|&x| x + spread * x.abs().max(1.0) * rng.sample::<f64, _>(StandardNormal))
            .collect()
    };

    let mut sampler = EnsembleSampler::new(log_prob, config.walkers, 4, config.stretch_scale, config.seed, init)?;
    log::info!(
        "Running {} walkers for {} steps (burn-in {}, thin {}).",
        config.walkers,
        config.steps,
        config.burn_in,
        config.thin
    );
    sampler.run(config.steps);
    let samples = sampler.flat_chain(config.burn_in, config.thin)?;
    let acceptance_fraction = sampler.mean_acceptance_fraction();
    if acceptance_fraction < 0.1 {
        log::warn!("Low sampler acceptance fraction: {acceptance_fraction:.3}");
    }

    let summary = summarize(&samples)?;
    let predictive = predictive_curves(&samples, config.predictive_draws, config.seed);

    Ok(OrbitPosterior {
        period_hours: lsq.period_hours,
        point_estimate: min.x,
        point_estimate_converged: min.converged,
        summary,
        acceptance_fraction,
        n_samples: samples.len(),
        samples,
        predictive,
    })
}

fn summarize(samples: &[Vec<f64>]) -> Result<Vec<ParamSummary>, AppError> {
    ORBIT_PARAM_NAMES
        .iter()
        .enumerate()
        .map(|(idx, &name)| {
            let col: Vec<f64> = samples.iter().map(|r| r[idx]).collect();
            let stat = |v: Option<f64>| v.ok_or_else(|| AppError::insufficient("Too few posterior samples to summarise."));
            Ok(ParamSummary {
                name,
                mean: stat(mean(&col))?,
                std: stat(sample_std_dev(&col))?,
                p16: stat(percentile(&col, 16.0))?,
                p50: stat(percentile(&col, 50.0))?,
                p84: stat(percentile(&col, 84.0))?,
            })
        })
        .collect()
}

fn predictive_curves(samples: &[Vec<f64>], draws: usize, seed: u64) -> Vec<Vec<(f64, f64)>> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(PREDICTIVE_SEED_OFFSET));
    (0..draws)
        .map(|_| {
            let row = &samples[rng.gen_range(0..samples.len())];
            let params = OrbitParams { gamma: row[IDX_GAMMA], k: row[IDX_K], phi: row[IDX_PHI] };
            model_curve(&params, PREDICTIVE_POINTS)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::{SyntheticOrbit, synthetic_rv_series};
    use crate::fit::orbit::fit_orbit;
    use crate::period::{FrequencyGrid, lomb_scargle};

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            walkers: 32,
            steps: 600,
            burn_in: 300,
            thin: 5,
            predictive_draws: 10,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn recovers_period_and_amplitude_of_injected_orbit() {
        let orbit = SyntheticOrbit { gamma: 10.0, k: 150.0, period_hours: 3.5, phi: 0.4 };
        let series = synthetic_rv_series(&orbit, 30, 5.0, 10.0, 99);
        let config = small_config();

        let grid = FrequencyGrid {
            min_frequency: config.min_frequency,
            max_frequency: config.max_frequency,
            samples_per_peak: config.samples_per_peak,
        };
        let pg = lomb_scargle(&series, &grid).unwrap();
        let true_f = 24.0 / orbit.period_hours;
        assert!((pg.best_frequency - true_f).abs() <= 1.0 / series.baseline());

        let lsq = fit_orbit(&series, pg.period_hours()).unwrap();
        let post = sample_orbit(&series, &lsq, &config).unwrap();

        let k = post.param(IDX_K);
        assert!((k.mean - 150.0).abs() < 4.0 * k.std + 5.0, "K={} ± {}", k.mean, k.std);
        assert!(post.param(IDX_JITTER).mean >= 0.0);
        assert_eq!(post.n_samples, 60 * 32);
        assert_eq!(post.predictive.len(), 10);
        assert!(post.acceptance_fraction > 0.05);
    }

    #[test]
    fn walker_samples_respect_prior_walls() {
        let orbit = SyntheticOrbit { gamma: 0.0, k: 60.0, period_hours: 2.0, phi: 0.0 };
        let series = synthetic_rv_series(&orbit, 20, 3.0, 15.0, 5);
        let lsq = fit_orbit(&series, orbit.period_hours).unwrap();
        let config = PipelineConfig { steps: 200, burn_in: 50, ..small_config() };
        let post = sample_orbit(&series, &lsq, &config).unwrap();
        assert!(post.samples.iter().all(|r| r[IDX_K] >= 0.0 && r[IDX_JITTER] >= 0.0));
    }

    #[test]
    fn burn_in_must_leave_samples() {
        let orbit = SyntheticOrbit { gamma: 0.0, k: 60.0, period_hours: 2.0, phi: 0.0 };
        let series = synthetic_rv_series(&orbit, 10, 3.0, 15.0, 5);
        let lsq = fit_orbit(&series, orbit.period_hours).unwrap();
        let config = PipelineConfig { steps: 100, burn_in: 100, ..small_config() };
        assert_eq!(sample_orbit(&series, &lsq, &config).unwrap_err().exit_code(), 2);
    }
}
