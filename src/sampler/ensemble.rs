//! Affine-invariant ensemble sampler (stretch move).
//!
//! The ensemble is split into two halves by walker parity. Each half is updated
//! in turn using walkers from the other half as the complementary set:
//!
//! ```text
//! z ~ g(z) ∝ 1/sqrt(z) on [1/a, a]
//! y = x_j + z (x_k - x_j)
//! accept with probability min(1, z^(d-1) p(y) / p(x_k))
//! ```
//!
//! All random numbers for a half-step are drawn sequentially from one seeded
//! generator before the log-probabilities are evaluated in parallel, so a run is
//! reproducible for a given seed regardless of thread count.

use rand::prelude::*;
use rand::rngs::StdRng;

use rayon::prelude::*;

use crate::error::AppError;

/// Redraws allowed per walker when the initial position has zero probability.
const MAX_INIT_REDRAWS: usize = 100;

/// One ensemble member.
#[derive(Debug, Clone)]
pub struct Walker {
    pub position: Vec<f64>,
    pub log_prob: f64,
}

pub struct EnsembleSampler<F> {
    log_prob_fn: F,
    ndim: usize,
    stretch: f64,
    walkers: Vec<Walker>,
    rng: StdRng,
    /// Step-major chain: `[step][walker][dim]` flattened.
    chain: Vec<f64>,
    accepted: Vec<usize>,
    steps: usize,
}

impl<F> EnsembleSampler<F>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    /// Build a sampler from initial positions.
    ///
    /// `init` is called to (re)draw a walker's starting point until it has a
    /// finite log-probability.
    pub fn new<I>(
        log_prob_fn: F,
        nwalkers: usize,
        ndim: usize,
        stretch: f64,
        seed: u64,
        mut init: I,
    ) -> Result<Self, AppError>
    where
        I: FnMut(&mut StdRng) -> Vec<f64>,
    {
        if ndim == 0 {
            return Err(AppError::input("Sampler dimension must be > 0."));
        }
        if nwalkers < 2 * ndim {
            return Err(AppError::input(format!(
                "Sampler needs at least {} walkers for {ndim} parameters (have {nwalkers}).",
                2 * ndim
            )));
        }
        if !(stretch.is_finite() && stretch > 1.0) {
            return Err(AppError::input(format!("Stretch scale must be > 1 (got {stretch}).")));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut walkers = Vec::with_capacity(nwalkers);
        for k in 0..nwalkers {
            let mut placed = None;
            for _ in 0..MAX_INIT_REDRAWS {
                let position = init(&mut rng);
                if position.len() != ndim {
                    return Err(AppError::data("Initial walker has the wrong dimension."));
                }
                let log_prob = log_prob_fn(&position);
                if log_prob.is_finite() {
                    placed = Some(Walker { position, log_prob });
                    break;
                }
            }
            let Some(walker) = placed else {
                return Err(AppError::data(format!(
                    "Could not place walker {k} at a finite log-probability."
                )));
            };
            walkers.push(walker);
        }

        Ok(Self {
            log_prob_fn,
            ndim,
            stretch,
            accepted: vec![0; nwalkers],
            walkers,
            rng,
            chain: Vec::new(),
            steps: 0,
        })
    }

    pub fn nwalkers(&self) -> usize {
        self.walkers.len()
    }

    pub fn walkers(&self) -> &[Walker] {
        &self.walkers
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Advance the ensemble `n` steps, recording every state.
    pub fn run(&mut self, n: usize) {
        self.chain.reserve(n * self.walkers.len() * self.ndim);
        for i in 0..n {
            self.step();
            if (i + 1) % 100 == 0 {
                log::debug!(
                    "Sampler step {}/{n}, mean acceptance {:.3}",
                    i + 1,
                    self.mean_acceptance_fraction()
                );
            }
        }
    }

    fn step(&mut self) {
        let nwalkers = self.walkers.len();
        for parity in 0..2 {
            let active: Vec<usize> = (0..nwalkers).filter(|k| k % 2 == parity).collect();
            let complement: Vec<usize> = (0..nwalkers).filter(|k| k % 2 != parity).collect();

            struct Proposal {
                walker: usize,
                z: f64,
                position: Vec<f64>,
                log_u: f64,
            }

            let a = self.stretch;
            let mut proposals = Vec::with_capacity(active.len());
            for &k in &active {
                let u: f64 = self.rng.r#gen();
                let z = ((a - 1.0) * u + 1.0).powi(2) / a;
                let j = complement[self.rng.gen_range(0..complement.len())];
                let xk = &self.walkers[k].position;
                let xj = &self.walkers[j].position;
                let position: Vec<f64> = xj.iter().zip(xk.iter()).map(|(c, s)| c + z * (s - c)).collect();
                let log_u = self.rng.r#gen::<f64>().ln();
                proposals.push(Proposal { walker: k, z, position, log_u });
            }

            let log_prob_fn = &self.log_prob_fn;
            let log_probs: Vec<f64> = proposals
                .par_iter()
                .map(|p| {
                    let v = log_prob_fn(&p.position);
                    if v.is_nan() { f64::NEG_INFINITY } else { v }
                })
                .collect();

            for (p, new_lp) in proposals.into_iter().zip(log_probs) {
                let old_lp = self.walkers[p.walker].log_prob;
                let diff = (self.ndim as f64 - 1.0) * p.z.ln() + new_lp - old_lp;
                if diff > p.log_u {
                    self.walkers[p.walker] = Walker { position: p.position, log_prob: new_lp };
                    self.accepted[p.walker] += 1;
                }
            }
        }

        for w in &self.walkers {
            self.chain.extend_from_slice(&w.position);
        }
        self.steps += 1;
    }

    /// Chain states after dropping `discard` steps and keeping every `thin`-th
    /// step, flattened step-major (all walkers of one step, then the next).
    pub fn flat_chain(&self, discard: usize, thin: usize) -> Result<Vec<Vec<f64>>, AppError> {
        if thin == 0 {
            return Err(AppError::input("Thinning factor must be >= 1."));
        }
        if discard >= self.steps {
            return Err(AppError::insufficient(format!(
                "Burn-in ({discard}) leaves no samples from {} steps.",
                self.steps
            )));
        }
        let per_step = self.walkers.len() * self.ndim;
        let mut out = Vec::new();
        for step in (discard..self.steps).step_by(thin) {
            let block = &self.chain[step * per_step..(step + 1) * per_step];
            out.extend(block.chunks(self.ndim).map(|c| c.to_vec()));
        }
        Ok(out)
    }

    /// Per-walker fraction of accepted proposals.
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        let steps = self.steps.max(1) as f64;
        self.accepted.iter().map(|&a| a as f64 / steps).collect()
    }

    pub fn mean_acceptance_fraction(&self) -> f64 {
        let af = self.acceptance_fraction();
        af.iter().sum::<f64>() / af.len().max(1) as f64
    }
}
