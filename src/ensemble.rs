//! Affine-invariant ensemble sampler (stretch move).
//!
//! The ensemble is split into two halves. Every walker of one half proposes a
//! move along the line to a random walker of the other half, so all proposals
//! of a half can be evaluated in parallel. Each half-step is a barrier: the
//! second half only sees positions after the first half is fully updated.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::{
    chain::{BlobHistory, Chain},
    error::{LogpError, Result, SpecfitError},
};

/// A log probability density together with an auxiliary payload.
///
/// The function is shared between worker threads.
pub trait LogProbFunc: Sync {
    type Blob: Clone + Default + Send + Sync;
    type Err: LogpError + Send + Sync + 'static;

    fn log_prob(&self, position: &[f64]) -> std::result::Result<(f64, Self::Blob), Self::Err>;
}

/// Settings for the stretch move sampler
#[derive(Debug, Clone, Copy)]
pub struct EnsembleSettings {
    /// Scale `a` of the stretch distribution `g(z) ∝ 1/√z` on `[1/a, a]`.
    pub stretch_scale: f64,
    pub num_threads: usize,
    pub seed: u64,
}

impl Default for EnsembleSettings {
    fn default() -> Self {
        Self {
            stretch_scale: 2.,
            num_threads: 8,
            seed: 0,
        }
    }
}

/// Positions, log probabilities and blobs of all walkers at one step.
#[derive(Debug, Clone)]
pub struct EnsembleState<B> {
    pub positions: Vec<Box<[f64]>>,
    pub log_prob: Vec<f64>,
    pub blobs: Vec<B>,
}

impl<B> EnsembleState<B> {
    pub fn num_walkers(&self) -> usize {
        self.positions.len()
    }
}

struct Proposal {
    walker: usize,
    z: f64,
    log_u: f64,
    position: Box<[f64]>,
}

pub struct EnsembleSampler<F: LogProbFunc> {
    func: F,
    num_walkers: usize,
    dim: usize,
    settings: EnsembleSettings,
    pool: ThreadPool,
    rng: ChaCha8Rng,
    chain: Chain,
    blobs: BlobHistory<F::Blob>,
    accepted: Vec<u64>,
    iterations: u64,
}

impl<F: LogProbFunc> EnsembleSampler<F> {
    pub fn new(
        func: F,
        num_walkers: usize,
        dim: usize,
        settings: EnsembleSettings,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(SpecfitError::invalid_settings(
                "the parameter vector is empty",
            ));
        }
        if num_walkers % 2 != 0 || num_walkers < 2 * dim {
            return Err(SpecfitError::invalid_settings(format!(
                "number of walkers must be even and at least {}, got {}",
                2 * dim,
                num_walkers
            )));
        }
        if !(settings.stretch_scale > 1.) {
            return Err(SpecfitError::invalid_settings(format!(
                "stretch scale must be larger than 1, got {}",
                settings.stretch_scale
            )));
        }
        if settings.num_threads == 0 {
            return Err(SpecfitError::invalid_settings(
                "at least one worker thread is needed",
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.num_threads)
            .thread_name(|i| format!("specfit-worker-{}", i))
            .build()
            .map_err(|err| SpecfitError::invalid_settings(err.to_string()))?;

        let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
        rng.set_stream(0);

        Ok(EnsembleSampler {
            func,
            num_walkers,
            dim,
            settings,
            pool,
            rng,
            chain: Chain::new(num_walkers, dim),
            blobs: BlobHistory::default(),
            accepted: vec![0; num_walkers],
            iterations: 0,
        })
    }

    pub fn func(&self) -> &F {
        &self.func
    }

    pub fn num_walkers(&self) -> usize {
        self.num_walkers
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn blobs(&self) -> &BlobHistory<F::Blob> {
        &self.blobs
    }

    /// Number of steps since the last reset.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Fraction of accepted proposals per walker since the last reset.
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        if self.iterations == 0 {
            return vec![f64::NAN; self.num_walkers];
        }
        self.accepted
            .iter()
            .map(|&count| count as f64 / self.iterations as f64)
            .collect()
    }

    /// Forget stored draws, blobs and acceptance counts.
    pub fn reset(&mut self) {
        self.chain.clear();
        self.blobs.clear();
        self.accepted.iter_mut().for_each(|count| *count = 0);
        self.iterations = 0;
    }

    /// Evaluate the target at one position.
    ///
    /// Recoverable errors and `NaN` map to a log probability of `-inf`.
    pub fn log_prob_fn(&self, position: &[f64]) -> Result<(f64, F::Blob)> {
        evaluate(&self.func, position)
    }

    fn evaluate_many<'a>(
        &self,
        positions: impl IndexedParallelIterator<Item = &'a [f64]>,
    ) -> Result<Vec<(f64, F::Blob)>> {
        let func = &self.func;
        self.pool.install(|| {
            positions
                .map(|position| evaluate(func, position))
                .collect::<Result<Vec<_>>>()
        })
    }

    /// Evaluate the target for a set of starting positions.
    ///
    /// Fails if no walker has a finite log probability.
    pub fn initial_state(&self, positions: Vec<Box<[f64]>>) -> Result<EnsembleState<F::Blob>> {
        if positions.len() != self.num_walkers {
            return Err(SpecfitError::invalid_settings(format!(
                "expected {} initial positions, got {}",
                self.num_walkers,
                positions.len()
            )));
        }
        if let Some(bad) = positions.iter().find(|p| p.len() != self.dim) {
            return Err(SpecfitError::invalid_settings(format!(
                "initial position has dimension {}, expected {}",
                bad.len(),
                self.dim
            )));
        }
        let (log_prob, blobs): (Vec<_>, Vec<_>) = self
            .evaluate_many(positions.par_iter().map(|p| &p[..]))?
            .into_iter()
            .unzip();
        if log_prob.iter().all(|lp| !lp.is_finite()) {
            return Err(SpecfitError::AllWalkersNonFinite {
                num_walkers: self.num_walkers,
            });
        }
        Ok(EnsembleState {
            positions,
            log_prob,
            blobs,
        })
    }

    /// Advance the ensemble `num_steps` times from the given positions and
    /// store every step.
    pub fn run_mcmc(
        &mut self,
        positions: Vec<Box<[f64]>>,
        num_steps: u64,
    ) -> Result<EnsembleState<F::Blob>> {
        let state = self.initial_state(positions)?;
        self.sample(state, num_steps)
    }

    /// Advance the ensemble from an already evaluated state.
    pub fn sample(
        &mut self,
        mut state: EnsembleState<F::Blob>,
        num_steps: u64,
    ) -> Result<EnsembleState<F::Blob>> {
        for _ in 0..num_steps {
            self.step(&mut state)?;
            self.iterations += 1;
            self.chain.push_step(&state.positions, &state.log_prob);
            self.blobs.push_step(state.blobs.clone());
            if tracing::enabled!(tracing::Level::DEBUG) {
                let accepted: u64 = self.accepted.iter().sum();
                let proposed = self.iterations * self.num_walkers as u64;
                tracing::debug!(
                    step = self.iterations,
                    acceptance = accepted as f64 / proposed as f64,
                    "ensemble step finished"
                );
            }
        }
        Ok(state)
    }

    fn step(&mut self, state: &mut EnsembleState<F::Blob>) -> Result<()> {
        let half = self.num_walkers / 2;
        let halves = [(0..half, half..self.num_walkers), (half..self.num_walkers, 0..half)];
        for (active, complement) in halves {
            let mut proposals = Vec::with_capacity(active.len());
            for walker in active {
                proposals.push(self.propose(state, walker, complement.clone()));
            }

            let results =
                self.evaluate_many(proposals.par_iter().map(|prop| &prop.position[..]))?;

            for (proposal, (log_prob, blob)) in proposals.into_iter().zip(results) {
                let walker = proposal.walker;
                let log_ratio = (self.dim as f64 - 1.) * proposal.z.ln() + log_prob
                    - state.log_prob[walker];
                // NaN (both -inf) never accepts
                if proposal.log_u < log_ratio {
                    state.positions[walker] = proposal.position;
                    state.log_prob[walker] = log_prob;
                    state.blobs[walker] = blob;
                    self.accepted[walker] += 1;
                }
            }
        }
        Ok(())
    }

    fn propose(
        &mut self,
        state: &EnsembleState<F::Blob>,
        walker: usize,
        complement: std::ops::Range<usize>,
    ) -> Proposal {
        let a = self.settings.stretch_scale;
        let partner = self.rng.random_range(complement);
        let u: f64 = self.rng.random();
        let z = ((a - 1.) * u + 1.).powi(2) / a;
        let log_u = self.rng.random::<f64>().ln();

        let current = &state.positions[walker];
        let other = &state.positions[partner];
        let position = other
            .iter()
            .zip(current.iter())
            .map(|(&o, &c)| o + z * (c - o))
            .collect();
        Proposal {
            walker,
            z,
            log_u,
            position,
        }
    }
}

fn evaluate<F: LogProbFunc>(func: &F, position: &[f64]) -> Result<(f64, F::Blob)> {
    match func.log_prob(position) {
        Ok((log_prob, blob)) if log_prob.is_nan() => Ok((f64::NEG_INFINITY, blob)),
        Ok(value) => Ok(value),
        Err(err) if err.is_recoverable() => Ok((f64::NEG_INFINITY, F::Blob::default())),
        Err(err) => Err(SpecfitError::LogpFailure(Box::new(err))),
    }
}

#[cfg(test)]
pub(crate) mod test_logps {
    use thiserror::Error;

    use super::LogProbFunc;
    use crate::error::LogpError;

    /// Independent normal distribution in every dimension.
    #[derive(Clone, Debug)]
    pub struct NormalLogp {
        pub mu: Vec<f64>,
        pub sigma: f64,
    }

    #[derive(Error, Debug)]
    pub enum NormalLogpError {
        #[error("position outside of support")]
        OutsideSupport,
        #[error("fatal")]
        Fatal,
    }

    impl LogpError for NormalLogpError {
        fn is_recoverable(&self) -> bool {
            matches!(self, NormalLogpError::OutsideSupport)
        }
    }

    impl LogProbFunc for NormalLogp {
        type Blob = f64;
        type Err = NormalLogpError;

        fn log_prob(&self, position: &[f64]) -> Result<(f64, f64), NormalLogpError> {
            if position.iter().any(|p| p.abs() > 1e6) {
                return Err(NormalLogpError::OutsideSupport);
            }
            if position.iter().any(|p| p.is_nan()) {
                return Err(NormalLogpError::Fatal);
            }
            let logp = position
                .iter()
                .zip(self.mu.iter())
                .map(|(p, mu)| -0.5 * (p - mu).powi(2) / (self.sigma * self.sigma))
                .sum::<f64>();
            Ok((logp, position[0]))
        }
    }
}
