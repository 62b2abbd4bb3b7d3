//! Burn-in and production run of an ensemble fit to a spectrum.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::{
    autocorr::AutocorrTime,
    chain::{BlobHistory, Chain},
    data::ObservationSet,
    ensemble::{EnsembleSampler, EnsembleSettings, EnsembleState},
    error::SpecfitError,
    likelihood::LikelihoodSettings,
    math::trapezoid,
    model::{Blob, SpectralModel},
    posterior::Posterior,
    prior::Prior,
    summary::{
        fit_confidence_bands, summarize_parameters, FitConfidence, ParameterSummary,
        SummarySettings,
    },
};

/// Settings for a spectral fit
#[derive(Debug, Clone, Copy)]
pub struct SamplerSettings {
    pub num_walkers: usize,
    /// Steps to run before the stored production run. These draws are discarded.
    pub num_burn: u64,
    /// Steps of the production run.
    pub num_run: u64,
    /// Rescale the normalization in the guess so that the model integral
    /// matches the data integral.
    pub guess_normalization: bool,
    pub normalization_index: usize,
    /// Standard deviation of the initial ball relative to each guess value.
    pub initial_spread: f64,
    pub num_threads: usize,
    pub stretch_scale: f64,
    pub seed: u64,
    pub likelihood: LikelihoodSettings,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            num_walkers: 600,
            num_burn: 30,
            num_run: 100,
            guess_normalization: true,
            normalization_index: 1,
            initial_spread: 0.1,
            num_threads: 8,
            stretch_scale: 2.,
            seed: 0,
            likelihood: LikelihoodSettings::default(),
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self, dim: usize) -> Result<(), SpecfitError> {
        if self.num_walkers % 2 != 0 || self.num_walkers < 2 * dim {
            return Err(SpecfitError::invalid_settings(format!(
                "number of walkers must be even and at least {}, got {}",
                2 * dim,
                self.num_walkers
            )));
        }
        if self.num_threads == 0 {
            return Err(SpecfitError::invalid_settings(
                "at least one worker thread is needed",
            ));
        }
        if !(self.stretch_scale > 1.) {
            return Err(SpecfitError::invalid_settings(format!(
                "stretch scale must be larger than 1, got {}",
                self.stretch_scale
            )));
        }
        if self.guess_normalization && self.normalization_index >= dim {
            return Err(SpecfitError::invalid_settings(format!(
                "normalization index {} is out of bounds for {} parameters",
                self.normalization_index, dim
            )));
        }
        if !(self.initial_spread >= 0.) || !self.initial_spread.is_finite() {
            return Err(SpecfitError::invalid_settings(format!(
                "initial spread must be finite and non-negative, got {}",
                self.initial_spread
            )));
        }
        Ok(())
    }

    fn ensemble_settings(&self) -> EnsembleSettings {
        EnsembleSettings {
            stretch_scale: self.stretch_scale,
            num_threads: self.num_threads,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerPhase {
    Uninitialized,
    BurningIn,
    BurnedIn,
    Running,
    Complete,
}

/// Drives an [`EnsembleSampler`] over the posterior of a spectral model.
///
/// The sampler moves through the phases `Uninitialized -> BurningIn ->
/// BurnedIn -> Running -> Complete`. Burn-in draws are discarded, only the
/// production run is kept in the chain and blob history. A phase that fails
/// leaves the sampler in that phase.
pub struct SpectrumSampler<M: SpectralModel, P: Prior> {
    settings: SamplerSettings,
    ensemble: EnsembleSampler<Posterior<M, P>>,
    guess: Vec<f64>,
    phase: SamplerPhase,
    state: Option<EnsembleState<Blob>>,
}

impl<M: SpectralModel, P: Prior> SpectrumSampler<M, P> {
    pub fn new(
        settings: SamplerSettings,
        data: Option<Arc<ObservationSet>>,
        model: M,
        prior: P,
        guess: &[f64],
    ) -> Result<Self> {
        let data = data.ok_or(SpecfitError::MissingData)?;
        let posterior =
            Posterior::new(data, model, prior).with_likelihood_settings(settings.likelihood);
        Self::from_posterior(settings, posterior, guess)
    }

    pub fn from_posterior(
        settings: SamplerSettings,
        posterior: Posterior<M, P>,
        guess: &[f64],
    ) -> Result<Self> {
        if let Some(num_params) = posterior.model().num_params() {
            if num_params != guess.len() {
                bail!(SpecfitError::invalid_settings(format!(
                    "model has {} parameters, the guess has {}",
                    num_params,
                    guess.len()
                )));
            }
        }
        settings.validate(guess.len())?;
        let ensemble = EnsembleSampler::new(
            posterior,
            settings.num_walkers,
            guess.len(),
            settings.ensemble_settings(),
        )
        .context("Could not create ensemble sampler")?;

        Ok(SpectrumSampler {
            settings,
            ensemble,
            guess: guess.to_vec(),
            phase: SamplerPhase::Uninitialized,
            state: None,
        })
    }

    pub fn settings(&self) -> &SamplerSettings {
        &self.settings
    }

    pub fn phase(&self) -> SamplerPhase {
        self.phase
    }

    /// The parameter guess, rescaled once the normalization was guessed.
    pub fn guess(&self) -> &[f64] {
        &self.guess
    }

    pub fn posterior(&self) -> &Posterior<M, P> {
        self.ensemble.func()
    }

    pub fn ensemble(&self) -> &EnsembleSampler<Posterior<M, P>> {
        &self.ensemble
    }

    pub fn into_ensemble(self) -> EnsembleSampler<Posterior<M, P>> {
        self.ensemble
    }

    /// Current walker positions, once the burn-in has started.
    pub fn positions(&self) -> Option<&[Box<[f64]>]> {
        self.state.as_ref().map(|state| state.positions.as_slice())
    }

    pub fn chain(&self) -> &Chain {
        self.ensemble.chain()
    }

    pub fn blobs(&self) -> &BlobHistory<Blob> {
        self.ensemble.blobs()
    }

    /// Rescale the normalization so that the model curve of the guess has the
    /// same trapezoid integral as the observed flux.
    fn guess_normalization(&mut self) -> Result<()> {
        let (_, blob) = self
            .ensemble
            .log_prob_fn(&self.guess)
            .context("Could not evaluate the model at the initial guess")?;
        let curve = blob
            .first()
            .and_then(|entry| entry.as_curve())
            .ok_or_else(|| SpecfitError::BlobSlot {
                slot: 0,
                reason: "the guess produced no model curve".to_string(),
            })?;
        let data = self.posterior().data();
        let data_integral = trapezoid(data.flux(), data.energy());
        let model_integral = trapezoid(&curve.flux, &curve.energy);
        let ratio = data_integral / model_integral;
        if !ratio.is_finite() || ratio <= 0. {
            tracing::warn!(
                data_integral,
                model_integral,
                "could not guess the normalization, keeping the initial value"
            );
            return Ok(());
        }
        self.guess[self.settings.normalization_index] *= ratio;
        tracing::debug!(
            index = self.settings.normalization_index,
            ratio,
            "rescaled normalization of the guess"
        );
        Ok(())
    }

    /// Initialize the walkers around the guess and run the burn-in.
    ///
    /// Returns the walker positions after burn-in. The burn-in draws are not
    /// kept.
    pub fn burn_in(&mut self) -> Result<&[Box<[f64]>]> {
        if self.phase != SamplerPhase::Uninitialized {
            bail!("Burn-in needs an uninitialized sampler, found {:?}", self.phase);
        }
        if self.settings.guess_normalization {
            self.guess_normalization()?;
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.settings.seed);
        rng.set_stream(1);
        let positions = sample_ball(
            &self.guess,
            self.settings.initial_spread,
            self.settings.num_walkers,
            &mut rng,
        );

        tracing::info!(
            "Burning in the walkers with {} steps...",
            self.settings.num_burn
        );
        self.phase = SamplerPhase::BurningIn;
        let state = self
            .ensemble
            .run_mcmc(positions, self.settings.num_burn)
            .context("Burn-in failed")?;
        self.ensemble.reset();
        self.phase = SamplerPhase::BurnedIn;
        Ok(&self.state.insert(state).positions)
    }

    /// Run the production steps from the burned-in positions.
    pub fn run(&mut self) -> Result<&[Box<[f64]>]> {
        if self.phase != SamplerPhase::BurnedIn {
            bail!("Production run needs a burned-in sampler, found {:?}", self.phase);
        }
        let Some(state) = self.state.take() else {
            bail!("Burned-in sampler has no walker positions");
        };
        tracing::info!(
            "Walker burn in finished, running {} steps...",
            self.settings.num_run
        );
        self.ensemble.reset();
        self.phase = SamplerPhase::Running;
        let state = self
            .ensemble
            .sample(state, self.settings.num_run)
            .context("Production run failed")?;
        self.phase = SamplerPhase::Complete;
        Ok(&self.state.insert(state).positions)
    }

    /// Confidence bands and MAP curve of the production run.
    pub fn fit_confidence(&self, settings: &SummarySettings) -> Result<FitConfidence> {
        self.require_complete()?;
        Ok(fit_confidence_bands(&self.ensemble, settings)?)
    }

    /// Posterior summary of every parameter of the production run.
    pub fn parameter_summaries<A: AutocorrTime + ?Sized>(
        &self,
        last_step: bool,
        autocorr: &A,
    ) -> Result<Vec<ParameterSummary>> {
        self.require_complete()?;
        Ok(summarize_parameters(self.chain(), last_step, autocorr)?)
    }

    fn require_complete(&self) -> Result<()> {
        if self.phase != SamplerPhase::Complete {
            bail!("Summaries need a completed run, found {:?}", self.phase);
        }
        Ok(())
    }
}

/// Draw walker positions from a normal ball around `center`.
///
/// The standard deviation of each coordinate is `relative_spread · |center|`.
pub fn sample_ball<R: Rng + ?Sized>(
    center: &[f64],
    relative_spread: f64,
    num_walkers: usize,
    rng: &mut R,
) -> Vec<Box<[f64]>> {
    (0..num_walkers)
        .map(|_| {
            center
                .iter()
                .map(|&c| {
                    let z: f64 = StandardNormal.sample(rng);
                    c + relative_spread * c.abs() * z
                })
                .collect()
        })
        .collect()
}

/// Create a sampler and run its burn-in.
pub fn get_sampler<M: SpectralModel, P: Prior>(
    settings: SamplerSettings,
    data: Option<Arc<ObservationSet>>,
    model: M,
    prior: P,
    guess: &[f64],
) -> Result<(SpectrumSampler<M, P>, Vec<Box<[f64]>>)> {
    let mut sampler = SpectrumSampler::new(settings, data, model, prior, guess)?;
    let positions = sampler.burn_in()?.to_vec();
    Ok((sampler, positions))
}

/// Create a sampler, run the burn-in and the production run.
pub fn run_sampler<M: SpectralModel, P: Prior>(
    settings: SamplerSettings,
    data: Option<Arc<ObservationSet>>,
    model: M,
    prior: P,
    guess: &[f64],
) -> Result<(SpectrumSampler<M, P>, Vec<Box<[f64]>>)> {
    let (mut sampler, _) = get_sampler(settings, data, model, prior, guess)?;
    let positions = sampler.run()?.to_vec();
    Ok((sampler, positions))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        data::test_data::small_set,
        model::{BlobEntry, CutoffPowerLaw, ModelCurve, ModelOutput},
        prior::FlatPrior,
    };

    fn quick_settings() -> SamplerSettings {
        SamplerSettings {
            num_walkers: 16,
            num_burn: 5,
            num_run: 10,
            num_threads: 2,
            seed: 3,
            ..Default::default()
        }
    }

    #[test]
    fn default_settings() {
        let settings = SamplerSettings::default();
        assert_eq!(settings.num_walkers, 600);
        assert_eq!(settings.num_burn, 30);
        assert_eq!(settings.num_run, 100);
        assert_eq!(settings.num_threads, 8);
        assert!(settings.guess_normalization);
        assert!(settings.validate(4).is_ok());
        assert!(settings.validate(1).is_err());
        assert!(settings.validate(301).is_err());
        let odd = SamplerSettings {
            num_walkers: 15,
            ..Default::default()
        };
        assert!(odd.validate(4).is_err());
    }

    #[test]
    fn missing_data_is_fatal() {
        let result = SpectrumSampler::new(
            quick_settings(),
            None,
            CutoffPowerLaw::default(),
            FlatPrior,
            &CutoffPowerLaw::DEFAULT_GUESS,
        );
        let err = result.err().unwrap();
        assert!(matches!(
            err.downcast_ref::<SpecfitError>(),
            Some(SpecfitError::MissingData)
        ));
    }

    #[test]
    fn guess_dimension_is_checked() {
        let result = SpectrumSampler::new(
            quick_settings(),
            Some(Arc::new(small_set())),
            CutoffPowerLaw::default(),
            FlatPrior,
            &[2., 1.],
        );
        assert!(result.is_err());
    }

    #[test]
    fn ball_stays_within_five_sigma() {
        let center = [2., -1e-11, 10., 0.];
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let ball = sample_ball(&center, 0.1, 600, &mut rng);
        assert_eq!(ball.len(), 600);
        for position in &ball {
            for (&x, &c) in position.iter().zip(&center) {
                assert!((x - c).abs() <= 5. * 0.1 * c.abs());
            }
        }
        // zero guess values stay fixed
        assert!(ball.iter().all(|p| p[3] == 0.));
    }

    #[test]
    fn phases_advance() -> Result<()> {
        let mut sampler = SpectrumSampler::new(
            quick_settings(),
            Some(Arc::new(small_set())),
            CutoffPowerLaw::default(),
            FlatPrior,
            &[2., 3., 100., 1.],
        )?;
        assert_eq!(sampler.phase(), SamplerPhase::Uninitialized);
        assert!(sampler.run().is_err());
        assert!(sampler.fit_confidence(&SummarySettings::default()).is_err());

        let positions = sampler.burn_in()?;
        assert_eq!(positions.len(), 16);
        assert_eq!(sampler.phase(), SamplerPhase::BurnedIn);
        assert!(sampler.chain().is_empty());
        assert!(sampler.burn_in().is_err());

        sampler.run()?;
        assert_eq!(sampler.phase(), SamplerPhase::Complete);
        assert_eq!(sampler.chain().num_steps(), 10);
        assert_eq!(sampler.blobs().num_steps(), 10);
        assert!(sampler.run().is_err());
        Ok(())
    }

    #[test]
    fn normalization_matches_data_integral() -> Result<()> {
        let data = Arc::new(small_set());
        let mut sampler = SpectrumSampler::new(
            quick_settings(),
            Some(data.clone()),
            CutoffPowerLaw::default(),
            FlatPrior,
            &CutoffPowerLaw::DEFAULT_GUESS,
        )?;
        sampler.burn_in()?;
        let guess = sampler.guess().to_vec();
        assert_eq!(guess[0], 2.);
        assert_eq!(guess[2], 10.);

        let (_, blob) = sampler.ensemble().log_prob_fn(&guess)?;
        let curve = blob[0].as_curve().unwrap();
        assert_relative_eq!(
            trapezoid(&curve.flux, &curve.energy),
            trapezoid(data.flux(), data.energy()),
            max_relative = 1e-10
        );
        Ok(())
    }

    #[test]
    fn all_walkers_non_finite() {
        let model = |_: &[f64], data: &ObservationSet| -> ModelOutput {
            vec![f64::NAN; data.len()].into()
        };
        let settings = SamplerSettings {
            guess_normalization: false,
            ..quick_settings()
        };
        let err = get_sampler(
            settings,
            Some(Arc::new(small_set())),
            model,
            FlatPrior,
            &[1., 2.],
        )
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<SpecfitError>(),
            Some(SpecfitError::AllWalkersNonFinite { num_walkers: 16 })
        ));
    }

    #[test]
    fn ragged_model_curve_is_an_error() {
        let model = |params: &[f64], data: &ObservationSet| -> ModelOutput {
            let curve = ModelCurve::new(vec![1., 2., 3.], vec![params[0]; 2]);
            ModelOutput::with_blob(vec![params[0]; data.len()], vec![BlobEntry::Curve(curve)])
        };
        for guess_normalization in [true, false] {
            let settings = SamplerSettings {
                guess_normalization,
                ..quick_settings()
            };
            let err = run_sampler(
                settings,
                Some(Arc::new(small_set())),
                model,
                FlatPrior,
                &[1., 2.],
            )
            .err()
            .unwrap();
            assert!(matches!(
                err.downcast_ref::<SpecfitError>(),
                Some(SpecfitError::LogpFailure(_))
            ));
        }
    }
}
