use std::{fmt::Write, sync::Arc};

use thiserror::Error;

use crate::{
    data::ObservationSet,
    ensemble::LogProbFunc,
    error::{LogpError, SpecfitError},
    likelihood::{log_likelihood, LikelihoodSettings},
    model::{Blob, BlobEntry, ModelCurve, SpectralModel},
    prior::Prior,
};

/// Target of the progress records emitted for every posterior evaluation.
pub const PROGRESS_TARGET: &str = "specfit::progress";

#[derive(Error, Debug)]
pub enum PosteriorError<E> {
    #[error("Model evaluation failed")]
    Model(#[source] E),
    #[error("Model output does not match the observations")]
    Likelihood(#[source] SpecfitError),
    #[error("Model curve in blob slot {slot} has {energy} energies and {flux} flux values")]
    CurveShape {
        slot: usize,
        energy: usize,
        flux: usize,
    },
}

impl<E: LogpError + 'static> LogpError for PosteriorError<E> {
    fn is_recoverable(&self) -> bool {
        match self {
            PosteriorError::Model(err) => err.is_recoverable(),
            PosteriorError::Likelihood(_) | PosteriorError::CurveShape { .. } => false,
        }
    }
}

/// Log posterior of a spectral model given an observation set.
///
/// Combines model, prior and likelihood into the single function the sampler
/// draws from. The observation set is shared read-only, so one posterior can
/// be evaluated from many worker threads at once.
#[derive(Debug, Clone)]
pub struct Posterior<M, P> {
    data: Arc<ObservationSet>,
    model: M,
    prior: P,
    likelihood: LikelihoodSettings,
}

impl<M: SpectralModel, P: Prior> Posterior<M, P> {
    pub fn new(data: Arc<ObservationSet>, model: M, prior: P) -> Self {
        Posterior {
            data,
            model,
            prior,
            likelihood: LikelihoodSettings::default(),
        }
    }

    pub fn with_likelihood_settings(mut self, likelihood: LikelihoodSettings) -> Self {
        self.likelihood = likelihood;
        self
    }

    pub fn data(&self) -> &ObservationSet {
        &self.data
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn prior(&self) -> &P {
        &self.prior
    }

    /// Evaluate the log posterior and the blob for one parameter vector.
    ///
    /// Emits one progress record per call.
    pub fn evaluate(&self, params: &[f64]) -> Result<(f64, Blob), PosteriorError<M::Err>> {
        let output = self
            .model
            .evaluate(params, &self.data)
            .map_err(PosteriorError::Model)?;
        let log_like = log_likelihood(&output.flux, &self.data, &self.likelihood)
            .map_err(PosteriorError::Likelihood)?;
        let log_prior = self.prior.log_prior(params);
        let log_prob = log_like + log_prior;

        let blob = match output.extra {
            Some(extra) => {
                check_curves(&extra)?;
                extra
            }
            None => vec![BlobEntry::Curve(ModelCurve::new(
                self.data.energy().to_vec(),
                output.flux,
            ))],
        };

        tracing::info!(target: PROGRESS_TARGET, "{}", format_progress_line(params, log_prob));

        Ok((log_prob, blob))
    }
}

fn check_curves<E>(blob: &Blob) -> Result<(), PosteriorError<E>> {
    for (slot, entry) in blob.iter().enumerate() {
        if let BlobEntry::Curve(curve) = entry {
            if curve.energy.len() != curve.flux.len() {
                return Err(PosteriorError::CurveShape {
                    slot,
                    energy: curve.energy.len(),
                    flux: curve.flux.len(),
                });
            }
        }
    }
    Ok(())
}

impl<M: SpectralModel, P: Prior> LogProbFunc for Posterior<M, P> {
    type Blob = Blob;
    type Err = PosteriorError<M::Err>;

    fn log_prob(&self, position: &[f64]) -> Result<(f64, Blob), Self::Err> {
        self.evaluate(position)
    }
}

/// Fixed-width progress line: every parameter, then the log probability.
pub fn format_progress_line(params: &[f64], log_prob: f64) -> String {
    let mut line = String::with_capacity(10 * params.len() + 14);
    for param in params {
        let _ = write!(line, "{:>10.2e} ", param);
    }
    let _ = write!(line, "{:>13.5}", log_prob);
    line
}
