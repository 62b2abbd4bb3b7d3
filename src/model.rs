//! Spectral models that map a parameter vector to predicted flux.
//!
//! A model returns the flux at the observed energies and may attach extra
//! payload ("blob" entries) that is kept alongside every draw, so that model
//! curves can be recovered later without evaluating the model again.

use thiserror::Error;

use crate::{data::ObservationSet, error::LogpError};

/// A model flux curve sampled on an energy grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCurve {
    pub energy: Vec<f64>,
    pub flux: Vec<f64>,
}

impl ModelCurve {
    pub fn new(energy: Vec<f64>, flux: Vec<f64>) -> Self {
        ModelCurve { energy, flux }
    }

    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

/// One slot of the auxiliary payload stored with each evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobEntry {
    Curve(ModelCurve),
    Values(Vec<f64>),
    Scalar(f64),
}

impl BlobEntry {
    pub fn as_curve(&self) -> Option<&ModelCurve> {
        match self {
            BlobEntry::Curve(curve) => Some(curve),
            _ => None,
        }
    }
}

/// Auxiliary payload of one log probability evaluation.
pub type Blob = Vec<BlobEntry>;

/// Result of a model evaluation.
///
/// `flux` is compared against the observations. If `extra` is `None` the
/// posterior stores the curve `(data energies, flux)` as the only blob slot,
/// otherwise the extra entries are stored unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub flux: Vec<f64>,
    pub extra: Option<Blob>,
}

impl ModelOutput {
    pub fn with_blob(flux: Vec<f64>, extra: Blob) -> Self {
        ModelOutput {
            flux,
            extra: Some(extra),
        }
    }
}

impl From<Vec<f64>> for ModelOutput {
    fn from(flux: Vec<f64>) -> Self {
        ModelOutput { flux, extra: None }
    }
}

/// Maps a parameter vector and the observations to predicted flux.
///
/// Implementations must be deterministic for fixed inputs and are shared
/// between worker threads.
pub trait SpectralModel: Send + Sync {
    type Err: LogpError + Send + Sync + 'static;

    fn evaluate(&self, params: &[f64], data: &ObservationSet) -> Result<ModelOutput, Self::Err>;

    /// The number of parameters the model expects, if it is fixed.
    fn num_params(&self) -> Option<usize> {
        None
    }
}

impl<F> SpectralModel for F
where
    F: Fn(&[f64], &ObservationSet) -> ModelOutput + Send + Sync,
{
    type Err = std::convert::Infallible;

    fn evaluate(&self, params: &[f64], data: &ObservationSet) -> Result<ModelOutput, Self::Err> {
        Ok(self(params, data))
    }
}

#[derive(Error, Debug)]
pub enum CutoffPowerLawError {
    #[error("Cutoff power law takes 4 parameters, got {0}")]
    Dimension(usize),
}

impl LogpError for CutoffPowerLawError {
    fn is_recoverable(&self) -> bool {
        false
    }
}

/// Power law with an exponential cutoff.
///
/// `N · (E/E0)^(-Γ) · exp(-(E/Ecut)^β)` with parameters
/// `[Γ, N, Ecut, β]`. `E0` defaults to the geometric mean of the observed
/// energies.
#[derive(Debug, Clone, Copy, Default)]
pub struct CutoffPowerLaw {
    pub reference_energy: Option<f64>,
}

impl CutoffPowerLaw {
    /// Spectral index, normalization, cutoff energy, cutoff sharpness.
    pub const DEFAULT_GUESS: [f64; 4] = [2., 1e-11, 10., 1.];

    pub fn with_reference_energy(reference_energy: f64) -> Self {
        CutoffPowerLaw {
            reference_energy: Some(reference_energy),
        }
    }

    pub fn flux_at(params: &[f64], reference_energy: f64, energy: f64) -> f64 {
        let (index, norm, cutoff, beta) = (params[0], params[1], params[2], params[3]);
        let x = energy / reference_energy;
        norm * x.powf(-index) * (-(energy / cutoff).powf(beta)).exp()
    }
}

impl SpectralModel for CutoffPowerLaw {
    type Err = CutoffPowerLawError;

    fn evaluate(&self, params: &[f64], data: &ObservationSet) -> Result<ModelOutput, Self::Err> {
        if params.len() != 4 {
            return Err(CutoffPowerLawError::Dimension(params.len()));
        }
        let e0 = self
            .reference_energy
            .unwrap_or_else(|| geometric_mean(data.energy()));
        let flux = data
            .energy()
            .iter()
            .map(|&energy| Self::flux_at(params, e0, energy))
            .collect::<Vec<_>>();
        Ok(flux.into())
    }

    fn num_params(&self) -> Option<usize> {
        Some(4)
    }
}

pub(crate) fn geometric_mean(values: &[f64]) -> f64 {
    let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
    (log_sum / values.len() as f64).exp()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::data::test_data::small_set;

    #[test]
    fn powerlaw_at_reference_energy() {
        let data = small_set();
        let model = CutoffPowerLaw::default();
        let e0 = geometric_mean(data.energy());
        assert_relative_eq!(e0, 4.);

        let out = model.evaluate(&[2., 3., 1e12, 1.], &data).unwrap();
        assert!(out.extra.is_none());
        assert_relative_eq!(out.flux[2], 3., max_relative = 1e-9);
        assert_relative_eq!(out.flux[0], 3. * 16., max_relative = 1e-9);
    }

    #[test]
    fn cutoff_suppresses_high_energies() {
        let data = small_set();
        let model = CutoffPowerLaw::with_reference_energy(1.);
        let out = model.evaluate(&[0., 1., 4., 1.], &data).unwrap();
        assert_relative_eq!(out.flux[0], (-0.25f64).exp());
        assert_relative_eq!(out.flux[4], (-4f64).exp());
    }

    #[test]
    fn wrong_dimension() {
        let data = small_set();
        let err = CutoffPowerLaw::default()
            .evaluate(&[1., 2.], &data)
            .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn closures_are_models() {
        let data = small_set();
        let constant = |params: &[f64], data: &ObservationSet| -> ModelOutput {
            vec![params[0]; data.len()].into()
        };
        let out = constant.evaluate(&[2.5], &data).unwrap();
        assert_eq!(out.flux, vec![2.5; 5]);
    }
}
