//! Fit spectral models to flux points with an affine-invariant ensemble
//! sampler.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use specfit_rs::{
//!     run_sampler, CutoffPowerLaw, FlatPrior, ObservationSet, SamplerSettings, SummarySettings,
//! };
//!
//! # fn main() -> anyhow::Result<()> {
//! let data = ObservationSet::with_symmetric_errors(
//!     vec![1., 2., 4., 8.],
//!     vec![(0.1, 0.1); 4],
//!     vec![1e-11, 3e-12, 8e-13, 1e-13],
//!     vec![1e-12, 3e-13, 8e-14, 1e-14],
//!     vec![false; 4],
//!     0.95,
//! )?;
//! let (sampler, _) = run_sampler(
//!     SamplerSettings::default(),
//!     Some(Arc::new(data)),
//!     CutoffPowerLaw::default(),
//!     FlatPrior,
//!     &CutoffPowerLaw::DEFAULT_GUESS,
//! )?;
//! let fit = sampler.fit_confidence(&SummarySettings::default())?;
//! println!("{:?}", fit.map_params);
//! # Ok(())
//! # }
//! ```

pub(crate) mod autocorr;
pub(crate) mod chain;
pub(crate) mod data;
pub(crate) mod ensemble;
pub(crate) mod error;
pub(crate) mod likelihood;
pub(crate) mod math;
pub(crate) mod model;
pub(crate) mod posterior;
pub(crate) mod prior;
pub(crate) mod report;
pub(crate) mod sampler;
pub(crate) mod summary;

pub use autocorr::{
    autocorr_times, AutocorrError, AutocorrTime, Availability, NoAutocorr, SokalAutocorr,
};
pub use chain::{BlobHistory, Chain};
pub use data::{generate_energy_edges, FluxError, ObservationSet};
pub use ensemble::{EnsembleSampler, EnsembleSettings, EnsembleState, LogProbFunc};
pub use error::{LogpError, Result, SpecfitError};
pub use likelihood::{log_likelihood, ErrorConvention, LikelihoodSettings};
pub use math::{normal_cdf, trapezoid};
pub use model::{
    Blob, BlobEntry, CutoffPowerLaw, CutoffPowerLawError, ModelCurve, ModelOutput, SpectralModel,
};
pub use posterior::{format_progress_line, Posterior, PosteriorError, PROGRESS_TARGET};
pub use prior::{normal_prior, uniform_prior, FlatPrior, ParameterPrior, ParameterPriors, Prior};
pub use report::{fit_residuals, residual_spread, ArtifactNames, Residual};
pub use sampler::{
    get_sampler, run_sampler, sample_ball, SamplerPhase, SamplerSettings, SpectrumSampler,
};
pub use summary::{
    confidence_bands, fit_confidence_bands, summarize_parameters, ConfidenceBand, FitConfidence,
    ParameterSummary, SummarySettings, SUMMARY_QUANTILES,
};
