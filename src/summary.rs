//! Posterior summaries of a finished run.
//!
//! Confidence bands of the model curve are read from the stored blobs, so the
//! model is only evaluated once more, at the MAP parameters. Quantiles are
//! nearest-rank order statistics `sorted[floor(fraction · n)]` without
//! interpolation.

use std::fmt;

use itertools::Itertools;

use crate::{
    autocorr::{autocorr_times, AutocorrTime},
    chain::Chain,
    ensemble::{EnsembleSampler, LogProbFunc},
    error::{Result, SpecfitError},
    math::{mean, median, nearest_rank, normal_cdf, rank_index, sorted, std_dev, GaussianKde},
    model::{Blob, ModelCurve},
};

/// Quantile fractions reported for every parameter.
pub const SUMMARY_QUANTILES: [f64; 5] = [0.01, 0.16, 0.5, 0.84, 0.99];

const KDE_GRID_POINTS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct SummarySettings {
    /// Band widths in units of a normal standard deviation.
    pub confidence_levels: Vec<f64>,
    /// Blob slot that holds the model curve.
    pub model_slot: usize,
    /// Use only the last-step ensemble instead of every stored step.
    pub last_step: bool,
}

impl Default for SummarySettings {
    fn default() -> Self {
        Self {
            confidence_levels: vec![3., 1.],
            model_slot: 0,
            last_step: true,
        }
    }
}

/// Pointwise band of the model curve for one confidence level.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceBand {
    pub sigma: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitConfidence {
    /// Energy grid of the model curves.
    pub energy: Vec<f64>,
    pub bands: Vec<ConfidenceBand>,
    /// Per-parameter mean of the stored draws.
    pub map_params: Vec<f64>,
    pub map_std: Vec<f64>,
    /// Model curve at `map_params`.
    pub map_curve: Vec<f64>,
}

fn model_curve(blob: &Blob, slot: usize) -> Result<&ModelCurve> {
    let entry = blob.get(slot).ok_or_else(|| SpecfitError::BlobSlot {
        slot,
        reason: format!("blob has {} entries", blob.len()),
    })?;
    entry.as_curve().ok_or_else(|| SpecfitError::BlobSlot {
        slot,
        reason: "entry is not a model curve".to_string(),
    })
}

/// Pointwise confidence bands over a set of model curves on a common grid.
///
/// For a band of `sigma` the lower curve at every energy is the order
/// statistic at `Φ(-sigma)` and the upper curve the one at `Φ(sigma)`.
pub fn confidence_bands(curves: &[&[f64]], sigmas: &[f64]) -> Vec<ConfidenceBand> {
    let Some(first) = curves.first() else {
        return Vec::new();
    };
    let n = curves.len();
    let ranks = sigmas
        .iter()
        .map(|&sigma| (rank_index(normal_cdf(-sigma), n), rank_index(normal_cdf(sigma), n)))
        .collect_vec();
    let mut bands = sigmas
        .iter()
        .map(|&sigma| ConfidenceBand {
            sigma,
            lower: Vec::with_capacity(first.len()),
            upper: Vec::with_capacity(first.len()),
        })
        .collect_vec();

    for point in 0..first.len() {
        let column = sorted(&curves.iter().map(|curve| curve[point]).collect_vec());
        for (band, &(lo, hi)) in bands.iter_mut().zip(&ranks) {
            band.lower.push(column[lo]);
            band.upper.push(column[hi]);
        }
    }
    bands
}

/// Confidence bands of the model curve and the MAP estimate of a run.
///
/// The MAP parameters are the per-parameter means of all stored draws. They
/// are evaluated once more to obtain the MAP curve.
pub fn fit_confidence_bands<F: LogProbFunc<Blob = Blob>>(
    sampler: &EnsembleSampler<F>,
    settings: &SummarySettings,
) -> Result<FitConfidence> {
    let blobs = sampler.blobs();
    let Some(last_step) = blobs.last_step() else {
        return Err(SpecfitError::EmptyChain);
    };
    let slot = settings.model_slot;
    let steps: Vec<&[Blob]> = if settings.last_step {
        vec![last_step]
    } else {
        blobs.iter().collect()
    };

    // Walkers that never left a rejected start carry an empty blob.
    let curves = steps
        .iter()
        .flat_map(|step| step.iter())
        .filter(|blob| !blob.is_empty())
        .map(|blob| model_curve(blob, slot))
        .collect::<Result<Vec<_>>>()?;
    let Some(grid) = curves.first() else {
        return Err(SpecfitError::EmptyChain);
    };
    let points = grid.energy.len();
    if let Some(other) = curves
        .iter()
        .find(|curve| curve.energy.len() != points || curve.flux.len() != points)
    {
        return Err(SpecfitError::BlobSlot {
            slot,
            reason: format!(
                "model curves on a grid of {} energies have {} energies and {} flux values",
                points,
                other.energy.len(),
                other.flux.len()
            ),
        });
    }
    let fluxes = curves.iter().map(|curve| curve.flux.as_slice()).collect_vec();
    let bands = confidence_bands(&fluxes, &settings.confidence_levels);

    let chain = sampler.chain();
    let (map_params, map_std): (Vec<f64>, Vec<f64>) = (0..chain.dim())
        .map(|param| {
            let values = chain.parameter_values(param);
            (mean(&values), std_dev(&values))
        })
        .unzip();
    tracing::info!("MAP pars (mean, std):");
    for (param, (m, s)) in map_params.iter().zip(&map_std).enumerate() {
        tracing::info!("  par{}: {:.3e} +/- {:.3e}", param, m, s);
    }

    let (_, map_blob) = sampler.log_prob_fn(&map_params)?;
    let map_curve = model_curve(&map_blob, slot)?.flux.clone();

    Ok(FitConfidence {
        energy: grid.energy.clone(),
        bands,
        map_params,
        map_std,
        map_curve,
    })
}

/// Marginal posterior summary of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSummary {
    pub param: usize,
    pub num_walkers: usize,
    pub num_steps: usize,
    /// Whether only the last-step ensemble was used.
    pub last_step: bool,
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    /// Peak of a kernel density estimate within `mean ± std`.
    pub mode: f64,
    /// `(fraction, value)` for every entry of [`SUMMARY_QUANTILES`].
    pub quantiles: Vec<(f64, f64)>,
    /// Autocorrelation time of every parameter, `NaN` if unknown.
    pub autocorr_times: Vec<f64>,
}

impl ParameterSummary {
    pub fn new<A: AutocorrTime + ?Sized>(
        chain: &Chain,
        param: usize,
        last_step: bool,
        autocorr: &A,
    ) -> Result<Self> {
        let times = autocorr_times(autocorr, chain);
        Self::with_autocorr_times(chain, param, last_step, times)
    }

    fn with_autocorr_times(
        chain: &Chain,
        param: usize,
        last_step: bool,
        autocorr_times: Vec<f64>,
    ) -> Result<Self> {
        if chain.is_empty() {
            return Err(SpecfitError::EmptyChain);
        }
        if param >= chain.dim() {
            return Err(SpecfitError::invalid_settings(format!(
                "parameter {} is out of bounds for {} parameters",
                param,
                chain.dim()
            )));
        }
        let values = if last_step {
            chain.last_step_values(param)
        } else {
            chain.parameter_values(param)
        };
        let mean = mean(&values);
        let std = std_dev(&values);
        let dist = sorted(&values);
        let mode = GaussianKde::new(&dist).peak(mean - std, mean + std, KDE_GRID_POINTS);
        let quantiles = SUMMARY_QUANTILES
            .iter()
            .map(|&q| (q, nearest_rank(&dist, q)))
            .collect();

        Ok(ParameterSummary {
            param,
            num_walkers: chain.num_walkers(),
            num_steps: chain.num_steps(),
            last_step,
            mean,
            median: median(&dist),
            std,
            mode,
            quantiles,
            autocorr_times,
        })
    }

    pub fn quantile(&self, fraction: f64) -> Option<f64> {
        self.quantiles
            .iter()
            .find(|(q, _)| *q == fraction)
            .map(|&(_, value)| value)
    }

    /// The 16% to 84% interval.
    pub fn interval_68(&self) -> (f64, f64) {
        (self.quantiles[1].1, self.quantiles[3].1)
    }

    pub fn mean_std_interval(&self) -> (f64, f64) {
        (self.mean - self.std, self.mean + self.std)
    }

    /// The 1% to 99% interval.
    pub fn interval_99(&self) -> (f64, f64) {
        (self.quantiles[0].1, self.quantiles[4].1)
    }
}

impl fmt::Display for ParameterSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if self.last_step {
            "last step ensemble"
        } else {
            "all steps"
        };
        writeln!(f, "Walkers: {}", self.num_walkers)?;
        writeln!(f, "Steps in chain: {}", self.num_steps)?;
        writeln!(
            f,
            "Autocorrelation times (in nsteps): {}",
            self.autocorr_times.iter().map(|t| format!("{:.1}", t)).join(" ")
        )?;
        writeln!(f)?;
        writeln!(f, "Distribution properties for the {}:", source)?;
        writeln!(f, "  - mode: {:.3e}", self.mode)?;
        writeln!(f, "  - mean: {:.3e}", self.mean)?;
        writeln!(f, "  - median: {:.3e}", self.median)?;
        writeln!(f, "  - std: {:.3e}", self.std)?;
        let (lo, hi) = self.mean_std_interval();
        writeln!(f, "  - mean +/- std: ({:.3e}, {:.3e})", lo, hi)?;
        let (lo, hi) = self.interval_68();
        writeln!(f, "  - 68% CI: ({:.3e}, {:.3e})", lo, hi)?;
        let (lo, hi) = self.interval_99();
        write!(f, "  - 99% CI: ({:.3e}, {:.3e})", lo, hi)
    }
}

/// Summaries of every parameter, sharing one set of autocorrelation times.
pub fn summarize_parameters<A: AutocorrTime + ?Sized>(
    chain: &Chain,
    last_step: bool,
    autocorr: &A,
) -> Result<Vec<ParameterSummary>> {
    let times = autocorr_times(autocorr, chain);
    (0..chain.dim())
        .map(|param| ParameterSummary::with_autocorr_times(chain, param, last_step, times.clone()))
        .collect()
}
