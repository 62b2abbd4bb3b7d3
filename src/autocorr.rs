//! Integrated autocorrelation time of walker traces.
//!
//! Estimating the autocorrelation time is optional: an estimator first
//! reports whether it can say anything about a chain, and summaries fall back
//! to `NaN` when it can not.

use thiserror::Error;

use crate::chain::Chain;

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum AutocorrError {
    #[error("Chain of {steps} steps is too short for an autocorrelation time of {tau}")]
    TooShort { steps: usize, tau: f64 },
    #[error("All walker traces of parameter {param} are constant")]
    ZeroVariance { param: usize },
    #[error("Autocorrelation estimation is unavailable: {0}")]
    Unavailable(String),
}

/// Optional capability: integrated autocorrelation time of a parameter.
pub trait AutocorrTime: Send + Sync {
    fn availability(&self, chain: &Chain) -> Availability;

    fn integrated_time(&self, chain: &Chain, param: usize) -> Result<f64, AutocorrError>;
}

/// Estimator averaging the autocorrelation function over walkers and
/// truncating the sum with Sokal's automatic window: the smallest lag `M`
/// with `M >= c · τ(M)`. The window must be found within the first half of
/// the chain, and the chain must be at least `tolerance · τ` steps long.
#[derive(Debug, Clone, Copy)]
pub struct SokalAutocorr {
    pub window_factor: f64,
    /// Minimum chain length in units of the estimated autocorrelation time.
    pub tolerance: f64,
    pub min_steps: usize,
}

impl Default for SokalAutocorr {
    fn default() -> Self {
        Self {
            window_factor: 5.,
            tolerance: 50.,
            min_steps: 20,
        }
    }
}

impl AutocorrTime for SokalAutocorr {
    fn availability(&self, chain: &Chain) -> Availability {
        if chain.num_steps() < self.min_steps {
            return Availability::Unavailable {
                reason: format!(
                    "chain has {} steps, at least {} are needed",
                    chain.num_steps(),
                    self.min_steps
                ),
            };
        }
        Availability::Available
    }

    fn integrated_time(&self, chain: &Chain, param: usize) -> Result<f64, AutocorrError> {
        let steps = chain.num_steps();
        let traces: Vec<(Vec<f64>, f64)> = (0..chain.num_walkers())
            .filter_map(|walker| centered(chain.walker_trace(walker, param)))
            .collect();
        if traces.is_empty() {
            return Err(AutocorrError::ZeroVariance { param });
        }

        let mut tau = 1f64;
        // autocorrelation estimates beyond half the chain length are noise
        for lag in 1..steps / 2 {
            let rho = traces
                .iter()
                .map(|(trace, var)| {
                    let cov = trace
                        .iter()
                        .zip(&trace[lag..])
                        .map(|(a, b)| a * b)
                        .sum::<f64>()
                        / steps as f64;
                    cov / var
                })
                .sum::<f64>()
                / traces.len() as f64;
            tau += 2. * rho;
            if lag as f64 >= self.window_factor * tau {
                if (steps as f64) < self.tolerance * tau {
                    return Err(AutocorrError::TooShort { steps, tau });
                }
                return Ok(tau);
            }
        }
        Err(AutocorrError::TooShort { steps, tau })
    }
}

/// Subtract the mean, return `None` for a constant trace.
fn centered(mut trace: Vec<f64>) -> Option<(Vec<f64>, f64)> {
    let n = trace.len() as f64;
    let mean = trace.iter().sum::<f64>() / n;
    trace.iter_mut().for_each(|x| *x -= mean);
    let var = trace.iter().map(|x| x * x).sum::<f64>() / n;
    if var > 0. && var.is_finite() {
        Some((trace, var))
    } else {
        None
    }
}

/// Estimator that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAutocorr;

impl AutocorrTime for NoAutocorr {
    fn availability(&self, _chain: &Chain) -> Availability {
        Availability::Unavailable {
            reason: "autocorrelation estimation is disabled".to_string(),
        }
    }

    fn integrated_time(&self, _chain: &Chain, _param: usize) -> Result<f64, AutocorrError> {
        Err(AutocorrError::Unavailable(
            "autocorrelation estimation is disabled".to_string(),
        ))
    }
}

/// Autocorrelation time of every parameter, `NaN` where it can not be
/// estimated.
pub fn autocorr_times<A: AutocorrTime + ?Sized>(estimator: &A, chain: &Chain) -> Vec<f64> {
    if let Availability::Unavailable { reason } = estimator.availability(chain) {
        tracing::debug!(%reason, "skipping autocorrelation times");
        return vec![f64::NAN; chain.dim()];
    }
    (0..chain.dim())
        .map(|param| match estimator.integrated_time(chain, param) {
            Ok(tau) => tau,
            Err(err) => {
                tracing::warn!(param, %err, "could not estimate autocorrelation time");
                f64::NAN
            }
        })
        .collect()
}
