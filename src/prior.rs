//! Log-prior terms.
//!
//! Only differences of the log probability enter the acceptance rule of the
//! sampler, so priors need not be normalized. A prior of `-inf` rules a
//! parameter vector out.

/// Maps a parameter vector to its log-prior contribution.
pub trait Prior: Send + Sync {
    fn log_prior(&self, params: &[f64]) -> f64;
}

impl<F> Prior for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn log_prior(&self, params: &[f64]) -> f64 {
        self(params)
    }
}

/// Improper flat prior.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatPrior;

impl Prior for FlatPrior {
    fn log_prior(&self, _params: &[f64]) -> f64 {
        0.
    }
}

/// `0` inside `[min, max]` (inclusive), `-inf` outside.
pub fn uniform_prior(value: f64, min: f64, max: f64) -> f64 {
    if (min..=max).contains(&value) {
        0.
    } else {
        f64::NEG_INFINITY
    }
}

/// Quadratic penalty around `mean` plus a constant offset.
pub fn normal_prior(value: f64, mean: f64, sigma: f64) -> f64 {
    let diff = value - mean;
    -0.5 * (2. * std::f64::consts::PI * sigma * sigma).ln() - 0.5 * diff * diff / (sigma * sigma)
}

/// Prior on a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterPrior {
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, sigma: f64 },
}

impl ParameterPrior {
    pub fn log_prior(&self, value: f64) -> f64 {
        match *self {
            ParameterPrior::Uniform { min, max } => uniform_prior(value, min, max),
            ParameterPrior::Normal { mean, sigma } => normal_prior(value, mean, sigma),
        }
    }
}

/// Sum of independent per-parameter priors. Parameters without an entry
/// get a flat prior.
#[derive(Debug, Clone, Default)]
pub struct ParameterPriors {
    priors: Vec<(usize, ParameterPrior)>,
}

impl ParameterPriors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, index: usize, prior: ParameterPrior) -> Self {
        self.priors.push((index, prior));
        self
    }

    pub fn uniform(self, index: usize, min: f64, max: f64) -> Self {
        self.with(index, ParameterPrior::Uniform { min, max })
    }

    pub fn normal(self, index: usize, mean: f64, sigma: f64) -> Self {
        self.with(index, ParameterPrior::Normal { mean, sigma })
    }
}

impl Prior for ParameterPriors {
    fn log_prior(&self, params: &[f64]) -> f64 {
        let mut total = 0f64;
        for &(index, prior) in self.priors.iter() {
            let Some(&value) = params.get(index) else {
                return f64::NEG_INFINITY;
            };
            total += prior.log_prior(value);
            if total == f64::NEG_INFINITY {
                break;
            }
        }
        total
    }
}
