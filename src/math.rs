use statrs::function::erf::erfc;

/// Integrate `y(x)` with the trapezoidal rule.
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    assert!(x.len() == y.len());
    x.windows(2)
        .zip(y.windows(2))
        .map(|(x, y)| 0.5 * (x[1] - x[0]) * (y[0] + y[1]))
        .sum()
}

/// Standard normal cumulative distribution function.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    let mean = mean(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

pub(crate) fn sorted(values: &[f64]) -> Vec<f64> {
    let mut values = values.to_vec();
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    values
}

/// Median of sorted values, averaging the two central values for even lengths.
pub fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Index of the nearest-rank order statistic `floor(fraction · n)`.
pub(crate) fn rank_index(fraction: f64, n: usize) -> usize {
    ((fraction * n as f64) as usize).min(n - 1)
}

/// Order statistic at `floor(fraction · n)` of sorted values, no interpolation.
pub fn nearest_rank(sorted: &[f64], fraction: f64) -> f64 {
    sorted[rank_index(fraction, sorted.len())]
}

/// Gaussian kernel density estimate with Scott's bandwidth.
pub struct GaussianKde<'a> {
    samples: &'a [f64],
    bandwidth: f64,
}

impl<'a> GaussianKde<'a> {
    pub fn new(samples: &'a [f64]) -> Self {
        let n = samples.len() as f64;
        let mean = mean(samples);
        let var = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.).max(1.);
        let bandwidth = n.powf(-0.2) * var.sqrt();
        GaussianKde { samples, bandwidth }
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn density(&self, x: f64) -> f64 {
        let h = self.bandwidth;
        let norm = 1. / (self.samples.len() as f64 * h * (2. * std::f64::consts::PI).sqrt());
        norm * self
            .samples
            .iter()
            .map(|s| (-0.5 * ((x - s) / h).powi(2)).exp())
            .sum::<f64>()
    }

    /// Location of the largest density on an even grid over `[lo, hi]`.
    pub fn peak(&self, lo: f64, hi: f64, points: usize) -> f64 {
        if !(self.bandwidth > 0.) || points < 2 {
            return 0.5 * (lo + hi);
        }
        let step = (hi - lo) / (points - 1) as f64;
        (0..points)
            .map(|i| lo + step * i as f64)
            .map(|x| (x, self.density(x)))
            .fold((lo, f64::NEG_INFINITY), |best, (x, d)| {
                if d > best.1 {
                    (x, d)
                } else {
                    best
                }
            })
            .0
    }
}

/// Linear interpolation of `y(x)` for increasing `x`. `None` outside the grid.
pub fn interpolate(x: &[f64], y: &[f64], at: f64) -> Option<f64> {
    let first = *x.first()?;
    let last = *x.last()?;
    if !(first..=last).contains(&at) {
        return None;
    }
    let idx = x.partition_point(|&v| v < at);
    if idx == 0 {
        return Some(y[0]);
    }
    let (x0, x1) = (x[idx - 1], x[idx]);
    let (y0, y1) = (y[idx - 1], y[idx]);
    Some(y0 + (y1 - y0) * (at - x0) / (x1 - x0))
}
