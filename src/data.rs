//! Observed spectral flux points.
//!
//! An [`ObservationSet`] stores index-aligned columns of energy, bin
//! half-widths, flux, flux uncertainty and upper-limit flags, plus the
//! confidence level shared by all upper limits. All constructors validate
//! the shape of the columns and fail fast instead of guessing how a ragged
//! error array was meant to be read.

use crate::error::{Result, SpecfitError};

/// Flux uncertainty of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FluxError {
    Symmetric(f64),
    Asymmetric { lo: f64, hi: f64 },
}

impl FluxError {
    /// Uncertainty that applies below the measured flux.
    pub fn lower(&self) -> f64 {
        match *self {
            FluxError::Symmetric(err) => err,
            FluxError::Asymmetric { lo, .. } => lo,
        }
    }

    /// Uncertainty that applies above the measured flux.
    pub fn upper(&self) -> f64 {
        match *self {
            FluxError::Symmetric(err) => err,
            FluxError::Asymmetric { hi, .. } => hi,
        }
    }

    pub fn mean(&self) -> f64 {
        0.5 * (self.lower() + self.upper())
    }

    fn is_valid(&self) -> bool {
        let valid = |err: f64| err.is_finite() && err > 0.;
        valid(self.lower()) & valid(self.upper())
    }
}

#[derive(Debug, Clone)]
pub struct ObservationSet {
    energy: Vec<f64>,
    energy_width: Vec<(f64, f64)>,
    flux: Vec<f64>,
    flux_error: Vec<FluxError>,
    upper_limit: Vec<bool>,
    confidence_level: f64,
}

impl ObservationSet {
    /// Create an observation set from per-point columns.
    ///
    /// `energy_width` holds the (lower, upper) half-widths of each energy bin.
    /// The flux uncertainty of upper-limit points is never used and is not
    /// validated.
    pub fn new(
        energy: Vec<f64>,
        energy_width: Vec<(f64, f64)>,
        flux: Vec<f64>,
        flux_error: Vec<FluxError>,
        upper_limit: Vec<bool>,
        confidence_level: f64,
    ) -> Result<Self> {
        let data = ObservationSet {
            energy,
            energy_width,
            flux,
            flux_error,
            upper_limit,
            confidence_level,
        };
        data.validate()?;
        Ok(data)
    }

    pub fn with_symmetric_errors(
        energy: Vec<f64>,
        energy_width: Vec<(f64, f64)>,
        flux: Vec<f64>,
        flux_error: Vec<f64>,
        upper_limit: Vec<bool>,
        confidence_level: f64,
    ) -> Result<Self> {
        let flux_error = flux_error.into_iter().map(FluxError::Symmetric).collect();
        Self::new(
            energy,
            energy_width,
            flux,
            flux_error,
            upper_limit,
            confidence_level,
        )
    }

    /// Create an observation set with (lower, upper) flux errors per point.
    pub fn with_asymmetric_errors(
        energy: Vec<f64>,
        energy_width: Vec<(f64, f64)>,
        flux: Vec<f64>,
        flux_error: Vec<(f64, f64)>,
        upper_limit: Vec<bool>,
        confidence_level: f64,
    ) -> Result<Self> {
        let flux_error = flux_error
            .into_iter()
            .map(|(lo, hi)| FluxError::Asymmetric { lo, hi })
            .collect();
        Self::new(
            energy,
            energy_width,
            flux,
            flux_error,
            upper_limit,
            confidence_level,
        )
    }

    /// Create an observation set from a row-per-point flux error table.
    ///
    /// Every row must have the same number of columns, either one
    /// (symmetric) or two (lower, upper). Anything else is rejected.
    pub fn from_columns(
        energy: Vec<f64>,
        energy_width: Vec<(f64, f64)>,
        flux: Vec<f64>,
        flux_error_rows: &[Vec<f64>],
        upper_limit: Vec<bool>,
        confidence_level: f64,
    ) -> Result<Self> {
        let Some(first) = flux_error_rows.first() else {
            return Err(SpecfitError::invalid_data("flux error table is empty"));
        };
        let width = first.len();
        if let Some((row, bad)) = flux_error_rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != width)
        {
            return Err(SpecfitError::invalid_data(format!(
                "flux error table is ragged: row 0 has {} columns, row {} has {}",
                width,
                row,
                bad.len()
            )));
        }
        let flux_error = match width {
            1 => flux_error_rows
                .iter()
                .map(|row| FluxError::Symmetric(row[0]))
                .collect(),
            2 => flux_error_rows
                .iter()
                .map(|row| FluxError::Asymmetric {
                    lo: row[0],
                    hi: row[1],
                })
                .collect(),
            other => {
                return Err(SpecfitError::invalid_data(format!(
                    "flux error table must have 1 or 2 columns, found {}",
                    other
                )))
            }
        };
        Self::new(
            energy,
            energy_width,
            flux,
            flux_error,
            upper_limit,
            confidence_level,
        )
    }

    /// Return a copy of this set with a different upper-limit confidence level.
    pub fn with_confidence_level(&self, confidence_level: f64) -> Result<Self> {
        let mut data = self.clone();
        data.confidence_level = confidence_level;
        data.validate()?;
        Ok(data)
    }

    fn validate(&self) -> Result<()> {
        let n = self.energy.len();
        if n == 0 {
            return Err(SpecfitError::invalid_data("no data points"));
        }
        let lengths = [
            ("energy_width", self.energy_width.len()),
            ("flux", self.flux.len()),
            ("flux_error", self.flux_error.len()),
            ("upper_limit", self.upper_limit.len()),
        ];
        for (name, len) in lengths {
            if len != n {
                return Err(SpecfitError::invalid_data(format!(
                    "column {} has length {}, but energy has length {}",
                    name, len, n
                )));
            }
        }
        if let Some(idx) = self.energy.iter().position(|e| !(e.is_finite() && *e > 0.)) {
            return Err(SpecfitError::invalid_data(format!(
                "energy of point {} must be positive and finite",
                idx
            )));
        }
        if let Some(idx) = self
            .energy_width
            .iter()
            .position(|&(lo, hi)| !(lo.is_finite() && hi.is_finite() && lo >= 0. && hi >= 0.))
        {
            return Err(SpecfitError::invalid_data(format!(
                "energy bin width of point {} must be non-negative and finite",
                idx
            )));
        }
        if let Some(idx) = self.flux.iter().position(|f| !f.is_finite()) {
            return Err(SpecfitError::invalid_data(format!(
                "flux of point {} is not finite",
                idx
            )));
        }
        if let Some(idx) = self
            .detections()
            .find(|&idx| !self.flux_error[idx].is_valid())
        {
            return Err(SpecfitError::invalid_data(format!(
                "flux error of point {} must be positive and finite",
                idx
            )));
        }
        if !(self.confidence_level.is_finite()
            && (0. ..1.).contains(&self.confidence_level))
        {
            return Err(SpecfitError::invalid_data(format!(
                "confidence level {} is not in [0, 1)",
                self.confidence_level
            )));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }

    pub fn energy(&self) -> &[f64] {
        &self.energy
    }

    pub fn energy_width(&self) -> &[(f64, f64)] {
        &self.energy_width
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn flux_error(&self) -> &[FluxError] {
        &self.flux_error
    }

    pub fn upper_limit(&self) -> &[bool] {
        &self.upper_limit
    }

    pub fn confidence_level(&self) -> f64 {
        self.confidence_level
    }

    /// Indices of the points that are measurements, not upper limits.
    pub fn detections(&self) -> impl Iterator<Item = usize> + '_ {
        self.upper_limit
            .iter()
            .enumerate()
            .filter(|&(_, &ul)| !ul)
            .map(|(idx, _)| idx)
    }

    pub fn upper_limits(&self) -> impl Iterator<Item = usize> + '_ {
        self.upper_limit
            .iter()
            .enumerate()
            .filter(|&(_, &ul)| ul)
            .map(|(idx, _)| idx)
    }

    pub fn has_upper_limits(&self) -> bool {
        self.upper_limit.iter().any(|&ul| ul)
    }
}

/// Compute energy bin half-widths from bin centers.
///
/// Bin edges sit at the geometric mean of neighbouring energies. The first and
/// last bins are made symmetric by mirroring their only known side.
pub fn generate_energy_edges(energy: &[f64]) -> Result<Vec<(f64, f64)>> {
    let n = energy.len();
    if n < 2 {
        return Err(SpecfitError::invalid_data(
            "need at least two energies to derive bin edges",
        ));
    }
    let mut lo = vec![0f64; n];
    let mut hi = vec![0f64; n];
    for (i, pair) in energy.windows(2).enumerate() {
        let mid = (pair[0] * pair[1]).sqrt();
        lo[i + 1] = pair[1] - mid;
        hi[i] = mid - pair[0];
    }
    lo[0] = hi[0];
    hi[n - 1] = lo[n - 1];
    Ok(lo.into_iter().zip(hi).collect())
}

#[cfg(test)]
pub(crate) mod test_data {
    use super::ObservationSet;

    /// Four detections with symmetric 10% errors and one upper limit.
    pub fn small_set() -> ObservationSet {
        let energy = vec![1., 2., 4., 8., 16.];
        let flux = vec![10., 5., 2.5, 1.25, 1.0];
        let error = flux.iter().map(|f| 0.1 * f).collect();
        ObservationSet::with_symmetric_errors(
            energy,
            vec![(0.1, 0.1); 5],
            flux,
            error,
            vec![false, false, false, false, true],
            0.95,
        )
        .unwrap()
    }
}
