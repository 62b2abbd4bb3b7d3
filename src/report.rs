//! Inputs for fit reports: residuals and output file names.

use crate::{
    data::ObservationSet,
    error::{Result, SpecfitError},
    math::{interpolate, mean},
};

/// Residual of one detection against the MAP curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    /// Index of the point in the observation set.
    pub index: usize,
    pub energy: f64,
    /// `(flux - model) / mean(flux_error)`.
    pub value: f64,
}

/// Residuals of all detections, interpolating the MAP curve linearly at the
/// observed energies. Upper limits are skipped.
pub fn fit_residuals(
    data: &ObservationSet,
    energy: &[f64],
    map_curve: &[f64],
) -> Result<Vec<Residual>> {
    if energy.len() != map_curve.len() {
        return Err(SpecfitError::invalid_data(format!(
            "model grid has {} energies and {} flux values",
            energy.len(),
            map_curve.len()
        )));
    }
    data.detections()
        .map(|index| {
            let point_energy = data.energy()[index];
            let model = interpolate(energy, map_curve, point_energy).ok_or_else(|| {
                SpecfitError::invalid_data(format!(
                    "energy {} is outside of the model grid",
                    point_energy
                ))
            })?;
            let error = &data.flux_error()[index];
            Ok(Residual {
                index,
                energy: point_energy,
                value: (data.flux()[index] - model) / error.mean(),
            })
        })
        .collect()
}

/// Standard deviation of the residuals in units of the flux error.
pub fn residual_spread(residuals: &[Residual]) -> f64 {
    let values: Vec<f64> = residuals.iter().map(|r| r.value).collect();
    let mean = mean(&values);
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// File names of the report artifacts of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub run_name: String,
}

impl ArtifactNames {
    pub fn new(run_name: impl Into<String>) -> Self {
        ArtifactNames {
            run_name: run_name.into(),
        }
    }

    pub fn corner(&self) -> String {
        format!("{}_corner.png", self.run_name)
    }

    pub fn chain(&self, param: usize) -> String {
        format!("{}_chain_par{}.png", self.run_name, param)
    }

    pub fn fit(&self) -> String {
        format!("{}_fit.png", self.run_name)
    }

    /// Every artifact name for a model with `dim` parameters.
    pub fn all(&self, dim: usize) -> Vec<String> {
        let mut names = vec![self.corner()];
        names.extend((0..dim).map(|param| self.chain(param)));
        names.push(self.fit());
        names
    }
}
