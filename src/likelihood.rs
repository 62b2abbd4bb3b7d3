//! Log-likelihood of model flux given observed flux points.
//!
//! Detections contribute an unnormalized Gaussian term
//! `-(model - flux)² / (2σ²)`. The `-½ log(2πσ²)` term is left out since σ is
//! fixed for a given data set. Each upper limit that the model exceeds adds
//! `log(1 - CL)`.

use crate::{
    data::ObservationSet,
    error::{Result, SpecfitError},
};

/// Which side of an asymmetric flux error is used for a detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorConvention {
    /// A model above the measured flux is compared using the upper error,
    /// a model at or below it using the lower error.
    #[default]
    ModelAboveUsesUpper,
    /// A model above the measured flux is compared using the lower error,
    /// a model at or below it using the upper error.
    ModelAboveUsesLower,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LikelihoodSettings {
    pub error_convention: ErrorConvention,
}

impl ErrorConvention {
    fn sigma(&self, difference: f64, lower: f64, upper: f64) -> f64 {
        let model_above = difference > 0.;
        match (self, model_above) {
            (ErrorConvention::ModelAboveUsesUpper, true) => upper,
            (ErrorConvention::ModelAboveUsesUpper, false) => lower,
            (ErrorConvention::ModelAboveUsesLower, true) => lower,
            (ErrorConvention::ModelAboveUsesLower, false) => upper,
        }
    }
}

/// Compute the log-likelihood of `model` (flux at the observed energies).
///
/// Fails if `model` and `data` have different lengths.
pub fn log_likelihood(
    model: &[f64],
    data: &ObservationSet,
    settings: &LikelihoodSettings,
) -> Result<f64> {
    if model.len() != data.len() {
        return Err(SpecfitError::invalid_data(format!(
            "model has {} flux values for {} data points",
            model.len(),
            data.len()
        )));
    }

    let flux = data.flux();
    let errors = data.flux_error();

    let mut total: f64 = data
        .detections()
        .map(|idx| {
            let difference = model[idx] - flux[idx];
            let sigma = settings.error_convention.sigma(
                difference,
                errors[idx].lower(),
                errors[idx].upper(),
            );
            -difference * difference / (2. * sigma * sigma)
        })
        .sum();

    if data.has_upper_limits() {
        let violated = data
            .upper_limits()
            .filter(|&idx| model[idx] > flux[idx])
            .count();
        if violated > 0 {
            total += violated as f64 * (1. - data.confidence_level()).ln();
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::data::{test_data::small_set, ObservationSet};

    fn single_point(flux_error: (f64, f64)) -> ObservationSet {
        ObservationSet::with_asymmetric_errors(
            vec![1.],
            vec![(0., 0.)],
            vec![10.],
            vec![flux_error],
            vec![false],
            0.9,
        )
        .unwrap()
    }

    #[test]
    fn gaussian_term() -> Result<()> {
        let data = small_set();
        let settings = LikelihoodSettings::default();
        let mut model = data.flux().to_vec();
        assert_eq!(log_likelihood(&model, &data, &settings)?, 0.);

        // one sigma away on one point
        model[1] += 0.5;
        assert_relative_eq!(log_likelihood(&model, &data, &settings)?, -0.5);
        Ok(())
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let data = small_set();
        let err = log_likelihood(&[1., 2.], &data, &LikelihoodSettings::default()).unwrap_err();
        assert!(matches!(err, SpecfitError::InvalidData { .. }));
    }

    #[test]
    fn asymmetric_error_side() -> Result<()> {
        let data = single_point((1., 2.));
        let above = LikelihoodSettings::default();
        assert_relative_eq!(log_likelihood(&[12.], &data, &above)?, -0.5);
        assert_relative_eq!(log_likelihood(&[8.], &data, &above)?, -2.);

        let flipped = LikelihoodSettings {
            error_convention: ErrorConvention::ModelAboveUsesLower,
        };
        assert_relative_eq!(log_likelihood(&[12.], &data, &flipped)?, -2.);
        assert_relative_eq!(log_likelihood(&[8.], &data, &flipped)?, -0.5);
        Ok(())
    }

    #[test]
    fn violated_upper_limit() -> Result<()> {
        let data = small_set();
        let settings = LikelihoodSettings::default();
        let mut model = data.flux().to_vec();
        model[4] = 0.5;
        assert_eq!(log_likelihood(&model, &data, &settings)?, 0.);
        model[4] = 2.;
        assert_relative_eq!(
            log_likelihood(&model, &data, &settings)?,
            (1f64 - 0.95).ln()
        );
        Ok(())
    }

    #[test]
    fn upper_limit_penalty_grows_with_confidence() -> Result<()> {
        let data = small_set();
        let settings = LikelihoodSettings::default();
        let mut model = data.flux().to_vec();
        model[4] = 3.;

        let mut last = f64::INFINITY;
        for cl in [0., 0.5, 0.9, 0.99, 0.999999] {
            let data = data.with_confidence_level(cl)?;
            let logp = log_likelihood(&model, &data, &settings)?;
            assert!(logp < last || cl == 0.);
            assert!(logp.is_finite());
            last = logp;
        }
        Ok(())
    }

    proptest! {
        #[test]
        fn confidence_level_unused_without_limits(
            cl in 0f64..0.999,
            offsets in prop::collection::vec(-5f64..5., 4),
        ) {
            let data = ObservationSet::with_symmetric_errors(
                vec![1., 2., 3., 4.],
                vec![(0.1, 0.1); 4],
                vec![4., 3., 2., 1.],
                vec![0.5; 4],
                vec![false; 4],
                0.5,
            ).unwrap();
            let model: Vec<f64> = data.flux().iter().zip(&offsets).map(|(f, o)| f + o).collect();
            let settings = LikelihoodSettings::default();
            let reference = log_likelihood(&model, &data, &settings).unwrap();
            let other = data.with_confidence_level(cl).unwrap();
            prop_assert_eq!(reference, log_likelihood(&model, &other, &settings).unwrap());
        }

        #[test]
        fn finite_for_finite_input(model in prop::collection::vec(-1e3f64..1e3, 5)) {
            let data = small_set();
            let logp = log_likelihood(&model, &data, &LikelihoodSettings::default()).unwrap();
            prop_assert!(logp.is_finite());
            prop_assert!(logp <= 0.);
        }
    }
}
