use std::sync::Arc;

use anyhow::Result;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use specfit_rs::{
    generate_energy_edges, run_sampler, sample_ball, CutoffPowerLaw, ObservationSet,
    ParameterPriors, SamplerSettings, SokalAutocorr, SpecfitError, SpectralModel, SummarySettings,
};

const TRUE_PARAMS: [f64; 4] = [2., 3e-11, 20., 1.];
const REFERENCE_ENERGY: f64 = 5.;

/// Flux points of a known cutoff power law with 2% errors from well below to
/// well above the cutoff, and one upper limit beyond the last detection.
fn synthetic_data(noise: bool) -> Result<ObservationSet> {
    let mut rng = ChaCha8Rng::seed_from_u64(1234);
    let mut energy: Vec<f64> = (0..12).map(|i| 0.5 * 400f64.powf(i as f64 / 11.)).collect();
    energy.push(400.);
    let mut flux = Vec::with_capacity(energy.len());
    let mut error = Vec::with_capacity(energy.len());
    for (i, &e) in energy.iter().enumerate() {
        let model = CutoffPowerLaw::flux_at(&TRUE_PARAMS, REFERENCE_ENERGY, e);
        let sigma = 0.02 * model;
        if i == energy.len() - 1 {
            flux.push(2. * model);
        } else if noise {
            let z: f64 = StandardNormal.sample(&mut rng);
            flux.push(model + 0.5 * sigma * z);
        } else {
            flux.push(model);
        }
        error.push(sigma);
    }
    let mut upper_limit = vec![false; energy.len()];
    upper_limit[energy.len() - 1] = true;
    let widths = generate_energy_edges(&energy)?;
    Ok(ObservationSet::with_symmetric_errors(
        energy,
        widths,
        flux,
        error,
        upper_limit,
        0.95,
    )?)
}

fn priors() -> ParameterPriors {
    ParameterPriors::new()
        .uniform(0, 0., 5.)
        .uniform(1, 0., 1e-8)
        .uniform(2, 1., 1000.)
        .uniform(3, 0.1, 5.)
}

fn settings() -> SamplerSettings {
    SamplerSettings {
        num_walkers: 64,
        num_burn: 500,
        num_run: 300,
        initial_spread: 0.02,
        num_threads: 4,
        seed: 42,
        ..Default::default()
    }
}

#[test]
fn recovers_true_curve() -> Result<()> {
    let data = Arc::new(synthetic_data(true)?);
    let model = CutoffPowerLaw::with_reference_energy(REFERENCE_ENERGY);
    let (sampler, positions) = run_sampler(
        settings(),
        Some(data.clone()),
        model,
        priors(),
        &[2.1, 1e-11, 22., 1.1],
    )?;
    assert_eq!(positions.len(), 64);
    assert_eq!(sampler.chain().num_steps(), 300);

    let fit = sampler.fit_confidence(&SummarySettings {
        confidence_levels: vec![3., 1., 0.],
        ..Default::default()
    })?;
    assert_eq!(fit.energy, data.energy().to_vec());
    for idx in data.detections() {
        let truth = CutoffPowerLaw::flux_at(&TRUE_PARAMS, REFERENCE_ENERGY, data.energy()[idx]);
        let rel = (fit.map_curve[idx] - truth).abs() / truth;
        assert!(rel < 0.05, "point {}: relative deviation {}", idx, rel);
    }

    for point in 0..fit.energy.len() {
        let (wide, narrow, zero) = (&fit.bands[0], &fit.bands[1], &fit.bands[2]);
        assert!(wide.lower[point] <= narrow.lower[point]);
        assert!(narrow.lower[point] <= zero.lower[point]);
        assert_eq!(zero.lower[point], zero.upper[point]);
        assert!(zero.upper[point] <= narrow.upper[point]);
        assert!(narrow.upper[point] <= wide.upper[point]);
    }

    // evaluating the model at the MAP parameters reproduces the MAP curve
    let output = model.evaluate(&fit.map_params, &data)?;
    assert_eq!(output.flux, fit.map_curve);

    let summaries = sampler.parameter_summaries(false, &SokalAutocorr::default())?;
    assert_eq!(summaries.len(), 4);
    for (summary, &truth) in summaries.iter().zip(&TRUE_PARAMS) {
        let (lo, hi) = summary.interval_99();
        assert!(lo < summary.median && summary.median < hi);
        assert!(summary.std > 0.);
        assert!((summary.mean - truth).abs() < 5. * summary.std + 0.1 * truth);
    }
    Ok(())
}

#[test]
fn deterministic_for_fixed_seed() -> Result<()> {
    let data = Arc::new(synthetic_data(false)?);
    let run = |num_threads| -> Result<Vec<f64>> {
        let settings = SamplerSettings {
            num_walkers: 16,
            num_burn: 10,
            num_run: 10,
            num_threads,
            ..settings()
        };
        let (sampler, _) = run_sampler(
            settings,
            Some(data.clone()),
            CutoffPowerLaw::with_reference_energy(REFERENCE_ENERGY),
            priors(),
            &TRUE_PARAMS,
        )?;
        Ok(sampler.chain().parameter_values(1))
    };
    assert_eq!(run(1)?, run(3)?);
    Ok(())
}

#[test]
fn missing_data_is_a_configuration_error() {
    let err = run_sampler(
        settings(),
        None,
        CutoffPowerLaw::default(),
        priors(),
        &TRUE_PARAMS,
    )
    .err()
    .unwrap();
    assert!(matches!(
        err.downcast_ref::<SpecfitError>(),
        Some(SpecfitError::MissingData)
    ));
}

#[test]
fn initial_ball_within_five_sigma() {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let guess = [2., 3e-11, 20., 1.];
    for position in sample_ball(&guess, 0.1, 600, &mut rng) {
        for (x, g) in position.iter().zip(&guess) {
            assert!((x - g).abs() <= 5. * 0.1 * g.abs());
        }
    }
}
