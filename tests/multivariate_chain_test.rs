//! End-to-end runs of the block (multivariate) strategy.

use adaptive_mcmc::config::{McmcConfig, MultivariateSettings};
use adaptive_mcmc::distributions::Gaussian2D;
use adaptive_mcmc::io::csv::read_chain;
use adaptive_mcmc::parameter::{ParameterRecord, ParameterSpace};
use adaptive_mcmc::sampler::AdaptiveSampler;
use ndarray::{arr1, arr2};
use tempfile::TempDir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn correlated_target() -> Gaussian2D {
    Gaussian2D {
        mean: arr1(&[0.0, 0.0]),
        cov: arr2(&[[1.0, 0.8], [0.8, 1.0]]),
    }
}

fn plane() -> ParameterSpace {
    ParameterSpace::new(vec![
        ParameterRecord::new("x", 0.0, -20.0, 20.0),
        ParameterRecord::new("y", 0.0, -20.0, 20.0),
    ])
    .unwrap()
}

#[test]
fn block_covariance_learns_the_correlation() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let config = McmcConfig::default()
        .with_popt(0.234)
        .with_adaptive_period(5_000)
        .with_opt_freq(100)
        .with_iterations(1_000)
        .with_phase_fractions(0.2, 0.8)
        .with_multivariate(MultivariateSettings::identity(2).with_weight(0.5))
        .with_seed(17);
    let result = AdaptiveSampler::new(plane(), correlated_target(), config)
        .unwrap()
        .run(dir.path().join("chain.csv"))
        .unwrap();

    assert!(result.final_steps.is_none());
    let covariance = result.final_covariance.expect("multivariate run reports covariance");
    let cov = &covariance[&0];
    let correlation = cov[(0, 1)] / (cov[(0, 0)] * cov[(1, 1)]).sqrt();
    assert!(correlation > 0.5, "learned covariance {cov}");
    assert!((0.4..2.5).contains(&cov[(0, 0)]), "learned covariance {cov}");
    assert!((0.4..2.5).contains(&cov[(1, 1)]), "learned covariance {cov}");
    assert_eq!(result.rows_written, 6_000);
}

#[test]
fn block_acceptance_approaches_target() {
    init_logger();
    const POPT: f64 = 0.234;

    let dir = TempDir::new().unwrap();
    let config = McmcConfig::default()
        .with_popt(POPT)
        .with_adaptive_period(10_000)
        .with_opt_freq(500)
        .with_iterations(10_000)
        .with_phase_fractions(0.2, 0.5)
        .with_multivariate(MultivariateSettings::identity(2))
        .with_seed(23);
    let result = AdaptiveSampler::new(plane(), correlated_target(), config)
        .unwrap()
        .run(dir.path().join("chain.csv"))
        .unwrap();

    assert_eq!(result.acceptance_rates.len(), 1);
    let rate = result.acceptance_rates[0];
    assert!((rate - POPT).abs() < 0.1, "acceptance rate {rate}");
    assert!(result.final_scale.unwrap()[&0] > 0.0);
}

#[test]
fn fixed_parameters_are_never_moved() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let space = ParameterSpace::new(vec![
        ParameterRecord::new("a", 0.0, -10.0, 10.0).in_block(0),
        ParameterRecord::new("held", 2.5, 0.0, 5.0).fixed().in_block(0),
        ParameterRecord::new("b", 1.0, -10.0, 10.0).in_block(3),
    ])
    .unwrap();
    let oracle = |theta: &[f64]| -0.5 * (theta[0] * theta[0] + (theta[2] - 1.0).powi(2));
    let config = McmcConfig::default()
        .with_adaptive_period(1_000)
        .with_iterations(1_000)
        .with_opt_freq(50)
        .with_multivariate(MultivariateSettings::new(vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
        ]))
        .with_seed(31);
    let result = AdaptiveSampler::new(space, oracle, config)
        .unwrap()
        .run(dir.path().join("chain.csv"))
        .unwrap();

    let table = read_chain(&result.chain_file).unwrap();
    assert_eq!(table.names, vec!["a", "held", "b"]);
    assert!(table.samples.iter().all(|s| s.values[1] == 2.5));
    assert!(table.samples.iter().any(|s| s.values[0] != 0.0));
    assert!(table.samples.iter().any(|s| s.values[2] != 1.0));

    let covariance = result.final_covariance.unwrap();
    assert_eq!(covariance.keys().copied().collect::<Vec<_>>(), vec![0, 3]);
    assert_eq!(covariance[&0].shape(), (1, 1));
    assert_eq!(covariance[&3].shape(), (1, 1));
    assert_eq!(result.acceptance_rates.len(), 2);
}
