//! End-to-end runs of the univariate strategy against toy posteriors.

use adaptive_mcmc::config::McmcConfig;
use adaptive_mcmc::error::McmcError;
use adaptive_mcmc::io::csv::read_chain;
use adaptive_mcmc::parameter::{ParameterRecord, ParameterSpace};
use adaptive_mcmc::sampler::AdaptiveSampler;
use std::fs;
use tempfile::TempDir;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn neg_sum_sq(theta: &[f64]) -> f64 {
    -theta.iter().map(|x| x * x).sum::<f64>()
}

fn two_free(step: f64) -> ParameterSpace {
    ParameterSpace::new(vec![
        ParameterRecord::new("alpha", 0.0, -5.0, 5.0).with_step(step),
        ParameterRecord::new("beta", 0.0, -5.0, 5.0).with_step(step),
    ])
    .unwrap()
}

fn sampnos(path: &std::path::Path) -> Vec<u64> {
    read_chain(path)
        .unwrap()
        .samples
        .iter()
        .map(|s| s.sampno)
        .collect()
}

#[test]
fn toy_run_records_every_iteration_and_shrinks_steps() {
    init_logger();
    const INITIAL_STEP: f64 = 25.0;
    const ITERATIONS: usize = 1_000;

    let dir = TempDir::new().unwrap();
    let config = McmcConfig::default()
        .with_popt(0.234)
        .with_opt_freq(50)
        .with_adaptive_period(500)
        .with_iterations(ITERATIONS)
        .with_thin(1)
        .with_seed(2024);
    let mut sampler = AdaptiveSampler::new(two_free(INITIAL_STEP), neg_sum_sq, config).unwrap();
    let result = sampler.run(dir.path().join("chain.csv")).unwrap();

    assert_eq!(result.rows_written, (500 + ITERATIONS) as u64);
    let expected: Vec<u64> = (1..=(500 + ITERATIONS) as u64).collect();
    assert_eq!(sampnos(&result.chain_file), expected);

    let steps = result.final_steps.expect("univariate run reports steps");
    assert_eq!(steps.len(), 2);
    for step in steps {
        assert!(step > 0.0 && step < INITIAL_STEP, "step {step}");
    }
    assert!(result.final_covariance.is_none());
    assert!(result.final_scale.is_none());
}

#[test]
fn header_names_every_parameter_in_order() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let space = ParameterSpace::new(vec![
        ParameterRecord::new("gamma", 0.5, 0.0, 1.0),
        ParameterRecord::new("delta", 1.0, 0.0, 2.0).fixed(),
        ParameterRecord::new("epsilon", 0.0, -1.0, 1.0),
    ])
    .unwrap();
    let config = McmcConfig::default()
        .with_adaptive_period(10)
        .with_iterations(10)
        .with_seed(1);
    let result = AdaptiveSampler::new(space, neg_sum_sq, config)
        .unwrap()
        .run(dir.path().join("chain.csv"))
        .unwrap();
    let contents = fs::read_to_string(&result.chain_file).unwrap();
    assert_eq!(
        contents.lines().next(),
        Some("sampno,gamma,delta,epsilon,lnlike")
    );
}

#[test]
fn row_count_follows_thinning() {
    init_logger();
    let dir = TempDir::new().unwrap();
    for (iterations, adaptive_period, thin) in [(100, 50, 1), (100, 50, 100), (100, 50, 7), (30, 0, 30)] {
        let config = McmcConfig::default()
            .with_iterations(iterations)
            .with_adaptive_period(adaptive_period)
            .with_opt_freq(10)
            .with_thin(thin)
            .with_seed(5);
        let path = dir.path().join(format!("thin_{thin}_{adaptive_period}.csv"));
        let result = AdaptiveSampler::new(two_free(1.0), neg_sum_sq, config)
            .unwrap()
            .run(&path)
            .unwrap();

        let expected_rows = (iterations + adaptive_period) / thin;
        assert_eq!(result.rows_written, expected_rows as u64);
        let expected: Vec<u64> = (1..=expected_rows as u64).map(|k| k * thin as u64).collect();
        assert_eq!(sampnos(&path), expected);
    }
}

#[test]
fn recorded_values_stay_within_bounds() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let space = ParameterSpace::new(vec![
        ParameterRecord::new("narrow", 0.5, 0.0, 1.0).with_step(3.0),
        ParameterRecord::new("pinned", -1.75, -2.0, -1.5).fixed(),
        ParameterRecord::new("offset", -1.8, -2.0, -1.5).with_step(3.0),
    ])
    .unwrap();
    // Flat inside the box; the bounds do all the work.
    let flat = |_: &[f64]| 0.0;
    let config = McmcConfig::default()
        .with_adaptive_period(200)
        .with_iterations(800)
        .with_opt_freq(20)
        .with_seed(11);
    let result = AdaptiveSampler::new(space, flat, config)
        .unwrap()
        .run(dir.path().join("chain.csv"))
        .unwrap();

    let table = read_chain(&result.chain_file).unwrap();
    assert_eq!(table.samples.len(), 1_000);
    for sample in &table.samples {
        assert!((0.0..=1.0).contains(&sample.values[0]));
        assert_eq!(sample.values[1], -1.75);
        assert!((-2.0..=-1.5).contains(&sample.values[2]));
    }
    // The step of a bounded parameter never exceeds its bound width.
    let steps = result.final_steps.unwrap();
    assert!(steps[0] <= 1.0 && steps[2] <= 0.5);
}

#[test]
fn same_seed_gives_byte_identical_files() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let config = McmcConfig::default()
        .with_adaptive_period(300)
        .with_iterations(300)
        .with_opt_freq(30)
        .with_save_block(64)
        .with_seed(99);

    let first = AdaptiveSampler::new(two_free(1.0), neg_sum_sq, config.clone())
        .unwrap()
        .run(dir.path().join("first.csv"))
        .unwrap();
    let second = AdaptiveSampler::new(two_free(1.0), neg_sum_sq, config)
        .unwrap()
        .run(dir.path().join("second.csv"))
        .unwrap();

    assert_eq!(
        fs::read(&first.chain_file).unwrap(),
        fs::read(&second.chain_file).unwrap()
    );
    assert_eq!(first.final_steps, second.final_steps);
}

#[test]
fn flush_boundaries_neither_drop_nor_repeat_rows() {
    init_logger();
    let dir = TempDir::new().unwrap();
    for save_block in [10, 7, 1, 1_000] {
        let config = McmcConfig::default()
            .with_adaptive_period(40)
            .with_iterations(60)
            .with_opt_freq(10)
            .with_save_block(save_block)
            .with_seed(3);
        let path = dir.path().join(format!("block_{save_block}.csv"));
        let result = AdaptiveSampler::new(two_free(1.0), neg_sum_sq, config)
            .unwrap()
            .run(&path)
            .unwrap();
        assert_eq!(result.rows_written, 100);
        assert_eq!(sampnos(&path), (1..=100).collect::<Vec<u64>>());
    }
}

#[test]
fn sampling_acceptance_approaches_target() {
    init_logger();
    const POPT: f64 = 0.44;

    let dir = TempDir::new().unwrap();
    let space = ParameterSpace::new(vec![
        ParameterRecord::new("u", 0.0, -50.0, 50.0),
        ParameterRecord::new("v", 0.0, -50.0, 50.0),
    ])
    .unwrap();
    // independent standard normals
    let oracle = |theta: &[f64]| -0.5 * theta.iter().map(|x| x * x).sum::<f64>();
    let config = McmcConfig::default()
        .with_popt(POPT)
        .with_adaptive_period(10_000)
        .with_opt_freq(1_000)
        .with_iterations(10_000)
        .with_seed(8);
    let result = AdaptiveSampler::new(space, oracle, config)
        .unwrap()
        .run(dir.path().join("chain.csv"))
        .unwrap();

    assert_eq!(result.acceptance_rates.len(), 2);
    for rate in &result.acceptance_rates {
        assert!((rate - POPT).abs() < 0.1, "acceptance rate {rate}");
    }
}

#[test]
fn unwritable_chain_path_fails_before_sampling() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no_such_dir").join("chain.csv");
    let config = McmcConfig::default().with_seed(12);
    let mut sampler = AdaptiveSampler::new(two_free(1.0), neg_sum_sq, config).unwrap();

    let err = sampler.run(&path).unwrap_err();
    assert!(matches!(err, McmcError::Io { .. }), "{err}");
    assert_eq!(sampler.iteration(), 0);
    assert!(!path.exists());
}

#[test]
fn finished_chain_file_survives_a_second_run() {
    init_logger();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chain.csv");
    let config = McmcConfig::default()
        .with_adaptive_period(50)
        .with_iterations(50)
        .with_opt_freq(10)
        .with_seed(13);
    let mut sampler = AdaptiveSampler::new(two_free(1.0), neg_sum_sq, config).unwrap();
    let first = sampler.run(&path).unwrap();
    assert_eq!(first.rows_written, 100);

    assert!(matches!(sampler.run(&path), Err(McmcError::Config(_))));
    assert_eq!(sampnos(&path), (1..=100).collect::<Vec<u64>>());
}
