//! Samples a correlated 2D Gaussian with both proposal strategies and prints
//! the tuned proposals and summary statistics of each chain.

use adaptive_mcmc::config::{McmcConfig, MultivariateSettings};
use adaptive_mcmc::distributions::Gaussian2D;
use adaptive_mcmc::io::csv::read_chain;
use adaptive_mcmc::parameter::{ParameterRecord, ParameterSpace};
use adaptive_mcmc::sampler::AdaptiveSampler;
use ndarray::{arr1, arr2, Axis};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    const ITERATIONS: usize = 20_000;
    const ADAPTIVE_PERIOD: usize = 5_000;
    const SEED: u64 = 42;

    let target = Gaussian2D {
        mean: arr1(&[0.0, 0.0]),
        cov: arr2(&[[2.0, 1.0], [1.0, 2.0]]),
    };
    let space = ParameterSpace::new(vec![
        ParameterRecord::new("x", 3.0, -20.0, 20.0),
        ParameterRecord::new("y", -3.0, -20.0, 20.0),
    ])?;
    let base = McmcConfig::default()
        .with_iterations(ITERATIONS)
        .with_adaptive_period(ADAPTIVE_PERIOD)
        .with_popt(0.234)
        .with_opt_freq(100)
        .with_save_block(1_000)
        .with_seed(SEED);

    let mut univariate = AdaptiveSampler::new(space.clone(), target.clone(), base.clone())?;
    let result = univariate.run_progress("univariate_chain.csv")?;
    println!("Univariate steps: {:?}", result.final_steps.unwrap_or_default());
    println!("Univariate acceptance: {:?}", result.acceptance_rates);
    summarize(&result.chain_file)?;

    let config = base.with_multivariate(MultivariateSettings::identity(2).with_weight(0.5));
    let mut multivariate = AdaptiveSampler::new(space, target, config)?;
    let result = multivariate.run_progress("multivariate_chain.csv")?;
    if let (Some(covariance), Some(scale)) = (&result.final_covariance, &result.final_scale) {
        for (id, cov) in covariance {
            println!("Block {id}: scale {:.3}, covariance {cov}", scale[id]);
        }
    }
    println!("Multivariate acceptance: {:?}", result.acceptance_rates);
    summarize(&result.chain_file)?;

    Ok(())
}

fn summarize(path: &Path) -> Result<(), Box<dyn Error>> {
    let table = read_chain(path)?;
    let values = table.values();
    let mean = values.mean_axis(Axis(0)).ok_or("empty chain")?;
    println!(
        "{}: {} rows, mean ({:.2}, {:.2})",
        path.display(),
        table.samples.len(),
        mean[0],
        mean[1]
    );
    Ok(())
}
