/*!
# Adaptive Metropolis-within-Gibbs Sampler

[`AdaptiveSampler`] owns a single chain and drives it through two phases:

1. **Adapting** (iterations `1..=adaptive_period`): every `opt_freq`-th
   iteration the proposal is retuned toward the target acceptance rate.
2. **Sampling** (the following `iterations` iterations): the proposal is
   frozen.

Each iteration proposes a move for one unit (a free parameter, or a block of
free parameters in multivariate mode), applies the Metropolis rule and, every
`thin`-th iteration, records the current state to the chain file.

## Example Usage

```rust
use adaptive_mcmc::config::McmcConfig;
use adaptive_mcmc::parameter::{ParameterRecord, ParameterSpace};
use adaptive_mcmc::sampler::AdaptiveSampler;

let space = ParameterSpace::new(vec![
    ParameterRecord::new("x", 0.0, -5.0, 5.0),
    ParameterRecord::new("y", 0.0, -5.0, 5.0),
])?;
let oracle = |theta: &[f64]| -(theta[0] * theta[0] + theta[1] * theta[1]);
let config = McmcConfig::default()
    .with_iterations(200)
    .with_adaptive_period(100)
    .with_seed(42);

let dir = tempfile::tempdir()?;
let mut sampler = AdaptiveSampler::new(space, oracle, config)?;
let result = sampler.run(dir.path().join("chain.csv"))?;

assert_eq!(result.rows_written, 300);
assert!(result.final_steps.is_some());
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use nalgebra as na;
use rand::prelude::*;

use crate::acceptance::{AcceptanceController, ChainState, Counters, Decision};
use crate::adapt::Adapter;
use crate::config::McmcConfig;
use crate::core::{progress_bar, Phase};
use crate::distributions::PosteriorOracle;
use crate::error::{McmcError, Result};
use crate::io::csv::{ChainSample, ChainWriter};
use crate::parameter::ParameterSpace;
use crate::proposal::{ProposalGenerator, ProposalStrategy};

/// What a completed run leaves behind.
///
/// Exactly one of `final_steps` and the pair `final_covariance` /
/// `final_scale` is populated, depending on the strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub chain_file: PathBuf,
    /// Tuned step per parameter, index-aligned with the parameter space.
    pub final_steps: Option<Vec<f64>>,
    /// Tuned covariance per block id.
    pub final_covariance: Option<BTreeMap<usize, na::DMatrix<f64>>>,
    /// Tuned scale per block id.
    pub final_scale: Option<BTreeMap<usize, f64>>,
    /// Sampling-phase acceptance rate per unit, NaN for units never proposed.
    pub acceptance_rates: Vec<f64>,
    pub rows_written: u64,
}

/// A single adaptive chain over a [`ParameterSpace`].
#[derive(Debug, Clone)]
pub struct AdaptiveSampler<O> {
    space: ParameterSpace,
    oracle: O,
    config: McmcConfig,
    generator: ProposalGenerator,
    controller: AcceptanceController,
    adapter: Adapter,
    counters: Counters,
    state: ChainState,
    /// Iterations completed so far.
    iteration: usize,
    seed: u64,
    rng: SmallRng,
}

impl<O> AdaptiveSampler<O>
where
    O: PosteriorOracle,
{
    const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

    /// Validates the configuration against `space`, builds the proposal
    /// strategy and evaluates the starting point.
    ///
    /// Nothing is sampled or written until [`AdaptiveSampler::run`] is
    /// called.
    pub fn new(space: ParameterSpace, oracle: O, config: McmcConfig) -> Result<Self> {
        config.validate()?;
        let strategy = ProposalStrategy::from_settings(&space, config.multivariate.as_ref())?;
        let adapter = Adapter::new(&config, &space, &strategy);
        let counters = Counters::new(strategy.n_units());

        let values = space.initial_values();
        let mut log_posterior = oracle.log_posterior(&values);
        if !log_posterior.is_finite() {
            warn!("log-posterior at the starting point is {log_posterior}; the first finite candidate will be accepted");
            log_posterior = f64::NEG_INFINITY;
        }

        let seed = config.seed.unwrap_or_else(|| thread_rng().gen());
        Ok(Self {
            controller: AcceptanceController::new(space.clone()),
            generator: ProposalGenerator::new(strategy),
            space,
            oracle,
            config,
            adapter,
            counters,
            state: ChainState {
                values,
                log_posterior,
            },
            iteration: 0,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        })
    }

    /// Reseeds the chain's random number generator.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Iterations completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Phase of the next iteration.
    pub fn phase(&self) -> Phase {
        if self.iteration >= self.config.total_iterations() {
            Phase::Done
        } else if self.iteration < self.config.adaptive_period {
            Phase::Adapting
        } else {
            Phase::Sampling
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    pub fn config(&self) -> &McmcConfig {
        &self.config
    }

    pub fn strategy(&self) -> &ProposalStrategy {
        self.generator.strategy()
    }

    /// Tallies since the last checkpoint (or since the end of adaptation).
    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Runs the whole chain, recording to a chain file at `path`.
    ///
    /// The file is created (or truncated) with its header before the first
    /// iteration. On an I/O error the file holds the header and every block
    /// flushed before the failure.
    ///
    /// A sampler runs once: calling this again, even after a failed run,
    /// returns [`McmcError::Config`] and leaves every file untouched.
    pub fn run(&mut self, path: impl AsRef<Path>) -> Result<RunResult> {
        self.run_inner(path.as_ref(), None)
    }

    /// Like [`AdaptiveSampler::run`], with a progress bar showing the
    /// running acceptance rate.
    pub fn run_progress(&mut self, path: impl AsRef<Path>) -> Result<RunResult> {
        let pb = progress_bar(self.config.total_iterations(), "Chain");
        let result = self.run_inner(path.as_ref(), Some(&pb));
        pb.finish_with_message("Done!");
        result
    }

    fn run_inner(&mut self, path: &Path, pb: Option<&ProgressBar>) -> Result<RunResult> {
        if self.iteration != 0 {
            return Err(McmcError::Config(format!(
                "sampler has already run {} iterations; build a new one to record another chain",
                self.iteration
            )));
        }
        let names: Vec<String> = self.space.names().map(String::from).collect();
        let mut writer = ChainWriter::create(path, &names, self.config.save_block)?;
        let total = self.config.total_iterations();
        info!(
            "starting {} chain: {} parameters ({} free), {} adaptive + {} sampling iterations, seed {}",
            strategy_name(self.generator.strategy()),
            self.space.len(),
            self.space.free_indices().len(),
            self.config.adaptive_period,
            self.config.iterations,
            self.seed
        );

        let mut accepted = 0_u64;
        let mut last_update = Instant::now();
        while self.iteration < total {
            if self.advance().is_accepted() {
                accepted += 1;
            }
            if self.iteration % self.config.thin == 0 {
                writer.push(ChainSample {
                    sampno: self.iteration as u64,
                    values: self.state.values.clone(),
                    log_posterior: self.state.log_posterior,
                })?;
            }
            if let Some(pb) = pb {
                if last_update.elapsed() >= Self::UPDATE_INTERVAL || self.iteration == total {
                    let rate = accepted as f64 / self.iteration as f64;
                    pb.set_position(self.iteration as u64);
                    pb.set_message(format!("AcceptRate={rate:.3} {:?}", self.phase()));
                    last_update = Instant::now();
                }
            }
        }

        writer.flush()?;
        let rows_written = writer.rows_written();
        let chain_file = writer.finish()?;
        info!(
            "chain finished: {rows_written} rows written to {}",
            chain_file.display()
        );
        Ok(self.result(chain_file, rows_written))
    }

    /// One proposal, one decision, and adaptation when due.
    fn advance(&mut self) -> Decision {
        self.iteration += 1;
        let i = self.iteration;

        let (unit, candidate) =
            self.generator
                .propose(&self.state.values, &mut self.counters, &mut self.rng);
        let decision = self.controller.decide(
            &mut self.state,
            candidate,
            unit,
            &mut self.counters,
            &self.oracle,
            &mut self.rng,
        );

        self.adapter.observe(i, &self.state.values);
        if let Some(phase) =
            self.adapter
                .checkpoint(i, self.generator.strategy_mut(), &mut self.counters)
        {
            debug!("checkpoint at iteration {i}: {phase:?}");
        }
        if i == self.config.adaptive_period {
            self.counters.reset();
            info!("adaptation finished after {i} iterations; proposals frozen");
        }
        decision
    }

    fn result(&self, chain_file: PathBuf, rows_written: u64) -> RunResult {
        let mut result = RunResult {
            chain_file,
            final_steps: None,
            final_covariance: None,
            final_scale: None,
            acceptance_rates: self.counters.rates(),
            rows_written,
        };
        match self.generator.strategy() {
            ProposalStrategy::Univariate(state) => {
                result.final_steps = Some(state.steps.clone());
            }
            ProposalStrategy::Multivariate(state) => {
                result.final_covariance = Some(
                    state
                        .blocks
                        .iter()
                        .map(|b| (b.id, b.covariance().clone()))
                        .collect(),
                );
                result.final_scale =
                    Some(state.blocks.iter().map(|b| (b.id, b.scale())).collect());
            }
        }
        result
    }
}

fn strategy_name(strategy: &ProposalStrategy) -> &'static str {
    match strategy {
        ProposalStrategy::Univariate(_) => "univariate",
        ProposalStrategy::Multivariate(_) => "multivariate",
    }
}
