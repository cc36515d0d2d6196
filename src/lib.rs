/*!
# Adaptive MCMC

An adaptive Metropolis-within-Gibbs sampler for bounded, named parameters.

A run walks a [`parameter::ParameterSpace`] with one of two random-walk
proposal strategies:

- **Univariate**: free parameters are updated one at a time in round-robin
  order, each with its own Gaussian step.
- **Multivariate**: blocks of free parameters are updated jointly with a
  Gaussian whose covariance is learned from the chain.

During an initial adaptive period the step sizes (or block covariances and
scales) are tuned toward a target acceptance rate. Afterwards the proposal is
frozen and the chain is recorded to a CSV file in crash-tolerant blocks.

## Example

```rust
use adaptive_mcmc::config::{McmcConfig, MultivariateSettings};
use adaptive_mcmc::distributions::Gaussian2D;
use adaptive_mcmc::parameter::{ParameterRecord, ParameterSpace};
use adaptive_mcmc::sampler::AdaptiveSampler;
use ndarray::{arr1, arr2};

let target = Gaussian2D {
    mean: arr1(&[0.0, 0.0]),
    cov: arr2(&[[1.0, 0.8], [0.8, 1.0]]),
};
let space = ParameterSpace::new(vec![
    ParameterRecord::new("x", 0.0, -10.0, 10.0),
    ParameterRecord::new("y", 0.0, -10.0, 10.0),
])?;
let config = McmcConfig::default()
    .with_iterations(500)
    .with_adaptive_period(500)
    .with_popt(0.234)
    .with_multivariate(MultivariateSettings::identity(2))
    .with_seed(7);

let dir = tempfile::tempdir()?;
let result = AdaptiveSampler::new(space, target, config)?.run(dir.path().join("chain.csv"))?;
assert_eq!(result.rows_written, 1000);
assert!(result.final_covariance.is_some());
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

pub mod acceptance;
pub mod adapt;
pub mod config;
pub mod core;
pub mod distributions;
pub mod error;
pub mod io;
pub mod parameter;
pub mod proposal;
pub mod sampler;
pub mod stats;

pub use crate::config::{McmcConfig, MultivariateSettings};
pub use crate::error::{McmcError, Result};
pub use crate::parameter::{ParameterRecord, ParameterSpace};
pub use crate::sampler::{AdaptiveSampler, RunResult};
