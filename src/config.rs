/*!
# Run Configuration

[`McmcConfig`] collects the options that drive a run: how long to sample, how
long to adapt, how often to tune, how often to record and how often to flush.
Supplying [`MultivariateSettings`] switches the sampler from one-parameter
random-walk updates to joint block updates.

```rust
use adaptive_mcmc::config::McmcConfig;

let config = McmcConfig::default()
    .with_iterations(2_000)
    .with_adaptive_period(500)
    .with_popt(0.234)
    .with_seed(42);
assert!(config.validate().is_ok());
```
*/

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{McmcError, Result};

/// Options for the multivariate (block) proposal strategy.
///
/// `covariance` is a square matrix over the free parameters, in the order
/// they appear in the [`crate::parameter::ParameterSpace`]. Each block is
/// started from the sub-matrix of its own coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MultivariateSettings {
    /// Initial proposal covariance, row-major.
    pub covariance: Vec<Vec<f64>>,
    /// Initial multiplier applied to every block covariance.
    pub scale: f64,
    /// Weight of the freshly estimated covariance when blending.
    pub w: f64,
}

impl MultivariateSettings {
    pub fn new(covariance: Vec<Vec<f64>>) -> Self {
        Self {
            covariance,
            scale: 1.0,
            w: 0.5,
        }
    }

    /// An identity covariance over `dim` free parameters.
    pub fn identity(dim: usize) -> Self {
        let covariance = (0..dim)
            .map(|i| (0..dim).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        Self::new(covariance)
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_weight(mut self, w: f64) -> Self {
        self.w = w;
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(McmcError::Config(format!(
                "multivariate scale must be finite and positive, got {}",
                self.scale
            )));
        }
        if !(0.0..=1.0).contains(&self.w) {
            return Err(McmcError::Config(format!(
                "covariance blending weight must lie in [0, 1], got {}",
                self.w
            )));
        }
        Ok(())
    }
}

/// All options recognised by [`crate::sampler::AdaptiveSampler`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct McmcConfig {
    /// Length of the sampling phase that follows adaptation.
    pub iterations: usize,
    /// Target acceptance rate, strictly between 0 and 1.
    pub popt: f64,
    /// Spacing between adaptation checkpoints.
    pub opt_freq: usize,
    /// Record every `thin`-th iteration.
    pub thin: usize,
    /// Number of warm-up iterations during which tuning is active.
    pub adaptive_period: usize,
    /// Number of recorded rows buffered before a flush.
    pub save_block: usize,
    /// Seed for the chain's random number generator; drawn from entropy when absent.
    pub seed: Option<u64>,
    /// Fraction of the adaptive period after which block covariances are learned.
    pub covariance_start: f64,
    /// Fraction of the adaptive period after which block scales are tuned.
    pub scale_start: f64,
    /// Relative deviation from `popt` tolerated before a block scale is tuned.
    pub scale_tolerance: f64,
    pub multivariate: Option<MultivariateSettings>,
}

impl Default for McmcConfig {
    fn default() -> Self {
        Self {
            iterations: 1_000,
            popt: 0.44,
            opt_freq: 50,
            thin: 1,
            adaptive_period: 1_000,
            save_block: 100,
            seed: None,
            covariance_start: 0.2,
            scale_start: 0.8,
            scale_tolerance: 0.1,
            multivariate: None,
        }
    }
}

impl McmcConfig {
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_popt(mut self, popt: f64) -> Self {
        self.popt = popt;
        self
    }

    pub fn with_opt_freq(mut self, opt_freq: usize) -> Self {
        self.opt_freq = opt_freq;
        self
    }

    pub fn with_thin(mut self, thin: usize) -> Self {
        self.thin = thin;
        self
    }

    pub fn with_adaptive_period(mut self, adaptive_period: usize) -> Self {
        self.adaptive_period = adaptive_period;
        self
    }

    pub fn with_save_block(mut self, save_block: usize) -> Self {
        self.save_block = save_block;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the fractions of the adaptive period at which covariance learning
    /// and scale tuning begin.
    pub fn with_phase_fractions(mut self, covariance_start: f64, scale_start: f64) -> Self {
        self.covariance_start = covariance_start;
        self.scale_start = scale_start;
        self
    }

    pub fn with_scale_tolerance(mut self, scale_tolerance: f64) -> Self {
        self.scale_tolerance = scale_tolerance;
        self
    }

    pub fn with_multivariate(mut self, settings: MultivariateSettings) -> Self {
        self.multivariate = Some(settings);
        self
    }

    /// Total number of iterations, adaptation included.
    pub fn total_iterations(&self) -> usize {
        self.iterations + self.adaptive_period
    }

    /// Number of rows the chain file ends up with.
    pub fn expected_rows(&self) -> usize {
        self.total_iterations() / self.thin.max(1)
    }

    /// Checks every option that does not depend on the parameter space.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("opt_freq", self.opt_freq),
            ("thin", self.thin),
            ("save_block", self.save_block),
        ] {
            if value == 0 {
                return Err(McmcError::Config(format!("`{name}` must be at least 1")));
            }
        }
        if !(self.popt > 0.0 && self.popt < 1.0) {
            return Err(McmcError::Config(format!(
                "`popt` must lie strictly between 0 and 1, got {}",
                self.popt
            )));
        }
        if self.total_iterations() == 0 {
            return Err(McmcError::Config(
                "`iterations + adaptive_period` must be at least 1".to_string(),
            ));
        }
        if !(0.0 <= self.covariance_start
            && self.covariance_start <= self.scale_start
            && self.scale_start <= 1.0)
        {
            return Err(McmcError::Config(format!(
                "phase fractions must satisfy 0 <= covariance_start <= scale_start <= 1, got {} and {}",
                self.covariance_start, self.scale_start
            )));
        }
        if !(self.scale_tolerance >= 0.0) {
            return Err(McmcError::Config(format!(
                "`scale_tolerance` must be non-negative, got {}",
                self.scale_tolerance
            )));
        }
        if let Some(settings) = &self.multivariate {
            settings.validate()?;
        }
        Ok(())
    }
}
