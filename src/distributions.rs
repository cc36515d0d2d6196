/*!
Traits through which the sampler sees the model, plus a few toy targets.

The sampler only ever asks one question of the model: "what is the
log-posterior at this parameter vector?". Anything implementing
[`PosteriorOracle`] can answer it, including plain closures. A model that
separates its prior from its likelihood can be assembled with [`Posterior`].

A non-finite answer (`-inf` or `NaN`) marks the candidate as invalid; the
sampler rejects it instead of failing.

# Examples

```rust
use adaptive_mcmc::distributions::{Gaussian2D, PosteriorOracle};
use ndarray::{arr1, arr2};

// Closures are oracles.
let neg_sum_sq = |theta: &[f64]| -theta.iter().map(|x| x * x).sum::<f64>();
assert_eq!(neg_sum_sq.log_posterior(&[1.0, 2.0]), -5.0);

let target = Gaussian2D {
    mean: arr1(&[0.0, 0.0]),
    cov: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
};
assert_eq!(target.log_posterior(&[0.0, 0.0]), 0.0);
```
*/

use ndarray::{Array1, Array2};

use crate::parameter::ParameterSpace;

/// Unnormalized log-posterior of a parameter vector.
///
/// Implementations must be deterministic. They are only called on vectors
/// whose free coordinates lie within bounds.
pub trait PosteriorOracle {
    fn log_posterior(&self, theta: &[f64]) -> f64;
}

impl<F> PosteriorOracle for F
where
    F: Fn(&[f64]) -> f64,
{
    fn log_posterior(&self, theta: &[f64]) -> f64 {
        self(theta)
    }
}

/// Log prior density over a parameter space.
///
/// The space gives access to names and bounds, so priors can be written
/// against parameter names rather than positions.
pub trait Prior {
    fn log_prior(&self, theta: &[f64], space: &ParameterSpace) -> f64;
}

/// Flat prior over the bounded box: zero inside, `-inf` outside.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformPrior;

impl Prior for UniformPrior {
    fn log_prior(&self, theta: &[f64], space: &ParameterSpace) -> f64 {
        if space.in_bounds(theta) {
            0.0
        } else {
            f64::NEG_INFINITY
        }
    }
}

/// Prior times likelihood.
///
/// The likelihood is skipped when the prior is already non-finite.
#[derive(Debug, Clone)]
pub struct Posterior<P, L> {
    space: ParameterSpace,
    prior: P,
    likelihood: L,
}

impl<P, L> Posterior<P, L>
where
    P: Prior,
    L: Fn(&[f64]) -> f64,
{
    pub fn new(space: ParameterSpace, prior: P, likelihood: L) -> Self {
        Self {
            space,
            prior,
            likelihood,
        }
    }
}

impl<P, L> PosteriorOracle for Posterior<P, L>
where
    P: Prior,
    L: Fn(&[f64]) -> f64,
{
    fn log_posterior(&self, theta: &[f64]) -> f64 {
        let lp = self.prior.log_prior(theta, &self.space);
        if !lp.is_finite() {
            return lp;
        }
        lp + (self.likelihood)(theta)
    }
}

/**
A 2D Gaussian target with a full covariance matrix.

```rust
use adaptive_mcmc::distributions::{Gaussian2D, PosteriorOracle};
use ndarray::{arr1, arr2};

let target = Gaussian2D {
    mean: arr1(&[1.0, -1.0]),
    cov: arr2(&[[2.0, 0.5], [0.5, 1.0]]),
};
assert!(target.log_posterior(&[1.0, -1.0]) > target.log_posterior(&[0.0, 0.0]));
```
*/
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian2D {
    pub mean: Array1<f64>,
    pub cov: Array2<f64>,
}

impl PosteriorOracle for Gaussian2D {
    fn log_posterior(&self, theta: &[f64]) -> f64 {
        let (a, b, c, d) = (
            self.cov[(0, 0)],
            self.cov[(0, 1)],
            self.cov[(1, 0)],
            self.cov[(1, 1)],
        );
        let det = a * d - b * c;
        let x0 = theta[0] - self.mean[0];
        let x1 = theta[1] - self.mean[1];
        // (x - mu)^T Sigma^{-1} (x - mu) with the closed-form 2x2 inverse
        let quad = (d * x0 * x0 - (b + c) * x0 * x1 + a * x1 * x1) / det;
        -0.5 * quad
    }
}

/// Independent zero-mean Gaussians with a common standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotropicGaussian {
    pub std: f64,
}

impl IsotropicGaussian {
    pub fn new(std: f64) -> Self {
        Self { std }
    }
}

impl PosteriorOracle for IsotropicGaussian {
    fn log_posterior(&self, theta: &[f64]) -> f64 {
        let sum_sq: f64 = theta.iter().map(|x| x * x).sum();
        -0.5 * sum_sq / (self.std * self.std)
    }
}
