/*!
# Proposal Adaptation

During the adaptive period the [`Adapter`] retunes the proposal every
`opt_freq` iterations so that acceptance rates approach the target `popt`.

- Univariate strategy: every free parameter's step is rescaled with
  [`scale_tuning`] from the acceptance rate observed since the previous
  checkpoint.
- Multivariate strategy, in two consecutive windows of the adaptive period:
  - covariance learning: each block covariance is blended with the empirical
    covariance of all states visited so far, `w · new + (1 − w) · old`;
  - scale tuning: each block scale whose acceptance rate misses `popt` by
    more than the relative tolerance is rescaled with [`scale_tuning`].

Counters are reset after every checkpoint. Once the adaptive period is over
the adapter does nothing and the last tuning is kept.
*/

use log::{debug, warn};
use ndarray::ArrayView2;

use crate::acceptance::Counters;
use crate::config::McmcConfig;
use crate::parameter::ParameterSpace;
use crate::proposal::{MultivariateState, ProposalStrategy, UnivariateState};
use crate::stats;

/// Lowest and highest acceptance rate fed into the tuning rule.
const PCUR_MIN: f64 = 0.01;
const PCUR_MAX: f64 = 0.99;

/**
Rescales a step (or block scale) toward the target acceptance rate.

`new = current · Φ⁻¹(popt / 2) / Φ⁻¹(pcur / 2)`, with `pcur` clamped to
`[0.01, 0.99]`. The result grows when `pcur > popt`, shrinks when
`pcur < popt`, and is always positive for a positive `current`.

```rust
use adaptive_mcmc::adapt::scale_tuning;

assert!(scale_tuning(1.0, 0.234, 0.5) > 1.0);
assert!(scale_tuning(1.0, 0.234, 0.1) < 1.0);
assert!((scale_tuning(1.0, 0.234, 0.234) - 1.0).abs() < 1e-12);
```
*/
pub fn scale_tuning(current: f64, popt: f64, pcur: f64) -> f64 {
    let pcur = pcur.clamp(PCUR_MIN, PCUR_MAX);
    current * stats::standard_normal_quantile(popt / 2.0)
        / stats::standard_normal_quantile(pcur / 2.0)
}

/// Which kind of tuning a checkpoint performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptPhase {
    /// Univariate step tuning.
    Steps,
    /// Multivariate, before covariance learning starts: counters reset only.
    Collecting,
    /// Multivariate covariance learning.
    Covariance,
    /// Multivariate scale tuning.
    Scale,
    /// Past the adaptive period.
    Off,
}

#[derive(Debug, Clone)]
pub struct Adapter {
    popt: f64,
    opt_freq: usize,
    adaptive_period: usize,
    covariance_start: f64,
    scale_start: f64,
    scale_tolerance: f64,
    multivariate: bool,
    free: Vec<usize>,
    labels: Vec<String>,
    /// Free coordinates of every state visited during adaptation, row-major.
    history: Vec<f64>,
}

impl Adapter {
    pub fn new(config: &McmcConfig, space: &ParameterSpace, strategy: &ProposalStrategy) -> Self {
        let multivariate = matches!(strategy, ProposalStrategy::Multivariate(_));
        let free = space.free_indices().to_vec();
        let history = if multivariate {
            Vec::with_capacity(config.adaptive_period * free.len())
        } else {
            Vec::new()
        };
        Self {
            popt: config.popt,
            opt_freq: config.opt_freq,
            adaptive_period: config.adaptive_period,
            covariance_start: config.covariance_start,
            scale_start: config.scale_start,
            scale_tolerance: config.scale_tolerance,
            multivariate,
            free,
            labels: strategy.unit_labels(space),
            history,
        }
    }

    /// True while `iteration` (1-based) lies inside the adaptive period.
    pub fn is_active(&self, iteration: usize) -> bool {
        iteration <= self.adaptive_period
    }

    pub fn is_checkpoint(&self, iteration: usize) -> bool {
        self.is_active(iteration) && iteration % self.opt_freq == 0
    }

    pub fn phase(&self, iteration: usize) -> AdaptPhase {
        if !self.is_active(iteration) {
            return AdaptPhase::Off;
        }
        if !self.multivariate {
            return AdaptPhase::Steps;
        }
        let i = iteration as f64;
        let period = self.adaptive_period as f64;
        if i <= self.covariance_start * period {
            AdaptPhase::Collecting
        } else if i <= self.scale_start * period {
            AdaptPhase::Covariance
        } else {
            AdaptPhase::Scale
        }
    }

    /// Number of states kept for covariance estimation.
    pub fn history_len(&self) -> usize {
        self.history.len() / self.free.len()
    }

    /// Remembers the chain's position after `iteration`; only needed for
    /// covariance learning.
    pub fn observe(&mut self, iteration: usize, values: &[f64]) {
        if self.multivariate && self.is_active(iteration) {
            self.history.extend(self.free.iter().map(|&i| values[i]));
        }
    }

    /// Tunes `strategy` if `iteration` is a checkpoint, then resets the
    /// counters. Returns the phase that was applied.
    pub fn checkpoint(
        &mut self,
        iteration: usize,
        strategy: &mut ProposalStrategy,
        counters: &mut Counters,
    ) -> Option<AdaptPhase> {
        if !self.is_checkpoint(iteration) {
            return None;
        }
        let phase = self.phase(iteration);
        match (phase, strategy) {
            (AdaptPhase::Steps, ProposalStrategy::Univariate(state)) => {
                self.tune_steps(iteration, state, counters)
            }
            (AdaptPhase::Covariance, ProposalStrategy::Multivariate(state)) => {
                self.learn_covariance(iteration, state)
            }
            (AdaptPhase::Scale, ProposalStrategy::Multivariate(state)) => {
                self.tune_scales(iteration, state, counters)
            }
            _ => {}
        }
        counters.reset();
        Some(phase)
    }

    fn tune_steps(&self, iteration: usize, state: &mut UnivariateState, counters: &Counters) {
        for (unit, label) in self.labels.iter().enumerate() {
            let Some(pcur) = counters.rate(unit) else {
                continue;
            };
            let i = state.parameter(unit);
            let step = scale_tuning(state.steps[i], self.popt, pcur).min(state.max_steps[i]);
            debug!(
                "iteration {iteration}: {label} acceptance {pcur:.3}, step {:.4} -> {step:.4}",
                state.steps[i]
            );
            state.steps[i] = step;
        }
    }

    fn learn_covariance(&self, iteration: usize, state: &mut MultivariateState) {
        let rows = self.history_len();
        let Ok(history) = ArrayView2::from_shape((rows, self.free.len()), &self.history[..]) else {
            return;
        };
        let w = state.w;
        for block in state.blocks.iter_mut() {
            let columns: Vec<usize> = block
                .indices
                .iter()
                .filter_map(|i| self.free.iter().position(|f| f == i))
                .collect();
            let Some(empirical) = stats::covariance(history, &columns) else {
                continue;
            };
            let blended = empirical * w + block.covariance() * (1.0 - w);
            if block.try_set_covariance(blended) {
                debug!(
                    "iteration {iteration}: block {} covariance updated from {rows} states",
                    block.id
                );
            } else {
                warn!(
                    "iteration {iteration}: blended covariance of block {} is not positive definite; keeping the previous one",
                    block.id
                );
            }
        }
    }

    fn tune_scales(&self, iteration: usize, state: &mut MultivariateState, counters: &Counters) {
        for (unit, block) in state.blocks.iter_mut().enumerate() {
            let Some(pcur) = counters.rate(unit) else {
                continue;
            };
            if (pcur - self.popt).abs() <= self.scale_tolerance * self.popt {
                continue;
            }
            let scale = scale_tuning(block.scale(), self.popt, pcur);
            debug!(
                "iteration {iteration}: {} acceptance {pcur:.3}, scale {:.4} -> {scale:.4}",
                self.labels[unit],
                block.scale()
            );
            block.set_scale(scale);
        }
    }
}
