/*!
# Proposal Generation

Two interchangeable strategies produce candidate parameter vectors:

- [`ProposalStrategy::Univariate`]: one free parameter at a time, perturbed by
  `N(0, step²)`.
- [`ProposalStrategy::Multivariate`]: one block of free parameters at a time,
  perturbed jointly by `N(0, scale · Σ_block)`.

Both are symmetric random walks, so the acceptance step needs no Hastings
correction. Candidates are not clamped to the bounds; the caller rejects
out-of-range candidates.

The [`ProposalGenerator`] walks the units (parameters or blocks) in a fixed
cyclic order given by [`RoundRobin`].
*/

use nalgebra as na;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::acceptance::Counters;
use crate::config::MultivariateSettings;
use crate::error::{McmcError, Result};
use crate::parameter::ParameterSpace;
use crate::stats;

/// Endless cyclic iterator over `0..len`.
///
/// ```rust
/// use adaptive_mcmc::proposal::RoundRobin;
///
/// let order: Vec<usize> = RoundRobin::new(3).take(7).collect();
/// assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRobin {
    len: usize,
    next: usize,
}

impl RoundRobin {
    pub fn new(len: usize) -> Self {
        Self { len, next: 0 }
    }

    /// Starts the cycle over from the first unit.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Iterator for RoundRobin {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let current = self.next;
        self.next = (self.next + 1) % self.len;
        Some(current)
    }
}

/// Per-parameter random-walk steps.
#[derive(Debug, Clone, PartialEq)]
pub struct UnivariateState {
    /// Standard deviation of the proposal for each parameter, index-aligned
    /// with the parameter space. Entries of fixed parameters are never used.
    pub steps: Vec<f64>,
    /// Largest step each parameter may be tuned to.
    pub max_steps: Vec<f64>,
    units: Vec<usize>,
}

impl UnivariateState {
    pub fn new(space: &ParameterSpace) -> Self {
        let max_steps = space
            .records()
            .iter()
            .map(|r| {
                if r.width().is_finite() && r.width() > 0.0 {
                    r.width()
                } else {
                    f64::INFINITY
                }
            })
            .collect();
        Self {
            steps: space.initial_steps(),
            max_steps,
            units: space.free_indices().to_vec(),
        }
    }

    /// Parameter index updated by `unit`.
    pub fn parameter(&self, unit: usize) -> usize {
        self.units[unit]
    }
}

/// Joint proposal for one block of free parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockProposal {
    pub id: usize,
    /// Parameter indices in this block, ascending.
    pub indices: Vec<usize>,
    covariance: na::DMatrix<f64>,
    scale: f64,
    factor: na::DMatrix<f64>,
}

impl BlockProposal {
    /// Fails when `covariance` has no Cholesky factor.
    pub fn new(
        id: usize,
        indices: Vec<usize>,
        covariance: na::DMatrix<f64>,
        scale: f64,
    ) -> Result<Self> {
        if covariance.shape() != (indices.len(), indices.len()) {
            return Err(McmcError::Covariance(format!(
                "block {id} has {} free parameters but a {}x{} covariance",
                indices.len(),
                covariance.nrows(),
                covariance.ncols()
            )));
        }
        let factor = stats::scaled_cholesky(&covariance, 1.0).ok_or_else(|| {
            McmcError::Covariance(format!(
                "covariance of block {id} is not symmetric positive definite"
            ))
        })?;
        Ok(Self {
            id,
            indices,
            covariance,
            scale,
            factor,
        })
    }

    pub fn covariance(&self) -> &na::DMatrix<f64> {
        &self.covariance
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f64) {
        self.scale = scale;
    }

    /// Installs `covariance` if it is positive definite. Otherwise the
    /// current covariance stays in place and `false` is returned.
    pub fn try_set_covariance(&mut self, covariance: na::DMatrix<f64>) -> bool {
        if covariance.shape() != self.covariance.shape() {
            return false;
        }
        match stats::scaled_cholesky(&covariance, 1.0) {
            Some(factor) => {
                self.covariance = covariance;
                self.factor = factor;
                true
            }
            None => false,
        }
    }

    fn perturb<R: Rng + ?Sized>(&self, candidate: &mut [f64], rng: &mut R) {
        let z = na::DVector::<f64>::from_fn(self.indices.len(), |_, _| rng.sample(StandardNormal));
        let delta = &self.factor * z * self.scale.sqrt();
        for (k, &i) in self.indices.iter().enumerate() {
            candidate[i] += delta[k];
        }
    }
}

/// Block covariances and scales.
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateState {
    /// One entry per block, ordered by block id.
    pub blocks: Vec<BlockProposal>,
    /// Weight of the new empirical covariance when blending.
    pub w: f64,
}

impl MultivariateState {
    /// Splits the configured covariance over all free parameters into one
    /// sub-matrix per block.
    pub fn new(space: &ParameterSpace, settings: &MultivariateSettings) -> Result<Self> {
        let free = space.free_indices();
        let n = free.len();
        if settings.covariance.len() != n {
            return Err(McmcError::Covariance(format!(
                "expected {n} rows (one per free parameter), got {}",
                settings.covariance.len()
            )));
        }
        if let Some((r, row)) = settings
            .covariance
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n)
        {
            return Err(McmcError::Covariance(format!(
                "row {r} has {} entries, expected {n}",
                row.len()
            )));
        }
        let full = na::DMatrix::from_fn(n, n, |i, j| settings.covariance[i][j]);
        if !stats::is_symmetric(&full) {
            return Err(McmcError::Covariance("matrix is not symmetric".to_string()));
        }

        let blocks = space
            .blocks()
            .into_iter()
            .map(|block| {
                let positions: Vec<usize> = block
                    .indices
                    .iter()
                    .map(|i| free.iter().position(|f| f == i).unwrap_or_default())
                    .collect();
                let sub = full.select_rows(&positions).select_columns(&positions);
                BlockProposal::new(block.id, block.indices, sub, settings.scale)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            blocks,
            w: settings.w,
        })
    }
}

/// The active proposal strategy and all of its tunable state.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalStrategy {
    Univariate(UnivariateState),
    Multivariate(MultivariateState),
}

impl ProposalStrategy {
    /// Multivariate when `settings` are given, univariate otherwise.
    pub fn from_settings(
        space: &ParameterSpace,
        settings: Option<&MultivariateSettings>,
    ) -> Result<Self> {
        match settings {
            Some(settings) => Ok(ProposalStrategy::Multivariate(MultivariateState::new(
                space, settings,
            )?)),
            None => Ok(ProposalStrategy::Univariate(UnivariateState::new(space))),
        }
    }

    /// Number of units visited by the round-robin cycle.
    pub fn n_units(&self) -> usize {
        match self {
            ProposalStrategy::Univariate(state) => state.units.len(),
            ProposalStrategy::Multivariate(state) => state.blocks.len(),
        }
    }

    /// Human-readable name of each unit, for logging.
    pub fn unit_labels(&self, space: &ParameterSpace) -> Vec<String> {
        match self {
            ProposalStrategy::Univariate(state) => state
                .units
                .iter()
                .map(|&i| space.records()[i].name.clone())
                .collect(),
            ProposalStrategy::Multivariate(state) => state
                .blocks
                .iter()
                .map(|b| format!("block {}", b.id))
                .collect(),
        }
    }

    /// Candidate that differs from `current` only in the coordinates of `unit`.
    pub fn propose<R: Rng + ?Sized>(&self, unit: usize, current: &[f64], rng: &mut R) -> Vec<f64> {
        let mut candidate = current.to_vec();
        match self {
            ProposalStrategy::Univariate(state) => {
                let i = state.units[unit];
                let z: f64 = rng.sample(StandardNormal);
                candidate[i] += state.steps[i] * z;
            }
            ProposalStrategy::Multivariate(state) => {
                state.blocks[unit].perturb(&mut candidate, rng);
            }
        }
        candidate
    }
}

/// Produces one candidate per iteration, cycling through the units.
#[derive(Debug, Clone)]
pub struct ProposalGenerator {
    strategy: ProposalStrategy,
    order: RoundRobin,
}

impl ProposalGenerator {
    pub fn new(strategy: ProposalStrategy) -> Self {
        let order = RoundRobin::new(strategy.n_units());
        Self { strategy, order }
    }

    pub fn strategy(&self) -> &ProposalStrategy {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut ProposalStrategy {
        &mut self.strategy
    }

    pub fn into_strategy(self) -> ProposalStrategy {
        self.strategy
    }

    /// Picks the next unit, counts it as proposed and returns it together
    /// with the candidate vector.
    pub fn propose<R: Rng + ?Sized>(
        &mut self,
        current: &[f64],
        counters: &mut Counters,
        rng: &mut R,
    ) -> (usize, Vec<f64>) {
        // `n_units() >= 1` because the parameter space has a free parameter.
        let unit = self.order.next().unwrap_or(0);
        counters.record_proposal(unit);
        (unit, self.strategy.propose(unit, current, rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterRecord;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn space() -> ParameterSpace {
        ParameterSpace::new(vec![
            ParameterRecord::new("a", 0.0, -5.0, 5.0).in_block(0),
            ParameterRecord::new("fixed", 1.0, 0.0, 2.0).fixed().in_block(0),
            ParameterRecord::new("b", 0.0, -5.0, 5.0).in_block(1),
            ParameterRecord::new("c", 0.0, -5.0, 5.0).in_block(0),
        ])
        .unwrap()
    }

    #[test]
    fn round_robin_restarts() {
        let mut rr = RoundRobin::new(2);
        assert_eq!(rr.next(), Some(0));
        rr.reset();
        assert_eq!(rr.next(), Some(0));
        assert_eq!(rr.next(), Some(1));
        assert_eq!(rr.next(), Some(0));
        assert_eq!(RoundRobin::new(0).next(), None);
    }

    #[test]
    fn univariate_changes_only_the_selected_parameter() {
        let space = space();
        let strategy = ProposalStrategy::from_settings(&space, None).unwrap();
        let mut generator = ProposalGenerator::new(strategy);
        let mut counters = Counters::new(generator.strategy().n_units());
        let mut rng = SmallRng::seed_from_u64(1);
        let current = space.initial_values();

        let expected_params = [0, 2, 3, 0, 2, 3];
        for &param in &expected_params {
            let (_, candidate) = generator.propose(&current, &mut counters, &mut rng);
            for i in 0..current.len() {
                if i == param {
                    assert_ne!(candidate[i], current[i]);
                } else {
                    assert_eq!(candidate[i], current[i]);
                }
            }
        }
        assert!(counters.iter().all(|c| c.proposed == 2 && c.accepted == 0));
    }

    #[test]
    fn multivariate_splits_covariance_per_block() {
        let space = space();
        // free parameters in order: a, b, c
        let settings = MultivariateSettings::new(vec![
            vec![1.0, 0.0, 0.3],
            vec![0.0, 2.0, 0.0],
            vec![0.3, 0.0, 1.5],
        ]);
        let strategy = ProposalStrategy::from_settings(&space, Some(&settings)).unwrap();
        let ProposalStrategy::Multivariate(state) = &strategy else {
            panic!("expected a multivariate strategy");
        };
        assert_eq!(state.blocks.len(), 2);
        assert_eq!(state.blocks[0].id, 0);
        assert_eq!(state.blocks[0].indices, vec![0, 3]);
        assert_eq!(
            state.blocks[0].covariance(),
            &na::DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.5])
        );
        assert_eq!(state.blocks[1].indices, vec![2]);
        assert_eq!(state.blocks[1].covariance()[(0, 0)], 2.0);
    }

    #[test]
    fn multivariate_changes_only_the_selected_block() {
        let space = space();
        let settings = MultivariateSettings::identity(3);
        let strategy = ProposalStrategy::from_settings(&space, Some(&settings)).unwrap();
        let mut rng = SmallRng::seed_from_u64(3);
        let current = space.initial_values();

        let candidate = strategy.propose(0, &current, &mut rng);
        assert_ne!(candidate[0], current[0]);
        assert_eq!(candidate[1], current[1]);
        assert_eq!(candidate[2], current[2]);
        assert_ne!(candidate[3], current[3]);

        let candidate = strategy.propose(1, &current, &mut rng);
        assert_eq!(candidate[0], current[0]);
        assert_ne!(candidate[2], current[2]);
        assert_eq!(candidate[3], current[3]);
    }

    #[test]
    fn wrong_dimension_covariance_is_rejected() {
        let space = space();
        let err = ProposalStrategy::from_settings(&space, Some(&MultivariateSettings::identity(4)))
            .unwrap_err();
        assert!(matches!(err, McmcError::Covariance(_)));

        let ragged = MultivariateSettings::new(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0],
            vec![0.0, 0.0, 1.0],
        ]);
        assert!(ProposalStrategy::from_settings(&space, Some(&ragged)).is_err());
    }

    #[test]
    fn indefinite_covariance_is_rejected() {
        let space = ParameterSpace::new(vec![
            ParameterRecord::new("a", 0.0, -5.0, 5.0),
            ParameterRecord::new("b", 0.0, -5.0, 5.0),
        ])
        .unwrap();
        let settings = MultivariateSettings::new(vec![vec![1.0, 2.0], vec![2.0, 1.0]]);
        assert!(ProposalStrategy::from_settings(&space, Some(&settings)).is_err());
    }

    #[test]
    fn failed_covariance_update_keeps_previous() {
        let mut block =
            BlockProposal::new(0, vec![0, 1], na::DMatrix::identity(2, 2), 1.0).unwrap();
        let bad = na::DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(!block.try_set_covariance(bad));
        assert_eq!(block.covariance(), &na::DMatrix::identity(2, 2));

        let good = na::DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        assert!(block.try_set_covariance(good.clone()));
        assert_eq!(block.covariance(), &good);
    }

    #[test]
    fn block_draws_follow_scaled_covariance() {
        let cov = na::DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let block = BlockProposal::new(0, vec![0, 1], cov, 0.5).unwrap();
        let mut rng = SmallRng::seed_from_u64(11);
        let n = 20_000;
        let mut sum = na::DMatrix::<f64>::zeros(2, 2);
        for _ in 0..n {
            let mut x = vec![0.0, 0.0];
            block.perturb(&mut x, &mut rng);
            let v = na::DVector::from_vec(x);
            sum += &v * v.transpose();
        }
        let emp = sum / n as f64;
        assert!((emp[(0, 0)] - 2.0).abs() < 0.1, "{emp}");
        assert!((emp[(0, 1)] - 1.0).abs() < 0.1, "{emp}");
        assert!((emp[(1, 1)] - 1.5).abs() < 0.1, "{emp}");
    }
}
