/*!
# Metropolis Acceptance

The [`AcceptanceController`] decides whether a candidate replaces the current
state:

1. A candidate with any free coordinate outside its bounds is rejected
   without calling the posterior oracle.
2. Otherwise the oracle is evaluated and
   `log_ratio = min(new_lp - current_lp, 0)`.
3. The candidate is accepted iff the new log-posterior is finite and
   `ln(u) < log_ratio` for `u ~ Uniform[0, 1)`.

No Hastings correction is applied, which is exact for the symmetric
random-walk proposals in [`crate::proposal`].
*/

use rand::Rng;

use crate::distributions::PosteriorOracle;
use crate::parameter::ParameterSpace;

/// Proposal and acceptance tallies for one unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitCounter {
    pub proposed: u64,
    pub accepted: u64,
}

impl UnitCounter {
    /// Empirical acceptance rate, `None` if nothing was proposed.
    pub fn rate(&self) -> Option<f64> {
        (self.proposed > 0).then(|| self.accepted as f64 / self.proposed as f64)
    }
}

/// Tallies for every unit (free parameter or block) since the last reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counters {
    units: Vec<UnitCounter>,
}

impl Counters {
    pub fn new(n_units: usize) -> Self {
        Self {
            units: vec![UnitCounter::default(); n_units],
        }
    }

    pub fn record_proposal(&mut self, unit: usize) {
        self.units[unit].proposed += 1;
    }

    pub fn record_acceptance(&mut self, unit: usize) {
        self.units[unit].accepted += 1;
    }

    pub fn get(&self, unit: usize) -> UnitCounter {
        self.units[unit]
    }

    pub fn rate(&self, unit: usize) -> Option<f64> {
        self.units[unit].rate()
    }

    /// Acceptance rate per unit, NaN for units with no proposals.
    pub fn rates(&self) -> Vec<f64> {
        self.units
            .iter()
            .map(|c| c.rate().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitCounter> {
        self.units.iter()
    }

    pub fn reset(&mut self) {
        self.units.iter_mut().for_each(|c| *c = UnitCounter::default());
    }
}

/// Current position of the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainState {
    pub values: Vec<f64>,
    pub log_posterior: f64,
}

/// Why a candidate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A free coordinate left its bounds; the oracle was not called.
    OutOfBounds,
    /// The oracle returned `-inf` or NaN.
    NonFinite,
    /// The uniform draw exceeded the acceptance probability.
    Metropolis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accepted,
    Rejected(Rejection),
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// `min(proposed - current, 0)`, or `None` when the candidate cannot be accepted.
///
/// A current log-posterior of `-inf` lets any finite candidate through.
pub fn log_acceptance_ratio(current: f64, proposed: f64) -> Option<f64> {
    if !proposed.is_finite() {
        return None;
    }
    let ratio = (proposed - current).min(0.0);
    ratio.is_finite().then_some(ratio)
}

/// Applies the bounds check and the Metropolis rule.
#[derive(Debug, Clone)]
pub struct AcceptanceController {
    space: ParameterSpace,
}

impl AcceptanceController {
    pub fn new(space: ParameterSpace) -> Self {
        Self { space }
    }

    /// Decides on `candidate`, moving `state` and bumping the unit's
    /// acceptance counter when it is accepted.
    pub fn decide<O, R>(
        &self,
        state: &mut ChainState,
        candidate: Vec<f64>,
        unit: usize,
        counters: &mut Counters,
        oracle: &O,
        rng: &mut R,
    ) -> Decision
    where
        O: PosteriorOracle + ?Sized,
        R: Rng + ?Sized,
    {
        if !self.space.in_bounds(&candidate) {
            return Decision::Rejected(Rejection::OutOfBounds);
        }
        let proposed_lp = oracle.log_posterior(&candidate);
        let Some(log_ratio) = log_acceptance_ratio(state.log_posterior, proposed_lp) else {
            return Decision::Rejected(Rejection::NonFinite);
        };
        let u: f64 = rng.gen();
        if u.ln() < log_ratio {
            state.values = candidate;
            state.log_posterior = proposed_lp;
            counters.record_acceptance(unit);
            Decision::Accepted
        } else {
            Decision::Rejected(Rejection::Metropolis)
        }
    }
}
