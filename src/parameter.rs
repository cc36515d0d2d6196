/*!
# Parameter Space

A [`ParameterSpace`] is the ordered list of [`ParameterRecord`]s that make up a
model's parameter vector. Each record carries its bounds, an initial random-walk
step, whether it is held fixed, and which block it is updated with.

Fixed parameters keep their initial value for the whole run: they are never
proposed and never counted. Every state the sampler records lies inside the
bounds of every parameter.

```rust
use adaptive_mcmc::parameter::{ParameterRecord, ParameterSpace};

let space = ParameterSpace::new(vec![
    ParameterRecord::new("mu", 0.0, -10.0, 10.0).with_step(1.0),
    ParameterRecord::new("sigma", 1.0, 0.0, 5.0).with_step(0.5),
    ParameterRecord::new("max_titre", 8.0, 8.0, 8.0).fixed(),
])
.unwrap();

assert_eq!(space.len(), 3);
assert_eq!(space.free_indices(), &[0, 1]);
```
*/

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{McmcError, Result};

/// Description of a single model parameter.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterRecord {
    pub name: String,
    /// Starting value.
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Initial standard deviation of univariate random-walk proposals.
    pub step: f64,
    pub fixed: bool,
    /// Block this parameter is jointly proposed with in multivariate mode.
    pub block_id: usize,
}

impl ParameterRecord {
    /// A free parameter in block 0 with a unit step.
    pub fn new(name: impl Into<String>, value: f64, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            name: name.into(),
            value,
            lower_bound,
            upper_bound,
            step: 1.0,
            fixed: false,
            block_id: 0,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn in_block(mut self, block_id: usize) -> Self {
        self.block_id = block_id;
        self
    }

    /// Inclusive bounds check.
    pub fn contains(&self, x: f64) -> bool {
        self.lower_bound <= x && x <= self.upper_bound
    }

    /// Width of the admissible interval, infinite for unbounded parameters.
    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    fn validate(&self) -> Result<()> {
        if self.lower_bound.is_nan() || self.upper_bound.is_nan() {
            return Err(McmcError::parameter(&self.name, "bounds must not be NaN"));
        }
        if self.lower_bound > self.upper_bound {
            return Err(McmcError::parameter(
                &self.name,
                format!(
                    "lower bound {} exceeds upper bound {}",
                    self.lower_bound, self.upper_bound
                ),
            ));
        }
        if !self.value.is_finite() || !self.contains(self.value) {
            return Err(McmcError::parameter(
                &self.name,
                format!(
                    "initial value {} lies outside [{}, {}]",
                    self.value, self.lower_bound, self.upper_bound
                ),
            ));
        }
        if !self.fixed && !(self.step.is_finite() && self.step > 0.0) {
            return Err(McmcError::parameter(
                &self.name,
                format!("step must be finite and positive, got {}", self.step),
            ));
        }
        Ok(())
    }
}

/// The free coordinates updated together by one multivariate proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: usize,
    /// Indices into the parameter vector, ascending.
    pub indices: Vec<usize>,
}

/// Ordered, validated collection of parameter records.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    records: Vec<ParameterRecord>,
    free: Vec<usize>,
}

impl ParameterSpace {
    /// Validates the records and builds the space.
    ///
    /// Fails if a record has inverted or NaN bounds, a starting value outside
    /// its bounds, a non-positive step on a free parameter, a duplicated
    /// name, or if no parameter is free.
    pub fn new(records: Vec<ParameterRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        for record in &records {
            record.validate()?;
            if !seen.insert(record.name.as_str()) {
                return Err(McmcError::parameter(&record.name, "duplicated name"));
            }
        }
        let free: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.fixed)
            .map(|(i, _)| i)
            .collect();
        if free.is_empty() {
            return Err(McmcError::Config(
                "the parameter space has no free parameters".to_string(),
            ));
        }
        Ok(Self { records, free })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ParameterRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    /// Indices of the non-fixed parameters, in space order.
    pub fn free_indices(&self) -> &[usize] {
        &self.free
    }

    pub fn initial_values(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.value).collect()
    }

    pub fn initial_steps(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.step).collect()
    }

    /// True when every free coordinate of `values` lies within its bounds.
    pub fn in_bounds(&self, values: &[f64]) -> bool {
        self.free
            .iter()
            .all(|&i| self.records[i].contains(values[i]))
    }

    /// Groups the free parameters by block id, ascending. Blocks containing
    /// only fixed parameters do not appear.
    pub fn blocks(&self) -> Vec<Block> {
        let mut by_id: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for &i in &self.free {
            by_id.entry(self.records[i].block_id).or_default().push(i);
        }
        by_id
            .into_iter()
            .map(|(id, indices)| Block { id, indices })
            .collect()
    }

    /// Replaces the starting value of every free parameter with a uniform
    /// draw from its bounds.
    pub fn randomize_start<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        for &i in &self.free {
            let record = &self.records[i];
            if !record.width().is_finite() {
                return Err(McmcError::parameter(
                    &record.name,
                    "cannot draw a starting value from unbounded support",
                ));
            }
        }
        for &i in &self.free {
            let record = &mut self.records[i];
            record.value = if record.lower_bound == record.upper_bound {
                record.lower_bound
            } else {
                rng.gen_range(record.lower_bound..=record.upper_bound)
            };
        }
        Ok(())
    }
}
