//! Persistence of chain samples.

pub mod csv;
