//! Error type shared by every fallible operation in the crate.
//!
//! Rejected proposals are not errors: they are reported through
//! [`crate::acceptance::Decision`]. Only configuration faults and I/O faults
//! end a run early.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a run before or while it executes.
#[derive(Debug, Error)]
pub enum McmcError {
    /// A missing or out-of-range MCMC option.
    #[error("invalid MCMC configuration: {0}")]
    Config(String),

    /// A parameter record that cannot be sampled.
    #[error("invalid parameter `{name}`: {reason}")]
    Parameter { name: String, reason: String },

    /// An initial proposal covariance with the wrong shape or no Cholesky factor.
    #[error("invalid proposal covariance: {0}")]
    Covariance(String),

    #[error("I/O failure on chain file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV failure on chain file {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A chain file that does not follow the `sampno,<names>,lnlike` layout.
    #[error("malformed chain file {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
}

impl McmcError {
    pub(crate) fn parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        McmcError::Parameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        McmcError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        McmcError::Csv {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = McmcError> = std::result::Result<T, E>;
