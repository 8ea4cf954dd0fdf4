//! Error types shared by every module of the crate.
//!
//! Only caller bugs and configuration problems are errors. A genotype that
//! decodes into a disconnected or over-wired network is an ordinary outcome
//! and is reported through [`Vitality`](crate::population::Vitality) instead.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FogError>;

/// Errors raised by genotype, topology, engine and configuration code.
#[derive(Error, Debug)]
pub enum FogError {
    /// A genotype was used before `create()` or deserialization populated it.
    #[error("{operation}: genotype has not been initialized")]
    Uninitialized {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// Crossover between genotypes with different structural parameters.
    #[error("incompatible genotypes: {parameter} differs ({left} vs {right})")]
    IncompatibleGenotype {
        /// Name of the mismatching structural parameter.
        parameter: &'static str,
        /// Value on the receiving genotype.
        left: usize,
        /// Value on the other genotype.
        right: usize,
    },

    /// Input data violates a structural invariant (wrong vector length,
    /// empty network tier, out-of-range node index, ...).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A hyperparameter is out of range.
    #[error("invalid configuration for `{parameter}`: {reason}")]
    Config {
        /// The offending hyperparameter.
        parameter: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A textual description (genotype, layout, report) could not be parsed.
    #[error("parse error on line {line}: {reason}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// Population initialization gave up looking for viable individuals.
    #[error("no viable individual found after {attempts} attempts")]
    PopulationExhausted {
        /// Number of random genotypes tried for a single slot.
        attempts: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FogError {
    pub(crate) fn config(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            parameter,
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }
}
