//! Public error surface for the generator.

use crate::variable::Variable;
use thiserror::Error;

/// Errors a sub-generator or the orchestrator can raise while synthesizing a
/// state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerateError {
    /// The constraint set handed to a generator is contradictory: no state
    /// can simultaneously satisfy every constraint.
    #[error("unsatisfiable: {0}")]
    Unsatisfiable(#[from] UnsatisfiableReason),

    /// A constraint referenced a [`Variable`] that no earlier stage bound
    /// and that has no pre-assignment. Only [`crate::generators::stack::StackGenerator`]
    /// raises this (spec.md §7): every other stage binds variables on demand.
    #[error("unbound variable {0}")]
    UnboundVariable(Variable),

    /// A bookkeeping loop (e.g. "draw a fresh unused address") exhausted its
    /// retry budget. This should be astronomically unlikely given the size
    /// of the domains involved; if it fires in practice, it indicates the
    /// in-use set has grown pathologically large relative to the domain.
    #[error("internal error: {0}")]
    Internal(String),
}

/// The specific conflict behind an [`GenerateError::Unsatisfiable`].
///
/// Kept as its own type (rather than folding the message into
/// `GenerateError` directly) so callers can match on *kind* of conflict
/// without string parsing, while `Display` still produces the
/// human-readable diagnostic spec.md §7 asks for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnsatisfiableReason {
    /// Two constraints pin the same scalar field (status, PC, self-address,
    /// revision, ...) to different values, or more than one is allowed.
    #[error("conflicting constraints on {field}: {detail}")]
    ConflictingConstraint { field: &'static str, detail: String },

    /// A [`crate::solver::range::RangeSolver`] or
    /// [`crate::solver::interval::IntervalSolver`] domain became empty after
    /// tightening.
    #[error("empty domain for {field}: {detail}")]
    EmptyDomain { field: &'static str, detail: String },

    /// A position, key, or variable is out of range for its target (code
    /// size, stack size, etc).
    #[error("{what} out of range: {detail}")]
    OutOfRange { what: &'static str, detail: String },

    /// Generic fallback for conflicts that don't fit the shapes above,
    /// e.g. a storage slot with two different requested `StorageStatus`es.
    #[error("{0}")]
    Other(String),
}

impl UnsatisfiableReason {
    pub fn conflict(field: &'static str, detail: impl Into<String>) -> Self {
        Self::ConflictingConstraint { field, detail: detail.into() }
    }

    pub fn empty_domain(field: &'static str, detail: impl Into<String>) -> Self {
        Self::EmptyDomain { field, detail: detail.into() }
    }

    pub fn out_of_range(what: &'static str, detail: impl Into<String>) -> Self {
        Self::OutOfRange { what, detail: detail.into() }
    }
}

impl From<&str> for UnsatisfiableReason {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for UnsatisfiableReason {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, GenerateError>;
