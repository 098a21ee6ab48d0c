//! Constraint-based state generator for an EVM conformance-testing
//! framework: given declarative constraints over a symbolic EVM execution
//! state, synthesize a concrete state that satisfies every constraint while
//! randomizing every unconstrained degree of freedom.
//!
//! The entry point is [`state_generator::StateGenerator`]: a builder whose
//! constraint methods are void mutators, terminated by
//! [`state_generator::StateGenerator::generate`].

pub mod code;
pub mod error;
pub mod evm;
pub mod generators;
mod rand_util;
pub mod solver;
pub mod state;
pub mod state_generator;
pub mod variable;

pub use error::{GenerateError, Result, UnsatisfiableReason};
pub use state::State;
pub use state_generator::StateGenerator;
pub use variable::{Assignment, Variable};
