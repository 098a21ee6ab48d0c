//! spec.md §4.10b — `CallJournalGenerator`: the running tally of calls made
//! so far in the current frame.

use std::fmt;

use rand::{Rng, RngCore};

use crate::error::GenerateError;
use crate::solver::RangeSolver;
use crate::state::CallJournal;

#[derive(Debug, Clone, Default)]
pub struct CallJournalGenerator {
    call_count: RangeSolver<u64>,
    last_call_succeeded: Option<bool>,
}

impl CallJournalGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call_count_min(&mut self, min: u64) {
        self.call_count.add_lower_boundary(min);
    }

    pub fn add_call_count_max(&mut self, max: u64) {
        self.call_count.add_upper_boundary(max);
    }

    pub fn set_last_call_succeeded(&mut self, succeeded: bool) {
        self.last_call_succeeded = Some(succeeded);
    }

    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<CallJournal, GenerateError> {
        let call_count = self.call_count.generate(rng)? as u32;
        let last_call_succeeded = if call_count == 0 {
            false
        } else {
            self.last_call_succeeded.unwrap_or_else(|| rng.gen_bool(0.5))
        };
        Ok(CallJournal { call_count, last_call_succeeded })
    }

    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub fn restore(&mut self, other: &Self) {
        *self = other.clone();
    }
}

impl fmt::Display for CallJournalGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callCount: {}", self.call_count)?;
        if let Some(s) = self.last_call_succeeded {
            write!(f, ",lastCallSucceeded={s}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn zero_call_count_forces_last_call_not_succeeded() {
        let mut g = CallJournalGenerator::new();
        g.add_call_count_min(0);
        g.add_call_count_max(0);
        let mut rng = StdRng::seed_from_u64(1);
        let journal = g.generate(&mut rng).unwrap();
        assert_eq!(journal.call_count, 0);
        assert!(!journal.last_call_succeeded);
    }
}
