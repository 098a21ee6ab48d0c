//! spec.md §4.10d — `SelfDestructedGenerator`: the single boolean
//! self-destruct flag on the symbolic state.

use std::fmt;

use rand::{Rng, RngCore};

use crate::error::GenerateError;

#[derive(Debug, Clone, Copy, Default)]
pub struct SelfDestructedGenerator {
    value: Option<bool>,
}

impl SelfDestructedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, value: bool) {
        self.value = Some(value);
    }

    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<bool, GenerateError> {
        match self.value {
            Some(v) => Ok(v),
            None => Ok(rng.gen_bool(0.1)),
        }
    }

    pub fn clone_store(&self) -> Self {
        *self
    }

    pub fn restore(&mut self, other: &Self) {
        *self = *other;
    }
}

impl fmt::Display for SelfDestructedGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "selfDestructed={v}"),
            None => write!(f, "selfDestructed=?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn set_value_is_respected() {
        let mut g = SelfDestructedGenerator::new();
        g.set(true);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(g.generate(&mut rng).unwrap());
    }
}
