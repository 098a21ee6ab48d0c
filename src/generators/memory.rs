//! spec.md §4.5 — `MemoryGenerator`: no constraints, 32-byte-aligned random
//! memory, since EVM memory only ever grows in 32-byte quanta.

use std::fmt;

use rand::{Rng, RngCore};

use crate::error::GenerateError;
use crate::evm::random_bytes;
use crate::state::Memory;

/// Largest number of 32-byte words this generator will produce, chosen to
/// keep generated states small while still exercising multi-word memory.
const MAX_WORDS: usize = 9;

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryGenerator;

impl MemoryGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, rng: &mut dyn RngCore) -> Result<Memory, GenerateError> {
        let words = rng.gen_range(0..=MAX_WORDS);
        Ok(Memory::new(random_bytes(rng, words * 32)))
    }

    pub fn clone_store(&self) -> Self {
        *self
    }

    pub fn restore(&mut self, other: &Self) {
        *self = *other;
    }
}

impl fmt::Display for MemoryGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memory[0..{MAX_WORDS}*32]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn length_is_always_a_multiple_of_32() {
        let g = MemoryGenerator::new();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let mem = g.generate(&mut rng).unwrap();
            assert_eq!(mem.len() % 32, 0);
            assert!(mem.len() <= MAX_WORDS * 32);
        }
    }
}
