//! Small random-draw helpers shared across sub-generators.
//!
//! Grounded on `fuel-tx::test_helper`'s `generate_bytes`/`generate_nonempty_padded_bytes`
//! free functions: tiny, rng-only helpers with no state of their own.

use rand::RngCore;

use crate::error::GenerateError;
use crate::generators::MAX_FRESH_VALUE_ATTEMPTS;

/// Draw values with `draw` until one passes `is_used` (i.e. is *not*
/// already in use), capped at [`MAX_FRESH_VALUE_ATTEMPTS`] attempts.
///
/// spec.md §9: "Random draws as infinite retry loops ... are safe because
/// in-use sets are tiny and domains are cryptographically large.
/// Implementers may cap retries ... and treat exhaustion as an internal
/// error" — this is that cap.
pub fn fresh_value<T>(
    rng: &mut dyn RngCore,
    mut draw: impl FnMut(&mut dyn RngCore) -> T,
    mut is_used: impl FnMut(&T) -> bool,
) -> Result<T, GenerateError> {
    for _ in 0..MAX_FRESH_VALUE_ATTEMPTS {
        let candidate = draw(rng);
        if !is_used(&candidate) {
            return Ok(candidate);
        }
    }
    Err(GenerateError::Internal(
        "exhausted retry budget drawing a fresh value".to_string(),
    ))
}
