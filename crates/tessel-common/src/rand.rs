pub use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::Numeric;

/// Returns a deterministic random number generator for the given seed.
#[inline(always)]
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Samples `len` values on a coarse grid so that products and short sums stay exact.
///
/// Float types get multiples of `1/8` in `[-1, 1]`, integer types get integers in `[-8, 8]`.
pub fn sample_quantized<E: Numeric>(rng: &mut StdRng, len: usize) -> Vec<E> {
    (0..len)
        .map(|_| {
            let step = rng.random_range(-8i32..=8);
            if E::IS_FLOAT {
                E::cast_from(step as f32 / 8.0)
            } else {
                E::cast_from(step)
            }
        })
        .collect()
}
