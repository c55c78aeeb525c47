//! Seedable random source for parent, operator and strategy selection.

use rand::prelude::*;
use rand::seq::index;

/// Random number generator wrapper for selection decisions.
///
/// Every random choice the engine makes goes through this type, so two runs
/// built from the same seed make identical choices.
#[derive(Debug, Clone)]
pub struct SearchRng {
    rng: StdRng,
}

impl SearchRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Uniform draw from `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    /// Uniform index into a slice of length `len`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// Two distinct indices into a slice of length `len` (`len >= 2`).
    pub fn pick_two(&mut self, len: usize) -> (usize, usize) {
        let picked = index::sample(&mut self.rng, len, 2);
        (picked.index(0), picked.index(1))
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}
