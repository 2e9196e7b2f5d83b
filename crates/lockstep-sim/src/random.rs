//! The simulation's shared random stream.
//!
//! One generator lives for the whole session and every draw advances it.
//! Distributions are always sampled from this stored generator: sampling a
//! copy would leave the stream where it was and hand out the same value
//! again on the next call.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded, platform-independent random stream.
#[derive(Debug, Clone)]
pub struct SimRng {
    rng: ChaCha8Rng,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Restart the stream from `seed`.
    pub fn seed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }

    /// Uniform integer in `[0, max)`. Returns 0 for `max == 0` without
    /// consuming a draw.
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        self.rng.gen_range(0..max)
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_float(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(0)
    }
}
