//! Stable state hashing for desync checks.
//!
//! Every peer folds the same turn state into the same `u64`, so comparing
//! hashes after a turn tells whether two sessions have diverged. Values
//! are written in a fixed order; the result depends on that order.

use std::hash::Hasher;

/// FNV-1a 64-bit hasher with a fixed basis.
///
/// `DefaultHasher` is randomly keyed per process, so it cannot be used to
/// compare simulation state between peers.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}
