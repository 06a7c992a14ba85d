//! Deterministic random number generation for sampling.
//!
//! RULE: nothing in the crate calls a platform RNG. Sampling flows
//! through a SampleRng seeded from configuration, so the same seed over
//! the same input always selects the same rows.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct SampleRng {
    inner: Pcg64Mcg,
}

impl SampleRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }
}

/// Choose `k` distinct indices from `0..n` (partial Fisher–Yates),
/// returned ascending. Returns every index when `k >= n`.
pub fn sample_indices(n: usize, k: usize, rng: &mut SampleRng) -> Vec<usize> {
    let mut pool: Vec<usize> = (0..n).collect();
    let k = k.min(n);
    for i in 0..k {
        let j = i + rng.next_u64_below((n - i) as u64) as usize;
        pool.swap(i, j);
    }
    let mut chosen = pool[..k].to_vec();
    chosen.sort_unstable();
    chosen
}
