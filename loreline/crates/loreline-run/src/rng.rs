//! Deterministic dice for the `chance` built-in.
//!
//! The generator's state is (seed, draw count): every call consumes exactly
//! one sample, so a restored interpreter can fast-forward to the recorded
//! position and continue the identical stream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct DiceRng {
    seed: u64,
    draws: u64,
    rng: StdRng,
}

impl DiceRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            draws: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Rebuild a generator at a recorded position by replaying the stream.
    pub fn from_state(seed: u64, draws: u64) -> Self {
        let mut rng = DiceRng::new(seed);
        for _ in 0..draws {
            rng.next();
        }
        rng
    }

    /// One raw sample.
    pub fn next(&mut self) -> u64 {
        self.draws += 1;
        self.rng.gen()
    }

    /// True with probability `1/n`.
    pub fn chance(&mut self, n: u64) -> bool {
        debug_assert!(n >= 1);
        self.next() % n == 0
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = DiceRng::new(42);
        let mut b = DiceRng::new(42);
        for _ in 0..32 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_from_state_fast_forwards() {
        let mut a = DiceRng::new(7);
        for _ in 0..10 {
            a.next();
        }
        let mut b = DiceRng::from_state(7, 10);
        assert_eq!(a.draws(), b.draws());
        for _ in 0..16 {
            assert_eq!(a.next(), b.next());
        }
    }

    #[test]
    fn test_chance_of_one_always_true() {
        let mut rng = DiceRng::new(1);
        for _ in 0..64 {
            assert!(rng.chance(1));
        }
    }

    #[test]
    fn test_chance_counts_draws() {
        let mut rng = DiceRng::new(3);
        rng.chance(6);
        rng.chance(6);
        assert_eq!(rng.draws(), 2);
    }
}
