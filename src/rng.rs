//! Random source used by chart generation.
//!
//! Generation only ever needs uniform draws in `[0, 1)`, so the capability is a
//! single method. Production code uses [`StdRandom`]; tests script the draws.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn next_index(&mut self, len: usize) -> usize {
        ((self.next_unit() * len as f64) as usize).min(len - 1)
    }
}

impl<T: RandomSource + ?Sized> RandomSource for &mut T {
    fn next_unit(&mut self) -> f64 {
        (**self).next_unit()
    }
}

pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Seeded from the platform entropy source (`crypto.getRandomValues` in the browser).
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible stream, e.g. for regenerating the same chart twice.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }
}

/// Replays a fixed list of draws, cycling when exhausted.
#[cfg(test)]
pub(crate) struct ScriptedRandom {
    draws: Vec<f64>,
    pos: usize,
}

#[cfg(test)]
impl ScriptedRandom {
    pub(crate) fn new(draws: &[f64]) -> Self {
        Self {
            draws: draws.to_vec(),
            pos: 0,
        }
    }
}

#[cfg(test)]
impl RandomSource for ScriptedRandom {
    fn next_unit(&mut self) -> f64 {
        let v = self.draws[self.pos % self.draws.len()];
        self.pos += 1;
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_streams_repeat() {
        let mut a = StdRandom::seeded(42);
        let mut b = StdRandom::seeded(42);
        for _ in 0..16 {
            let x = a.next_unit();
            assert_eq!(x, b.next_unit());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_next_index_in_range() {
        let mut r = ScriptedRandom::new(&[0.0, 0.5, 0.999_999]);
        assert_eq!(r.next_index(6), 0);
        assert_eq!(r.next_index(6), 3);
        assert_eq!(r.next_index(6), 5);
    }
}
