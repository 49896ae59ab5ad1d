//! Process-wide random draws.
//!
//! All behavior and selection randomness flows through one seeded
//! [`Sampler`] so tests can pin a seed and replay decisions.

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;
use std::time::Duration;

/// A seedable source of the runtime's random decisions.
pub struct Sampler {
    rng: Mutex<ChaCha8Rng>,
}

impl Sampler {
    /// Creates a sampler from an optional fixed seed.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Bernoulli draw. `p <= 0` never fires, `p >= 1` always fires.
    #[must_use]
    pub fn chance(&self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.lock().gen_bool(p)
    }

    /// Uniform draw in `[0, 1)`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        self.lock().gen::<f64>()
    }

    /// Uniform duration in `[min, max]`.
    #[must_use]
    pub fn duration_between(&self, min: Duration, max: Duration) -> Duration {
        if min >= max {
            return min;
        }
        let dist = Uniform::new_inclusive(min.as_nanos(), max.as_nanos());
        let nanos = dist.sample(&mut *self.lock());
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Picks an index proportionally to `weights`. A non-positive total
    /// falls back to equal probability.
    #[must_use]
    pub fn pick_weighted(&self, weights: &[f64]) -> usize {
        assert!(!weights.is_empty(), "pick_weighted needs candidates");
        let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
        if total <= 0.0 {
            return self.lock().gen_range(0..weights.len());
        }
        let mut draw = self.fraction() * total;
        for (i, w) in weights.iter().enumerate() {
            if *w <= 0.0 {
                continue;
            }
            if draw < *w {
                return i;
            }
            draw -= *w;
        }
        // Floating-point edge: fall back to the last positive weight.
        weights
            .iter()
            .rposition(|w| *w > 0.0)
            .unwrap_or(weights.len() - 1)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChaCha8Rng> {
        // A poisoned lock would mean a panic mid-draw; the RNG state is
        // still usable.
        self.rng.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}
