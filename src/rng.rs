use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Randomness shared by the selector and the parameter generator.
///
/// Unseeded sources use the per-thread RNG, so concurrent callers never
/// contend. A seeded source serialises draws through one `StdRng`, which makes
/// a single-client run reproducible when a failing parameter set needs to be
/// replayed.
#[derive(Debug, Default)]
pub enum RandomSource {
    #[default]
    Thread,
    Seeded(Mutex<StdRng>),
}

impl RandomSource {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => RandomSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
            None => RandomSource::Thread,
        }
    }

    pub fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match self {
            RandomSource::Thread => f(&mut rand::thread_rng()),
            RandomSource::Seeded(rng) => {
                let mut guard = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f(&mut *guard)
            }
        }
    }
}
