//! Deterministic aggregate identifiers for scenarios.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;
use uuid::{Builder, Uuid};

/// Hands out reproducible aggregate ids derived from a master seed.
///
/// - Deterministic: the same seed always yields the same ids
/// - Isolated: the id at index `n` does not depend on which other indices
///   were asked for
pub struct AggregateIdProvider {
    master_seed: u64,

    /// Ids handed out so far, by index
    cache: HashMap<u64, Uuid>,
}

impl AggregateIdProvider {
    pub fn new(master_seed: u64) -> Self {
        Self {
            master_seed,
            cache: HashMap::new(),
        }
    }

    /// Returns the aggregate id at `index`.
    pub fn aggregate(&mut self, index: u64) -> Uuid {
        let master_seed = self.master_seed;
        *self.cache.entry(index).or_insert_with(|| {
            // Golden-ratio spread keeps neighbouring indices far apart.
            let seed = master_seed ^ index.wrapping_add(1).wrapping_mul(0x9e3779b97f4a7c15);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut bytes = [0u8; 16];
            rng.fill_bytes(&mut bytes);
            Builder::from_random_bytes(bytes).into_uuid()
        })
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }
}
