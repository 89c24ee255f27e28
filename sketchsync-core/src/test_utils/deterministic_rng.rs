/*!
    Deterministic RNG helpers for reproducible tests

    Seeded allocators make tie-breaks repeatable, and seeded shuffles give
    repeatable delivery orders for convergence tests.
*/

use crate::config::Config;
use crate::scene_store::crdt::VersionAllocator;
use crate::scene_store::scene::Scene;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Create a deterministic RNG with the default seed
pub fn test_rng() -> StdRng {
    test_rng_with_seed(DEFAULT_TEST_SEED)
}

/// Create a deterministic RNG with a custom seed
pub fn test_rng_with_seed(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Allocator producing the same tie-breaks for the same seed
pub fn test_allocator(seed: u64) -> VersionAllocator {
    VersionAllocator::seeded(seed)
}

/// Scene with default config and seeded tie-breaks
pub fn seeded_scene(seed: u64) -> Scene {
    Scene::seeded(&Config::default(), seed)
}

/// `items` in a seed-determined order
pub fn shuffled<T>(mut items: Vec<T>, seed: u64) -> Vec<T> {
    items.shuffle(&mut test_rng_with_seed(seed));
    items
}
