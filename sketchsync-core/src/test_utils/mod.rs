//! Test utilities for scene tests
//!
//! Shared by unit tests, the scenario tests under `scene_store::tests`,
//! the integration tests and the benches.

pub mod assertions;
pub mod deterministic_rng;
pub mod fixtures;

pub use assertions::*;
pub use deterministic_rng::*;
pub use fixtures::*;
