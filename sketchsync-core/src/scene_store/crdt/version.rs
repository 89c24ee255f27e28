/*
    version.rs - Version allocation for element mutations

    Every mutation of an element gets a new (version, tie_break) pair:
    - version is the previous version plus one
    - tie_break is sampled independently per call

    Two writers starting from the same base produce the same version number;
    the tie-break orders them. Collisions are negligible but not impossible:
    this orders usability conflicts, it is not a security boundary.
*/

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Version assigned to a freshly created element
pub const INITIAL_VERSION: u64 = 1;

/// The ordering key of an element record.
///
/// Field order matters: the derived `Ord` compares `version` first and
/// `tie_break` second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionStamp {
    pub version: u64,
    pub tie_break: u32,
}

impl VersionStamp {
    pub fn new(version: u64, tie_break: u32) -> Self {
        VersionStamp { version, tie_break }
    }
}

impl fmt::Display for VersionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}/{:08x}", self.version, self.tie_break)
    }
}

/// Allocates version stamps for local writes
#[derive(Debug)]
pub struct VersionAllocator {
    rng: StdRng,
}

impl VersionAllocator {
    /// Allocator seeded from OS entropy
    pub fn new() -> Self {
        VersionAllocator { rng: StdRng::from_os_rng() }
    }

    /// Allocator with a fixed seed, for reproducible stamps
    pub fn seeded(seed: u64) -> Self {
        VersionAllocator { rng: StdRng::seed_from_u64(seed) }
    }

    /// Stamp for a brand-new element
    pub fn initial(&mut self) -> VersionStamp {
        VersionStamp::new(INITIAL_VERSION, self.rng.random())
    }

    /// Stamp for the mutation following `previous_version`
    pub fn next(&mut self, previous_version: u64) -> VersionStamp {
        VersionStamp::new(previous_version.saturating_add(1), self.rng.random())
    }
}

impl Default for VersionAllocator {
    fn default() -> Self {
        Self::new()
    }
}
