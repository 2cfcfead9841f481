//! Production environment.
//!
//! `SystemEnv` reads tokio's clock and draws randomness from the OS.
//!
//! Time comes from `tokio::time::Instant` rather than `std::time::Instant`,
//! so sessions measure keep-alive staleness on the same clock their timers
//! run on. Under a paused test runtime both advance together.

use lodestone_core::Environment;

/// Production environment using tokio time and OS randomness.
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. Keep-alive ids do not need
/// cryptographic strength, but a host whose RNG is broken is not one to keep
/// serving from.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now()
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
