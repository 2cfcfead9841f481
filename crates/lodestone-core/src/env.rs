//! Environment abstraction for deterministic testing.
//!
//! Keeps connection logic independent of the clock and the RNG. Production
//! uses tokio's clock and OS randomness; the harness uses a seeded RNG and
//! tokio's paused clock.

use std::time::Duration;

/// Time and randomness available to the lifecycle state machines.
///
/// Implementations MUST guarantee that `now()` never goes backwards.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type produced by this environment.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Fill `buffer` with random bytes.
    ///
    /// Given the same seed, a simulated environment produces the same bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Random keep-alive identifier in `0..2^31`.
    fn random_keep_alive_id(&self) -> i32 {
        (self.random_u64() >> 33) as i32
    }
}
