//! Environment abstraction for deterministic testing.
//!
//! Decouples hub logic from system resources (clocks, randomness) so driver
//! tests can run with seeded RNG and a controllable clock while production
//! uses the OS.

use std::{ops::Sub, time::Duration};

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// - `now()` never goes backwards
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`; tests use virtual time as a
    /// `Duration` since an arbitrary origin.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Wall-clock time in Unix milliseconds, used to timestamp records.
    fn wall_clock_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Generates a random `u128`.
    ///
    /// Used for connection identities.
    fn random_u128(&self) -> u128 {
        let mut bytes = [0u8; 16];
        self.random_bytes(&mut bytes);
        u128::from_be_bytes(bytes)
    }
}
