//! Environment abstraction for deterministic testing.
//!
//! State machines never read the clock themselves. Drivers ask the
//! environment for the current time and pass it in, which lets simulation
//! substitute a virtual clock.

use std::time::Duration;

/// Time source and async sleep.
///
/// Implementations MUST guarantee that `now()` never goes backwards.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Instant type: `std::time::Instant` in production, virtual time in
    /// simulation.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleep for `duration`. Only drivers call this.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
