//! Retry builders for broker connection establishment.

use std::time::Duration;

use backon::ConstantBuilder;

/// Fixed-delay backoff for broker connection attempts at startup.
///
/// `attempts` is the total attempt count, so the builder is configured with
/// one fewer retry. Exhaustion is fatal to the owning service.
pub fn broker_backoff(attempts: usize, delay: Duration) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(delay)
        .with_max_times(attempts.saturating_sub(1))
}
