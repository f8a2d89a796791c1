//! Clock abstraction so the scheduler's control loops never read wall time
//! directly, allowing deterministic tests of the round-trip laws in the
//! scheduler's testable properties.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Controls the scheduler's view of time.
///
/// In production, [`SystemClock`] delegates to `chrono::Utc::now()` and
/// `tokio::time::sleep`. Tests inject a clock that can be advanced under test
/// control instead, so heartbeat expiry and dead-threshold checks are
/// deterministic.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleep for the given duration.
    async fn sleep(&self, duration: Duration);
}

/// The default clock, using real system time.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await
    }
}
