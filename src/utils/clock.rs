use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of wall-clock timestamps and monotonic instants for the tracker. Swapped out in tests so
/// that persisted timestamps are predictable.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    /// Wall-clock time used to stamp focus events.
    fn time(&self) -> DateTime<Utc>;

    /// Monotonic time used to schedule poll ticks.
    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: Instant);
}

pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
