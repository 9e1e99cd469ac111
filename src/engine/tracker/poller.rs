use std::{
    sync::{Arc, PoisonError},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::window_api::{ActiveWindowData, ProviderError};

use super::{TrackerShared, TrackingSession, PERMISSIONS_REQUIRED, WINDOW_UNAVAILABLE};

/// Drives ticks of a single tracking session until its token is cancelled. A tick always runs to
/// completion before the next one is scheduled.
pub(super) struct PollingLoop {
    shared: Arc<TrackerShared>,
    shutdown: CancellationToken,
    interval: Duration,
}

impl PollingLoop {
    pub(super) fn new(
        shared: Arc<TrackerShared>,
        shutdown: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            shared,
            shutdown,
            interval,
        }
    }

    /// Executes the polling loop. The first tick fires immediately.
    pub(super) async fn run(self) {
        let clock = self.shared.clock.clone();
        let mut next_tick = clock.instant();
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Polling cancelled");
                    return;
                }
                _ = clock.sleep_until(next_tick) => ()
            }

            self.shared
                .tick(&self.shutdown)
                .instrument(info_span!("Tick"))
                .await;

            next_tick += self.interval;
            let now = clock.instant();
            if next_tick <= now {
                let mut skipped = 0u32;
                while next_tick <= now {
                    next_tick += self.interval;
                    skipped += 1;
                }
                warn!("Tick overran, skipping {skipped} scheduled ticks");
            }
        }
    }
}

impl TrackerShared {
    /// One poll: sample the focused window, refresh the live status and record a focus event if
    /// the window changed. Failures are logged and never escape.
    pub(super) async fn tick(&self, shutdown: &CancellationToken) {
        let sample = self
            .provider
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample();
        let captured_at = self.clock.time();

        let ActiveWindowData {
            window_title,
            process_name,
        } = match sample {
            Ok(Some(window)) => window,
            Ok(None) => {
                debug!("No window is focused");
                return;
            }
            Err(e) => {
                warn!("Failed to sample focused window {e}");
                let diagnostic = match e {
                    ProviderError::PermissionDenied(_) => PERMISSIONS_REQUIRED,
                    ProviderError::Unsupported | ProviderError::Platform(_) => WINDOW_UNAVAILABLE,
                };
                self.with_active_session(shutdown, |session| {
                    session.current_title = diagnostic.into();
                });
                return;
            }
        };

        let category: Arc<str> = self
            .categorizer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .categorize(&window_title)
            .into();

        let event = self
            .with_active_session(shutdown, |session| {
                session.observe(
                    window_title,
                    process_name,
                    category,
                    captured_at,
                    self.display_id,
                )
            })
            .flatten();

        let Some(event) = event else {
            return;
        };

        match self.store.append(event).await {
            Ok(stored) => info!(
                "Recorded switch to {:?} ({}) as {}",
                stored.window_title, stored.category, stored.id
            ),
            Err(e) => error!("Failed to store focus event, dropping it {e:?}"),
        }
    }

    /// Applies `update` unless the session this tick belongs to was stopped meanwhile. The
    /// cancellation check and the update happen under the session lock, the same lock stopping
    /// takes.
    fn with_active_session<T>(
        &self,
        shutdown: &CancellationToken,
        update: impl FnOnce(&mut TrackingSession) -> T,
    ) -> Option<T> {
        let mut session = self.lock_session();
        if shutdown.is_cancelled() {
            debug!("Session stopped during tick, discarding sample");
            return None;
        }
        Some(update(&mut session))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex, RwLock},
    };

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use crate::{
        engine::{
            categorizer::Categorizer,
            storage::event_store::{EventStore, SqliteEventStore},
            tracker::{TrackerShared, PERMISSIONS_REQUIRED, TRACKING_PAUSED, WINDOW_UNAVAILABLE},
        },
        utils::{clock::Clock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowInfoProvider, ProviderError},
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap()
    }

    /// Hands out scripted wall-clock times, one per call, then keeps returning the last one.
    struct ScriptedClock {
        times: Mutex<VecDeque<DateTime<Utc>>>,
    }

    impl ScriptedClock {
        fn new(times: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
            Self {
                times: Mutex::new(times.into_iter().collect()),
            }
        }

        /// One second further on every call.
        fn ticking(count: i64) -> Self {
            Self::new((0..count).map(|i| t0() + Duration::seconds(i)))
        }
    }

    #[async_trait]
    impl Clock for ScriptedClock {
        fn time(&self) -> DateTime<Utc> {
            let mut times = self.times.lock().unwrap();
            if times.len() > 1 {
                times.pop_front().unwrap()
            } else {
                *times.front().unwrap()
            }
        }

        fn instant(&self) -> Instant {
            Instant::now()
        }

        async fn sleep_until(&self, instant: Instant) {
            tokio::time::sleep_until(instant).await;
        }
    }

    fn window(title: &str) -> ActiveWindowData {
        ActiveWindowData {
            window_title: title.into(),
            process_name: "/usr/bin/test".into(),
        }
    }

    fn scripted_provider(
        samples: Vec<Result<Option<ActiveWindowData>, ProviderError>>,
    ) -> MockWindowInfoProvider {
        let mut provider = MockWindowInfoProvider::new();
        let count = samples.len();
        let mut samples = samples.into_iter();
        provider
            .expect_sample()
            .times(count)
            .returning(move || samples.next().unwrap());
        provider
    }

    fn create_shared(
        provider: MockWindowInfoProvider,
        store: Arc<SqliteEventStore>,
        clock: ScriptedClock,
    ) -> (TrackerShared, Arc<RwLock<Categorizer>>) {
        let categorizer = Arc::new(RwLock::new(Categorizer::default()));
        let shared = TrackerShared::new(
            Box::new(provider),
            categorizer.clone(),
            store,
            Arc::new(clock),
            0,
        );
        (shared, categorizer)
    }

    async fn stored_titles(store: &SqliteEventStore) -> Result<Vec<String>> {
        let mut events = store.recent_events(100).await?;
        events.reverse();
        Ok(events.iter().map(|e| e.window_title.to_string()).collect())
    }

    #[tokio::test]
    async fn test_consecutive_duplicates_are_not_recorded() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = ["A", "A", "B", "B", "A"]
            .into_iter()
            .map(|title| Ok(Some(window(title))))
            .collect();
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(5));

        let shutdown = CancellationToken::new();
        for _ in 0..5 {
            shared.tick(&shutdown).await;
        }

        assert_eq!(stored_titles(&store).await?, vec!["A", "B", "A"]);
        let events = store.recent_events(100).await?;
        let timestamps = events.iter().rev().map(|e| e.timestamp).collect::<Vec<_>>();
        assert_eq!(
            timestamps,
            vec![t0(), t0() + Duration::seconds(2), t0() + Duration::seconds(4)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_same_category_different_titles_are_recorded() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = vec![
            Ok(Some(window("a.rs - VS Code"))),
            Ok(Some(window("b.rs - VS Code"))),
        ];
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(2));

        let shutdown = CancellationToken::new();
        shared.tick(&shutdown).await;
        shared.tick(&shutdown).await;

        let events = store.recent_events(10).await?;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| &*e.category == "Development"));
        Ok(())
    }

    #[tokio::test]
    async fn test_provider_failures_skip_the_tick() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = vec![
            Err(ProviderError::PermissionDenied("accessibility".into())),
            Err(ProviderError::Platform(anyhow!("display went away"))),
            Ok(Some(window("Inbox - Gmail"))),
        ];
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(3));
        let shutdown = CancellationToken::new();

        shared.tick(&shutdown).await;
        assert_eq!(&*shared.lock_session().current_title, PERMISSIONS_REQUIRED);

        shared.tick(&shutdown).await;
        assert_eq!(&*shared.lock_session().current_title, WINDOW_UNAVAILABLE);
        assert!(store.recent_events(10).await?.is_empty());

        shared.tick(&shutdown).await;
        assert_eq!(&*shared.lock_session().current_title, "Inbox - Gmail");
        assert_eq!(&*shared.lock_session().current_category, "Communication");
        assert_eq!(stored_titles(&store).await?, vec!["Inbox - Gmail"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_focused_window_changes_nothing() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = vec![Ok(Some(window("A"))), Ok(None), Ok(Some(window("A")))];
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(3));
        let shutdown = CancellationToken::new();

        for _ in 0..3 {
            shared.tick(&shutdown).await;
        }

        assert_eq!(&*shared.lock_session().current_title, "A");
        assert_eq!(stored_titles(&store).await?, vec!["A"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_tick_writes_nothing() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = vec![Ok(Some(window("A")))];
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(1));

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        shared.tick(&shutdown).await;

        assert!(store.recent_events(10).await?.is_empty());
        assert_eq!(&*shared.lock_session().current_title, TRACKING_PAUSED);
        Ok(())
    }

    #[tokio::test]
    async fn test_timestamps_never_decrease() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = vec![Ok(Some(window("A"))), Ok(Some(window("B")))];
        let clock = ScriptedClock::new([t0() + Duration::seconds(10), t0()]);
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), clock);
        let shutdown = CancellationToken::new();

        shared.tick(&shutdown).await;
        shared.tick(&shutdown).await;

        let events = store.recent_events(10).await?;
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| e.timestamp == t0() + Duration::seconds(10)));
        Ok(())
    }

    #[tokio::test]
    async fn test_storage_failure_drops_event() -> Result<()> {
        *TEST_LOGGING;
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        store.close()?;
        let samples = vec![Ok(Some(window("A"))), Ok(Some(window("A")))];
        let (shared, _) = create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(2));
        let shutdown = CancellationToken::new();

        shared.tick(&shutdown).await;
        assert_eq!(&*shared.lock_session().current_title, "A");

        // The dropped event isn't retried on the next tick.
        shared.tick(&shutdown).await;
        assert!(store.recent_events(10).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_rule_changes_apply_to_next_tick() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let samples = vec![Ok(Some(window("Figma - Draft"))), Ok(Some(window("Figma - Final")))];
        let (shared, categorizer) =
            create_shared(scripted_provider(samples), store.clone(), ScriptedClock::ticking(2));
        let shutdown = CancellationToken::new();

        shared.tick(&shutdown).await;
        categorizer.write().unwrap().add_category("Design", ["figma"]);
        shared.tick(&shutdown).await;

        let mut events = store.recent_events(10).await?;
        events.reverse();
        let categories = events.iter().map(|e| e.category.to_string()).collect::<Vec<_>>();
        assert_eq!(categories, vec!["Other", "Design"]);
        Ok(())
    }
}
