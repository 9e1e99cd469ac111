//! Activity tracker: a two state machine (stopped / running) that polls the
//! [WindowInfoProvider], classifies every focused window and records a focus event whenever the
//! focused window changes.
//!
//! While running, a single task owned by the tracker executes ticks one after another (see
//! [poller]). Status accessors read the in-memory session and never touch the store.

mod poller;

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{utils::clock::Clock, window_api::WindowInfoProvider};

use super::{
    categorizer::Categorizer,
    storage::{entities::NewFocusEvent, event_store::EventStore},
};

use poller::PollingLoop;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Reported as both title and category while tracking is stopped.
pub const TRACKING_PAUSED: &str = "Tracking Paused";
/// Reported as title when the platform refused to reveal the focused window.
pub const PERMISSIONS_REQUIRED: &str = "Permissions required";
/// Reported as title when the platform failed to provide the focused window.
pub const WINDOW_UNAVAILABLE: &str = "Window unavailable";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    /// Written into every recorded event as its source display.
    pub display_id: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            display_id: 0,
        }
    }
}

struct PollHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

/// In-memory state of the current tracking session.
struct TrackingSession {
    last_observed_identity: Option<Arc<str>>,
    last_event_at: Option<DateTime<Utc>>,
    current_title: Arc<str>,
    current_category: Arc<str>,
    poll: Option<PollHandle>,
}

impl TrackingSession {
    fn stopped() -> Self {
        Self {
            last_observed_identity: None,
            last_event_at: None,
            current_title: TRACKING_PAUSED.into(),
            current_category: TRACKING_PAUSED.into(),
            poll: None,
        }
    }

    fn is_tracking(&self) -> bool {
        self.poll.is_some()
    }

    /// Resets to the stopped state and hands out the poll handle, if any.
    fn stop(&mut self) -> Option<PollHandle> {
        let poll = self.poll.take()?;
        poll.shutdown.cancel();
        *self = Self::stopped();
        Some(poll)
    }

    /// Updates live status with a fresh sample. Returns the event to persist when the title
    /// differs from the previously observed one.
    fn observe(
        &mut self,
        window_title: Arc<str>,
        process_name: Arc<str>,
        category: Arc<str>,
        captured_at: DateTime<Utc>,
        display_id: u32,
    ) -> Option<NewFocusEvent> {
        self.current_title = window_title.clone();
        self.current_category = category.clone();

        if self.last_observed_identity.as_ref() == Some(&window_title) {
            return None;
        }
        self.last_observed_identity = Some(window_title.clone());

        // Wall clock may step backwards, stored order must not.
        let timestamp = match self.last_event_at {
            Some(last) if last > captured_at => {
                warn!("Clock went backwards from {last} to {captured_at}");
                last
            }
            _ => captured_at,
        };
        self.last_event_at = Some(timestamp);

        Some(NewFocusEvent {
            timestamp,
            window_title,
            process_name,
            display_id,
            category,
        })
    }
}

/// State shared between the tracker handle and its polling task.
struct TrackerShared {
    provider: Mutex<Box<dyn WindowInfoProvider>>,
    categorizer: Arc<RwLock<Categorizer>>,
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    display_id: u32,
    session: Mutex<TrackingSession>,
}

impl TrackerShared {
    fn new(
        provider: Box<dyn WindowInfoProvider>,
        categorizer: Arc<RwLock<Categorizer>>,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        display_id: u32,
    ) -> Self {
        Self {
            provider: Mutex::new(provider),
            categorizer,
            store,
            clock,
            display_id,
            session: Mutex::new(TrackingSession::stopped()),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, TrackingSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the tracking lifecycle. Exactly one per store.
pub struct ActivityTracker {
    shared: Arc<TrackerShared>,
    default_interval: Duration,
}

impl ActivityTracker {
    pub fn new(
        provider: Box<dyn WindowInfoProvider>,
        categorizer: Arc<RwLock<Categorizer>>,
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(TrackerShared::new(
                provider,
                categorizer,
                store,
                clock,
                config.display_id,
            )),
            default_interval: config.poll_interval,
        }
    }

    /// Starts polling every `interval` (the configured one when [None]). The first sample is
    /// taken right away. Has no effect and returns `false` when already tracking.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_tracking(&self, interval: Option<Duration>) -> bool {
        let mut session = self.shared.lock_session();
        if session.is_tracking() {
            debug!("Tracking is already running");
            return false;
        }

        let mut interval = interval.unwrap_or(self.default_interval);
        if interval < MIN_POLL_INTERVAL {
            warn!("Poll interval {interval:?} is too short, using {MIN_POLL_INTERVAL:?}");
            interval = MIN_POLL_INTERVAL;
        }

        session.last_observed_identity = None;
        session.last_event_at = None;

        let shutdown = CancellationToken::new();
        let polling = PollingLoop::new(self.shared.clone(), shutdown.clone(), interval);
        let task = tokio::spawn(polling.run().instrument(info_span!("Tracking")));
        session.poll = Some(PollHandle { shutdown, task });

        info!("Started tracking every {interval:?}");
        true
    }

    /// Stops polling. A tick already in progress may still record its event, no new tick starts.
    /// Returns `false` when tracking wasn't running.
    pub fn stop_tracking(&self) -> bool {
        let Some(poll) = self.shared.lock_session().stop() else {
            return false;
        };
        // The task winds down on its own once it observes the cancellation.
        drop(poll.task);
        info!("Stopped tracking");
        true
    }

    /// Stops polling and waits for the in-flight tick, if any, to finish.
    pub async fn shutdown(&self) {
        let Some(poll) = self.shared.lock_session().stop() else {
            return;
        };
        if let Err(e) = poll.task.await {
            error!("Tracking task failed {e:?}");
        }
        info!("Tracking shut down");
    }

    pub fn is_tracking(&self) -> bool {
        self.shared.lock_session().is_tracking()
    }

    /// Title of the focused window, or one of [TRACKING_PAUSED], [PERMISSIONS_REQUIRED],
    /// [WINDOW_UNAVAILABLE].
    pub fn window_title(&self) -> Arc<str> {
        self.shared.lock_session().current_title.clone()
    }

    /// Category of the focused window, or [TRACKING_PAUSED] while stopped.
    pub fn current_category(&self) -> Arc<str> {
        self.shared.lock_session().current_category.clone()
    }
}

impl Drop for ActivityTracker {
    fn drop(&mut self) {
        self.shared.lock_session().stop();
    }
}
