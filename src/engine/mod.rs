use std::{
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use anyhow::Result;
use categorizer::{Categorizer, CategoryRule};
use chrono::{DateTime, Utc};
use error::StorageError;
use storage::{
    entities::{RecentWindow, TimeSpent},
    event_store::{EventStore, SqliteEventStore},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracker::{ActivityTracker, TrackerConfig};

use crate::{
    utils::clock::{Clock, DefaultClock},
    window_api::{GenericWindowManager, WindowInfoProvider},
};

pub mod aggregation;
pub mod categorizer;
pub mod error;
pub mod shutdown;
pub mod storage;
pub mod tracker;

pub const DATABASE_FILE: &str = "context-tracker.db";
pub const CATEGORIES_FILE: &str = "categories.json";

/// Composition root of the tracking core. Owns the event store, the category rules and the
/// tracker, and exposes the operations the presentation layer needs.
pub struct Engine {
    store: Arc<dyn EventStore>,
    categorizer: Arc<RwLock<Categorizer>>,
    tracker: ActivityTracker,
}

impl Engine {
    pub fn new(
        store: Arc<dyn EventStore>,
        categorizer: Categorizer,
        provider: Box<dyn WindowInfoProvider>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> Self {
        let categorizer = Arc::new(RwLock::new(categorizer));
        let tracker = ActivityTracker::new(
            provider,
            categorizer.clone(),
            store.clone(),
            clock,
            config,
        );
        Self {
            store,
            categorizer,
            tracker,
        }
    }

    pub async fn time_spent_by_category(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSpent>, StorageError> {
        self.store.time_spent_by_category(start, end).await
    }

    pub async fn recent_windows(&self, limit: usize) -> Result<Vec<RecentWindow>, StorageError> {
        let events = self.store.recent_events(limit).await?;
        Ok(events.into_iter().map(RecentWindow::from).collect())
    }

    pub fn is_tracking(&self) -> bool {
        self.tracker.is_tracking()
    }

    pub fn current_category(&self) -> Arc<str> {
        self.tracker.current_category()
    }

    pub fn window_title(&self) -> Arc<str> {
        self.tracker.window_title()
    }

    pub fn start_tracking(&self, interval: Option<Duration>) -> bool {
        self.tracker.start_tracking(interval)
    }

    pub fn stop_tracking(&self) -> bool {
        self.tracker.stop_tracking()
    }

    /// Stops tracking and waits until the last tick is done writing.
    pub async fn shutdown(&self) {
        self.tracker.shutdown().await
    }

    pub fn add_category(&self, name: &str, patterns: &[&str]) -> bool {
        self.categorizer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add_category(name, patterns.iter().copied())
    }

    pub fn remove_category(&self, name: &str) -> bool {
        self.categorizer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_category(name)
    }

    pub fn categories(&self) -> Vec<String> {
        self.categorizer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .categories()
    }

    pub fn category_rules(&self) -> Vec<CategoryRule> {
        self.categorizer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rules()
            .to_vec()
    }
}

pub struct EngineOptions {
    pub tracker: TrackerConfig,
    /// Category rules file. Defaults to [CATEGORIES_FILE] inside the application directory.
    pub categories: Option<PathBuf>,
}

/// Represents the starting point for the tracking engine. Runs until a shutdown signal arrives.
pub async fn start_engine(dir: PathBuf, options: EngineOptions) -> Result<()> {
    let store = Arc::new(SqliteEventStore::open(&dir.join(DATABASE_FILE))?);
    let categories_path = options
        .categories
        .unwrap_or_else(|| dir.join(CATEGORIES_FILE));
    let categorizer = Categorizer::load(&categories_path)?;
    let provider = GenericWindowManager::new()?;

    let engine = Engine::new(
        store.clone(),
        categorizer,
        Box::new(provider),
        Arc::new(DefaultClock),
        options.tracker,
    );

    let shutdown_token = CancellationToken::new();

    let (_, serve_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        serve(&engine, shutdown_token.clone()),
    );

    if let Err(e) = &serve_result {
        error!("Engine got an error {e:?}");
    }

    store.close()?;
    serve_result
}

/// Tracks until `shutdown_token` is cancelled.
async fn serve(engine: &Engine, shutdown_token: CancellationToken) -> Result<()> {
    engine.start_tracking(None);
    info!("Tracking with categories {:?}", engine.categories());

    shutdown_token.cancelled().await;

    engine.shutdown().await;
    let recent = engine.recent_windows(1).await?;
    if let Some(last) = recent.first() {
        info!("Last recorded window {:?} at {}", last.title, last.timestamp);
    }
    Ok(())
}

#[cfg(test)]
mod engine_tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::Result;
    use chrono::Utc;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        engine::{
            categorizer::Categorizer,
            serve,
            storage::event_store::SqliteEventStore,
            tracker::{TrackerConfig, TRACKING_PAUSED},
            Engine, DATABASE_FILE,
        },
        utils::{clock::DefaultClock, logging::TEST_LOGGING},
        window_api::{ActiveWindowData, MockWindowInfoProvider},
    };

    fn test_items() -> Vec<ActiveWindowData> {
        vec![
            ActiveWindowData {
                window_title: "main.rs - VS Code".into(),
                process_name: "/usr/bin/code".into(),
            },
            ActiveWindowData {
                window_title: "main.rs - VS Code".into(),
                process_name: "/usr/bin/code".into(),
            },
            ActiveWindowData {
                window_title: "#general | Slack".into(),
                process_name: "/usr/bin/slack".into(),
            },
        ]
    }

    fn create_engine(provider: MockWindowInfoProvider, store: Arc<SqliteEventStore>) -> Engine {
        Engine::new(
            store,
            Categorizer::default(),
            Box::new(provider),
            Arc::new(DefaultClock),
            TrackerConfig {
                poll_interval: Duration::from_millis(50),
                display_id: 0,
            },
        )
    }

    #[tokio::test]
    async fn test_add_category_twice_keeps_one() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let engine = create_engine(MockWindowInfoProvider::new(), store);

        let before = engine.categories().len();
        assert!(engine.add_category("Dev", &["nvim"]));
        assert!(!engine.add_category("Dev", &["emacs"]));

        let categories = engine.categories();
        assert_eq!(categories.len(), before + 1);
        assert_eq!(categories.iter().filter(|c| *c == "Dev").count(), 1);

        assert!(engine.remove_category("Dev"));
        assert!(!engine.remove_category("Dev"));
        assert_eq!(engine.categories().len(), before);
        Ok(())
    }

    #[tokio::test]
    async fn test_queries_on_empty_store() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let engine = create_engine(MockWindowInfoProvider::new(), store);

        let now = Utc::now();
        assert!(engine
            .time_spent_by_category(now - chrono::Duration::hours(1), now)
            .await?
            .is_empty());
        assert!(engine.time_spent_by_category(now, now).await?.is_empty());
        assert!(engine.recent_windows(10).await?.is_empty());
        assert!(!engine.is_tracking());
        assert_eq!(&*engine.window_title(), TRACKING_PAUSED);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_errors_propagate() -> Result<()> {
        let store = Arc::new(SqliteEventStore::open_in_memory()?);
        let engine = create_engine(MockWindowInfoProvider::new(), store.clone());
        store.close()?;

        assert!(engine.recent_windows(10).await.is_err());
        let now = Utc::now();
        assert!(engine
            .time_spent_by_category(now - chrono::Duration::hours(1), now)
            .await
            .is_err());
        Ok(())
    }

    /// Very simple smoke test: the engine tracks a cycling window sequence against an on-disk
    /// store, stops on cancellation and reports what it saw.
    #[tokio::test]
    async fn smoke_test_engine() -> Result<()> {
        *TEST_LOGGING;
        let mut provider = MockWindowInfoProvider::new();
        let mut items = test_items().into_iter().cycle();
        provider
            .expect_sample()
            .returning(move || Ok(items.next()));

        let dir = tempdir()?;
        let store = Arc::new(SqliteEventStore::open(&dir.path().join(DATABASE_FILE))?);
        let engine = create_engine(provider, store.clone());
        let shutdown_token = CancellationToken::new();
        let start = Utc::now();

        let (_, serve_result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                shutdown_token.cancel()
            },
            serve(&engine, shutdown_token.clone()),
        );
        serve_result?;

        assert!(!engine.is_tracking());

        let recent = engine.recent_windows(100).await?;
        assert!(recent.len() >= 2);
        for pair in recent.windows(2) {
            assert_ne!(pair[0].title, pair[1].title);
        }

        let spent = engine.time_spent_by_category(start, Utc::now()).await?;
        let categories = spent.iter().map(|s| &*s.category).collect::<Vec<_>>();
        assert!(categories.contains(&"Development"));
        assert!(categories.contains(&"Communication"));
        let percentage_sum: f64 = spent.iter().map(|s| s.percentage).sum();
        assert!((percentage_sum - 100.).abs() < 0.05);

        store.close()?;
        Ok(())
    }
}
