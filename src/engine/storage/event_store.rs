use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::{debug, error, info};

use crate::{
    engine::{aggregation::time_spent_by_category, error::StorageError},
    utils::time::{parse_sortable_timestamp, to_sortable_timestamp},
};

use super::{
    entities::{FocusEvent, NewFocusEvent, TimeSpent},
    schema,
};

/// Append-only log of focus events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persists `event` and returns it with the id the store assigned.
    async fn append(&self, event: NewFocusEvent) -> Result<FocusEvent, StorageError>;

    /// Up to `limit` events, newest first.
    async fn recent_events(&self, limit: usize) -> Result<Vec<FocusEvent>, StorageError>;

    /// Events with `start <= timestamp <= end`, oldest first.
    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FocusEvent>, StorageError>;

    async fn time_spent_by_category(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSpent>, StorageError> {
        let events = self.events_between(start, end).await?;
        Ok(time_spent_by_category(&events, start, end))
    }
}

/// The main realization of [EventStore], backed by SQLite.
///
/// Every operation runs on the blocking pool behind a single connection mutex, so writes from a
/// tracker are applied one at a time in the order they were issued.
#[derive(Clone)]
pub struct SqliteEventStore {
    connection: Arc<Mutex<Option<Connection>>>,
}

impl SqliteEventStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {parent:?}"))?;
        }
        let connection = Connection::open(path)
            .with_context(|| format!("Failed to open event store at {path:?}"))?;
        if let Err(e) = connection.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode {e:?}");
        }
        info!("Opened event store at {path:?}");
        Self::initialize(connection)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(connection: Connection) -> anyhow::Result<Self> {
        schema::run(&connection).context("Failed to create event store schema")?;
        Ok(Self {
            connection: Arc::new(Mutex::new(Some(connection))),
        })
    }

    /// Closes the underlying connection. Every later operation fails with
    /// [StorageError::Closed].
    pub fn close(&self) -> Result<(), StorageError> {
        let mut guard = self.connection.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.take() {
            Some(connection) => connection.close().map_err(|(_, e)| StorageError::from(e)),
            None => Ok(()),
        }
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(PoisonError::into_inner);
            let connection = guard.as_ref().ok_or(StorageError::Closed)?;
            operation(connection)
        })
        .await?
    }
}

fn row_to_event(row: &Row) -> Result<FocusEvent, StorageError> {
    let timestamp: String = row.get("timestamp")?;
    let timestamp = parse_sortable_timestamp(&timestamp)
        .map_err(|e| StorageError::Malformed(e.to_string()))?;
    let process_name: Option<String> = row.get("process_name")?;
    let display_id: Option<u32> = row.get("display_id")?;
    let window_title: String = row.get("window_title")?;
    let category: String = row.get("category")?;
    Ok(FocusEvent {
        id: row.get("id")?,
        timestamp,
        window_title: window_title.into(),
        process_name: process_name.unwrap_or_default().into(),
        display_id: display_id.unwrap_or_default(),
        category: category.into(),
    })
}

fn collect_events(
    connection: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<FocusEvent>, StorageError> {
    let mut statement = connection.prepare_cached(sql)?;
    let mut rows = statement.query(params)?;
    let mut events = Vec::new();
    while let Some(row) = rows.next()? {
        events.push(row_to_event(row)?);
    }
    Ok(events)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(&self, event: NewFocusEvent) -> Result<FocusEvent, StorageError> {
        self.with_connection(move |connection| {
            connection.execute(
                "INSERT INTO window_switches (
                    timestamp, window_title, process_name, display_id, category
                ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    to_sortable_timestamp(event.timestamp),
                    &*event.window_title,
                    &*event.process_name,
                    event.display_id,
                    &*event.category,
                ],
            )?;
            let id = connection.last_insert_rowid();
            debug!("Stored focus event {id}");
            Ok(FocusEvent::from_new(id, event))
        })
        .await
    }

    async fn recent_events(&self, limit: usize) -> Result<Vec<FocusEvent>, StorageError> {
        if limit == 0 {
            return Ok(vec![]);
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection(move |connection| {
            collect_events(
                connection,
                "SELECT id, timestamp, window_title, process_name, display_id, category
                 FROM window_switches
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
                params![limit],
            )
        })
        .await
    }

    async fn events_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FocusEvent>, StorageError> {
        let (start, end) = (to_sortable_timestamp(start), to_sortable_timestamp(end));
        self.with_connection(move |connection| {
            collect_events(
                connection,
                "SELECT id, timestamp, window_title, process_name, display_id, category
                 FROM window_switches
                 WHERE timestamp BETWEEN ?1 AND ?2
                 ORDER BY timestamp ASC, id ASC",
                params![start, end],
            )
        })
        .await
    }
}
