use thiserror::Error;

/// Failures of the event store. Raised by both the append path used while tracking and the query
/// path used for reporting.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("event store query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored event is malformed: {0}")]
    Malformed(String),
    #[error("event store is closed")]
    Closed,
    #[error("event store worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
