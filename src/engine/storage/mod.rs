//!  Storage is organized through [event_store::SqliteEventStore].
//!  The basic idea is:
//!   - Every detected focus switch is one immutable row in an append-only SQLite table.
//!   - Timestamps are stored as fixed-width RFC 3339 strings so range scans use the index.
//!   - Durations are never stored, they are derived from consecutive rows when reporting.

pub mod entities;
pub mod event_store;
pub mod schema;
