use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A focus switch detected by the tracker, before the store assigned it an id.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct NewFocusEvent {
    pub timestamp: DateTime<Utc>,
    pub window_title: Arc<str>,
    pub process_name: Arc<str>,
    pub display_id: u32,
    pub category: Arc<str>,
}

/// A persisted focus switch. Never mutated once written.
#[derive(PartialEq, Eq, Debug, Clone, Serialize)]
pub struct FocusEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub window_title: Arc<str>,
    pub process_name: Arc<str>,
    pub display_id: u32,
    pub category: Arc<str>,
}

impl FocusEvent {
    pub fn from_new(id: i64, event: NewFocusEvent) -> Self {
        let NewFocusEvent {
            timestamp,
            window_title,
            process_name,
            display_id,
            category,
        } = event;
        Self {
            id,
            timestamp,
            window_title,
            process_name,
            display_id,
            category,
        }
    }
}

/// Row of the recent windows listing shown to the user.
#[derive(PartialEq, Eq, Debug, Clone, Serialize)]
pub struct RecentWindow {
    pub title: Arc<str>,
    pub category: Arc<str>,
    pub timestamp: DateTime<Utc>,
}

impl From<FocusEvent> for RecentWindow {
    fn from(
        FocusEvent {
            window_title,
            category,
            timestamp,
            ..
        }: FocusEvent,
    ) -> Self {
        RecentWindow {
            title: window_title,
            category,
            timestamp,
        }
    }
}

/// Time attributed to a category within a reporting window.
#[derive(PartialEq, Debug, Clone, Serialize)]
pub struct TimeSpent {
    pub category: Arc<str>,
    pub total_minutes: f64,
    pub percentage: f64,
}
