use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::utils::{percentage::Percentage, time::duration_minutes};

use super::storage::entities::{FocusEvent, TimeSpent};

/// Computes how many minutes each category occupied within `[start, end]`.
///
/// `events` are expected oldest first. Only events whose timestamp lies within `[start, end]`
/// take part. Each of them occupies the screen until the next one, and the last one until `end`.
/// An event that started before `start` gets no credit for the part of its interval inside the
/// range. Categories with a non-positive total are dropped, the rest is sorted by time spent,
/// longest first.
pub fn time_spent_by_category(
    events: &[FocusEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<TimeSpent> {
    if start >= end {
        return vec![];
    }

    let in_range = events
        .iter()
        .filter(|event| start <= event.timestamp && event.timestamp <= end)
        .collect::<Vec<_>>();

    let mut minutes = HashMap::<Arc<str>, f64>::new();
    for (index, event) in in_range.iter().enumerate() {
        let interval_end = in_range
            .get(index + 1)
            .map_or(end, |next| next.timestamp);
        let duration = duration_minutes(interval_end - event.timestamp);
        trace!("{} occupied {duration} minutes", event.window_title);
        *minutes.entry(event.category.clone()).or_default() += duration;
    }

    let minutes = minutes
        .into_iter()
        .filter(|(_, total)| *total > 0.)
        .collect::<Vec<_>>();

    let grand_total: f64 = minutes.iter().map(|(_, total)| total).sum();

    let mut usages = minutes
        .into_iter()
        .filter_map(|(category, total_minutes)| {
            Percentage::of(total_minutes, grand_total).map(|percentage| TimeSpent {
                category,
                total_minutes,
                percentage: *percentage,
            })
        })
        .collect::<Vec<_>>();

    usages.sort_by(|a, b| {
        b.total_minutes
            .total_cmp(&a.total_minutes)
            .then_with(|| a.category.cmp(&b.category))
    });
    usages
}
