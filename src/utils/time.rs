use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveTime, SecondsFormat, TimeZone, Utc};

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> Result<DateTime<Tz>> {
    (date + Duration::days(1))
        .with_time(NaiveTime::MIN)
        .earliest()
        .ok_or_else(|| anyhow!("Start of the next day doesn't exist in this timezone"))
}

/// Fractional minutes in `duration`, millisecond precision.
pub fn duration_minutes(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 60_000.
}

/// Encodes a timestamp so that lexicographic order matches chronological order. Every value has
/// the same width: UTC, microsecond precision, `Z` suffix.
pub fn to_sortable_timestamp(moment: DateTime<Utc>) -> String {
    moment.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_sortable_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| anyhow!("Invalid timestamp '{value}': {e}"))
}

pub fn format_minutes(minutes: f64) -> String {
    let total_seconds = (minutes * 60.).round() as i64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds / 60) % 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        duration_minutes, format_minutes, parse_sortable_timestamp, to_sortable_timestamp,
    };

    #[test]
    fn test_sortable_timestamp_keeps_order() {
        let early = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let late = early + Duration::milliseconds(1);
        let (a, b) = (to_sortable_timestamp(early), to_sortable_timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_sortable_timestamp(&b).unwrap(), late);
    }

    #[test]
    fn test_duration_minutes_fractional() {
        assert_eq!(duration_minutes(Duration::seconds(90)), 1.5);
        assert_eq!(duration_minutes(Duration::minutes(-2)), -2.);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(0.5), "30s");
        assert_eq!(format_minutes(10.), "10m0s");
        assert_eq!(format_minutes(61.25), "1h1m15s");
    }
}
