use std::{fmt::Display, path::Path};

use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{
    engine::{
        storage::{
            entities::TimeSpent,
            event_store::{EventStore, SqliteEventStore},
        },
        DATABASE_FILE,
    },
    utils::{percentage::Percentage, time::format_minutes, time::next_day_start},
};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct StatsCommand {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\". Defaults to the start of today"
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Same format as start. Defaults to now"
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    treat_as_days: bool,
    #[arg(short = 'p', long = "percentage", help = "Only show categories with at least specified percentage", default_value_t = Percentage::default())]
    min_percentage: Percentage,
    #[arg(long, help = "Print as json")]
    json: bool,
}

/// Prints how much time each category took between `start_date` and `end_date`.
pub async fn process_stats_command(
    dir: &Path,
    StatsCommand {
        start_date,
        end_date,
        date_style,
        treat_as_days,
        min_percentage,
        json,
    }: StatsCommand,
) -> Result<()> {
    let (start, end) = parse_range(start_date, end_date, date_style, treat_as_days, Local::now())?;

    let store = SqliteEventStore::open(&dir.join(DATABASE_FILE))?;
    let spent = store
        .time_spent_by_category(start.with_timezone(&Utc), end.with_timezone(&Utc))
        .await?;
    store.close()?;

    let spent = filter_by_percentage(spent, min_percentage);

    if json {
        println!("{}", serde_json::to_string_pretty(&spent)?);
        return Ok(());
    }

    println!(
        "{} - {}",
        start.format("%x %H:%M:%S"),
        end.format("%x %H:%M:%S")
    );
    if spent.is_empty() {
        println!("No activity recorded");
    }
    for entry in spent {
        println!(
            "{}\t{}\t{}",
            Percentage::new_opt(entry.percentage).unwrap_or_default(),
            format_minutes(entry.total_minutes),
            entry.category
        );
    }
    Ok(())
}

fn filter_by_percentage(spent: Vec<TimeSpent>, min_percentage: Percentage) -> Vec<TimeSpent> {
    spent
        .into_iter()
        .filter(|entry| entry.percentage >= *min_percentage)
        .collect()
}

/// Also provides sensible defaults for `stats` command.
fn parse_range(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
    treat_as_days: bool,
    now: DateTime<Local>,
) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let dialect: chrono_english::Dialect = date_style.into();
    let mut start = match start_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate start date {e}"),
                )
                .into());
        }
        None => now.beginning_of_day(),
    };
    let mut end = match end_date.map(|s| parse_date_string(&s, now, dialect)) {
        Some(Ok(v)) => v.with_timezone(&Local),
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate end date {e}"),
                )
                .into());
        }
        None => now,
    };
    if treat_as_days {
        start = start.beginning_of_day();
        end = next_day_start(end)?;
    }
    Ok((start, end))
}
