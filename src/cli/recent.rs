use std::path::Path;

use anyhow::Result;
use chrono::Local;
use clap::Parser;

use crate::engine::{
    storage::{
        entities::RecentWindow,
        event_store::{EventStore, SqliteEventStore},
    },
    DATABASE_FILE,
};

#[derive(Debug, Parser)]
pub struct RecentCommand {
    #[arg(short, long, default_value_t = 10, help = "How many windows to show")]
    limit: usize,
    #[arg(long, help = "Print as json")]
    json: bool,
}

/// Prints the most recently focused windows, newest first.
pub async fn process_recent_command(
    dir: &Path,
    RecentCommand { limit, json }: RecentCommand,
) -> Result<()> {
    let store = SqliteEventStore::open(&dir.join(DATABASE_FILE))?;
    let recent = store
        .recent_events(limit)
        .await?
        .into_iter()
        .map(RecentWindow::from)
        .collect::<Vec<_>>();
    store.close()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recent)?);
        return Ok(());
    }

    for window in recent {
        println!(
            "{}\t{}\t{}",
            window.timestamp.with_timezone(&Local).format("%x %H:%M:%S"),
            window.category,
            window.title
        );
    }
    Ok(())
}
