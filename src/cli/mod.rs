pub mod categories;
pub mod recent;
pub mod stats;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use categories::{process_categories_command, CategoriesCommand};
use clap::{Parser, Subcommand};
use recent::{process_recent_command, RecentCommand};
use stats::{process_stats_command, StatsCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    engine::{start_engine, tracker::TrackerConfig, EngineOptions},
    utils::{
        dir::{create_application_default_path, ensure_dir},
        logging::{enable_logging, CLI_PREFIX, ENGINE_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "context-tracker", version, long_about = None)]
#[command(about = "Tracks the focused window and reports where your time goes", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Log level, for example info or trace")]
    log_filter: Option<LevelFilter>,
    #[arg(long, global = true, help = "Mirror logs to the console")]
    log_console: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track the focused window in the current console until interrupted")]
    Serve {
        #[arg(long, default_value_t = 1000, help = "Polling interval in milliseconds")]
        interval_ms: u64,
        #[arg(long, default_value_t = 0, help = "Display id recorded with every event")]
        display: u32,
        #[arg(long, help = "Category rules file. Defaults to categories.json in the application directory")]
        categories: Option<PathBuf>,
    },
    #[command(about = "Display time spent per category")]
    Stats {
        #[command(flatten)]
        command: StatsCommand,
    },
    #[command(about = "Display recently focused windows")]
    Recent {
        #[command(flatten)]
        command: RecentCommand,
    },
    #[command(about = "Display the active category rules")]
    Categories {
        #[command(flatten)]
        command: CategoriesCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let dir = match args.dir {
        Some(dir) => ensure_dir(dir)?,
        None => create_application_default_path()?,
    };

    let prefix = match args.commands {
        Commands::Serve { .. } => ENGINE_PREFIX,
        _ => CLI_PREFIX,
    };
    enable_logging(prefix, &dir.join("logs"), args.log_filter, args.log_console)?;

    match args.commands {
        Commands::Serve {
            interval_ms,
            display,
            categories,
        } => {
            start_engine(
                dir,
                EngineOptions {
                    tracker: TrackerConfig {
                        poll_interval: Duration::from_millis(interval_ms),
                        display_id: display,
                    },
                    categories,
                },
            )
            .await
        }
        Commands::Stats { command } => process_stats_command(&dir, command).await,
        Commands::Recent { command } => process_recent_command(&dir, command).await,
        Commands::Categories { command } => process_categories_command(&dir, command),
    }
}
