mod agenda;

use std::path::PathBuf;

use anyhow::Result;
use calgrid_core::{CalendarSet, Config};
use chrono::{Local, NaiveDate};
use clap::{ArgAction, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser)]
#[command(name = "calgrid")]
#[command(version, about = "View and edit iCalendar files from the terminal")]
struct Cli {
    /// Calendars to display (read-only)
    calendars: Vec<PathBuf>,

    /// Write edits to this calendar
    #[arg(short = 'w', long)]
    write_calendar: Option<PathBuf>,

    /// Anchor the visible window on this date instead of today
    #[arg(short = 'd', long)]
    date: Option<NaiveDate>,

    /// Use an alternative config file
    #[arg(short = 'f', long)]
    config_file: Option<PathBuf>,

    /// Increase verbosity. Repeat for greater increase.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity. Repeat for greater decrease.
    #[arg(short, long, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete an event from the writable calendar
    Delete { uid: String },

    /// Exclude a single occurrence of a recurring event
    Exclude {
        uid: String,

        /// Occurrence start, e.g. "2024-03-20T15:00" or "2024-03-20"
        start: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config_path = match &cli.config_file {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "error reading config file; using defaults");
            Config::default()
        }
    };

    let mut set = CalendarSet::open(cli.write_calendar, cli.calendars)?;

    match cli.command {
        Some(Commands::Delete { uid }) => {
            set.delete(&uid)?;
            set.save()?;
        }
        Some(Commands::Exclude { uid, start }) => {
            let instant = agenda::parse_event_time(&start)?;
            set.exclude_occurrence(&uid, instant)?;
            set.save()?;
        }
        None => {
            let anchor = cli.date.unwrap_or_else(|| Local::now().date_naive());
            agenda::print_window(&set, &config, anchor)?;
        }
    }
    Ok(())
}

/// Map stacked -v/-q flags onto a log level, warnings by default.
fn init_logging(verbose: u8, quiet: u8) {
    let level = match (2i16 + i16::from(quiet) - i16::from(verbose)).clamp(0, 4) {
        0 => LevelFilter::TRACE,
        1 => LevelFilter::DEBUG,
        2 => LevelFilter::WARN,
        3 => LevelFilter::ERROR,
        _ => LevelFilter::OFF,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .without_time()
        .init();
}
