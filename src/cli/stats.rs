use std::fmt::Display;

use anyhow::Result;
use chrono::{Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{
    daemon::{
        stats::{counts::WindowCounts, log::KeystrokeLog},
        storage::snapshot::{SnapshotStorage, SnapshotStorageImpl},
    },
    utils::dir::create_application_default_path,
};

use super::{process::kill_previous_servers, Args};

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
        long,
        short,
        help = "Day to count keystrokes for instead of the sliding windows. Examples are \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(long, help = "Also print today's per-hour breakdown")]
    hourly: bool,
}

const HISTOGRAM_WIDTH: usize = 40;

/// Command to process `stats`. Loads the snapshot the daemon maintains and
/// answers from it; the daemon itself is never contacted, the snapshot file
/// is the only shared state between the two processes.
pub async fn process_stats_command(
    StatsCommand {
        date,
        date_style,
        hourly,
    }: StatsCommand,
) -> Result<()> {
    let storage = SnapshotStorageImpl::new(create_application_default_path()?)?;
    let log = KeystrokeLog::from_timestamps(storage.load().await?);

    if let Some(date) = date {
        let day = match parse_date_string(&date, Local::now(), date_style.into()) {
            Ok(v) => v.date_naive(),
            Err(e) => {
                return Err(Args::command()
                    .error(
                        clap::error::ErrorKind::ValueValidation,
                        format!("Failed to validate date {e}"),
                    )
                    .into());
            }
        };
        println!("{}\t{}", day.format("%x"), log.count_on_date(day));
        return Ok(());
    }

    let counts = WindowCounts::compute(&log, Utc::now());
    println!("Total (7 days)\t{}", counts.total);
    println!("Last minute\t{}", counts.last_minute);
    println!("Last hour\t{}", counts.last_hour);
    println!("Last day\t{}", counts.last_day);

    if hourly {
        println!();
        print_hourly_breakdown(&log);
    }
    Ok(())
}

fn print_hourly_breakdown(log: &KeystrokeLog) {
    let today = Local::now().beginning_of_day().date_naive();
    let buckets = log.hourly_breakdown(today);
    let busiest = *buckets.iter().max().expect("24 buckets are never empty");
    for (hour, count) in buckets.iter().enumerate() {
        let width = if busiest == 0 {
            0
        } else {
            count * HISTOGRAM_WIDTH / busiest
        };
        println!("{hour:02}h\t{count}\t{}", "#".repeat(width));
    }
}

/// Command to process `clear`: stops running daemons, wipes the persisted
/// history and leaves it to the user to start tracking again.
pub async fn process_clear_command() -> Result<()> {
    let process_name = std::env::current_exe().expect("Can't operate without an executable");
    kill_previous_servers(&process_name);

    let storage = SnapshotStorageImpl::new(create_application_default_path()?)?;
    storage.save(&[], Utc::now()).await?;

    println!("Keystroke history cleared. Run `keytally init` to resume tracking.");
    Ok(())
}
