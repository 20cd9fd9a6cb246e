//! Command-line interface definitions for race_results.
//!
//! Date selection, roster, output and verbosity are global options; each
//! results site is a subcommand carrying its own filters.

use crate::config::{OutputFormat, Verbosity};
use crate::dates;
use crate::error::DateError;
use crate::models::DateRange;
use crate::scrapers::{Active, Adapter, BestRace, CompuScore, CoolRunning, LmSports, Nyrr};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Collect a running club's race results from race-timing websites.
///
/// # Examples
///
/// ```sh
/// # CoolRunning, Massachusetts and New Hampshire, first week of March 2013
/// race_results -y 2013 --month 3 -d 1-7 -m members.csv coolrunning --states ma,nh
///
/// # CompuScore, whole Jan/Feb period, JSON report
/// race_results -y 2013 --period janfeb -m members.csv -o results.json compuscore
///
/// # NYRR team search, no roster needed
/// race_results -y 2012 --month 12 nyrr --team RARI
///
/// # Saved BestRace pages, no network
/// race_results -m members.csv --race-list saved.txt bestrace
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Year of the races (defaults to the current year)
    #[arg(short, long, global = true)]
    pub year: Option<i32>,

    /// Month number 1-12 (defaults to the current month)
    #[arg(long, global = true)]
    pub month: Option<u32>,

    /// CompuScore-style period token (janfeb, march, ..., novdec); overrides --month
    #[arg(long, global = true)]
    pub period: Option<String>,

    /// Day or day range within the month, e.g. 5 or 5-12
    #[arg(short, long, global = true)]
    pub days: Option<String>,

    /// Membership roster CSV
    #[arg(short, long, global = true, env = "RACE_RESULTS_MEMBERSHIP")]
    pub membership: Option<PathBuf>,

    /// Report file to write
    #[arg(short, long, global = true, default_value = "results.html")]
    pub output: PathBuf,

    /// Report format (inferred from the output extension when omitted)
    #[arg(long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Log level
    #[arg(short, long, global = true, value_enum, default_value_t = Verbosity::Info)]
    pub verbose: Verbosity,

    /// Parse saved result pages named in this file (one path per line)
    /// instead of reading the live site
    #[arg(long, global = true)]
    pub race_list: Option<PathBuf>,

    /// Optional path to a YAML file with fetch settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub source: SourceCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum SourceCommand {
    /// CoolRunning (New England)
    Coolrunning {
        /// Comma-separated state codes
        #[arg(long, value_delimiter = ',', default_value = "ma")]
        states: Vec<String>,
    },
    /// BestRace (New York / New Jersey)
    Bestrace,
    /// CompuScore (New Jersey)
    Compuscore,
    /// New York Road Runners team search
    Nyrr {
        /// NYRR team code, e.g. RARI
        #[arg(long)]
        team: String,
    },
    /// Active.com location search
    Active {
        /// "City, ST" to search around
        #[arg(long)]
        location: String,

        /// Search radius in miles
        #[arg(long, default_value_t = 50)]
        radius: u32,
    },
    /// L&M Sports (South Jersey)
    Lmsports,
}

impl SourceCommand {
    pub fn adapter(&self) -> Adapter {
        match self {
            SourceCommand::Coolrunning { states } => {
                Adapter::CoolRunning(CoolRunning::new(states.clone()))
            }
            SourceCommand::Bestrace => Adapter::BestRace(BestRace::new()),
            SourceCommand::Compuscore => Adapter::CompuScore(CompuScore::new()),
            SourceCommand::Nyrr { team } => Adapter::Nyrr(Nyrr::new(team.as_str())),
            SourceCommand::Active { location, radius } => {
                Adapter::Active(Active::new(location.as_str(), *radius))
            }
            SourceCommand::Lmsports => Adapter::LmSports(LmSports::new()),
        }
    }
}

impl Cli {
    /// Resolve the date options against `today`.
    pub fn date_range(&self, today: NaiveDate) -> Result<DateRange, DateError> {
        let year = self.year.unwrap_or_else(|| today.year());
        let month = self.month.unwrap_or_else(|| today.month());
        let day_range = self.days.as_deref().map(dates::parse_day_range).transpose()?;
        dates::resolve(year, month, day_range, self.period.as_deref(), today)
    }
}
