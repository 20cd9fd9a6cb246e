//! # race_results
//!
//! Collects a running club's results from race-timing websites. Each site
//! publishes results differently (HTML tables, `<pre>` text, CSV downloads,
//! dates hidden in file names); every one is reduced to the same finisher
//! records, matched by name against the club roster, and written out as one
//! HTML or JSON report.
//!
//! ## Usage
//!
//! ```sh
//! race_results -y 2013 --month 3 -m members.csv coolrunning --states ma,nh
//! race_results -y 2012 --month 12 -o nyrr.json nyrr --team RARI
//! race_results -m members.csv --race-list saved.txt lmsports
//! ```
//!
//! ## Architecture
//!
//! 1. **Dates**: resolve year/month/days or a period token into a range
//! 2. **Discovery**: the site adapter lists candidate races in the range,
//!    or a race list names saved pages
//! 3. **Fetch + parse**: candidates are downloaded and parsed concurrently
//! 4. **Match**: finisher names are looked up in the roster
//! 5. **Output**: ordered results go to the HTML or JSON writer

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod cli;
mod config;
mod dates;
mod error;
mod fetch;
mod markup;
mod matcher;
mod membership;
mod models;
mod outputs;
mod pipeline;
mod race_list;
mod retry;
mod scrapers;
mod utils;

use cli::Cli;
use config::{FetchSettings, RunConfig};
use fetch::{HttpFetcher, LocalPages, Session};
use pipeline::Roster;
use retry::RetryFetch;
use scrapers::RaceSource;
use utils::ensure_writable_parent;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.verbose.filter_directive()));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("race_results starting up");
    debug!(?args, "Parsed CLI arguments");

    // Bad dates are fatal before any network I/O.
    let range = match args.date_range(Local::now().date_naive()) {
        Ok(range) => range,
        Err(e) => {
            error!(error = %e, "Invalid date selection");
            return Err(e.into());
        }
    };

    let settings = match &args.config {
        Some(path) => FetchSettings::load(path).await?,
        None => FetchSettings::default(),
    };
    let config = RunConfig::new(settings, args.verbose, args.output.clone(), args.format);
    info!(
        output = %config.output.display(),
        format = ?config.format,
        verbosity = ?config.verbosity,
        concurrency = config.concurrency,
        "Run configured"
    );

    if let Err(e) = ensure_writable_parent(&config.output).await {
        error!(
            path = %config.output.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let adapter = args.source.adapter();

    let index = match &args.membership {
        Some(path) => Some(membership::load_membership(path).await?),
        None => None,
    };
    let roster = match &index {
        Some(index) => {
            info!(members = index.len(), "Matching against membership roster");
            Roster::Index(index)
        }
        None if adapter.team_filtered() => {
            info!(source = %adapter.source_id(), "No roster given; using the site's team filter");
            Roster::TeamFiltered
        }
        None => {
            error!(source = %adapter.source_id(), "A membership roster is required for this source");
            return Err("missing --membership roster".into());
        }
    };

    let report = match &args.race_list {
        Some(list) => {
            let candidates = race_list::load_race_list(list, adapter.source_id()).await?;
            info!(pages = candidates.len(), "Parsing saved pages; the site is not contacted");
            let session = Session::new(&LocalPages, config.fetch_timeout);
            pipeline::run_listed(&adapter, &session, roster, &candidates, range, &config).await
        }
        None => {
            let fetcher = HttpFetcher::new(&config.user_agent)?;
            let fetcher = RetryFetch::new(fetcher, config.max_retries, config.retry_base_delay);
            let session = Session::new(&fetcher, config.fetch_timeout);
            pipeline::run(&adapter, &session, roster, range, &config).await
        }
    };
    if report.timed_out {
        warn!("Run deadline reached; report is partial");
    }

    if let Err(e) = outputs::write_report(&report, &config).await {
        error!(path = %config.output.display(), error = %e, "Failed to write report");
        return Err(e);
    }

    let elapsed = start_time.elapsed();
    info!(
        elapsed_secs = elapsed.as_secs_f64(),
        results = report.results.len(),
        ambiguous = report.ambiguous.len(),
        skipped = report.skipped.len(),
        "race_results finished"
    );

    Ok(())
}
