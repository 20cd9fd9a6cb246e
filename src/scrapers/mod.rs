//! Site adapters for the race-timing websites.
//!
//! Every adapter follows the same three-step pattern:
//!
//! 1. **Enumeration**: walk the site's index pages and list the races that
//!    fall inside the requested date range
//! 2. **Fetching**: download the raw markup for one race (sometimes several
//!    requests)
//! 3. **Parsing**: turn that markup into [`FinisherRecord`]s
//!
//! # Supported Sources
//!
//! | Source | Module | Index | Results markup |
//! |--------|--------|-------|----------------|
//! | CoolRunning | [`coolrunning`] | per year and state | `<pre>` text, Cape Cod tables |
//! | BestRace | [`bestrace`] | per year | `<pre>` or bare text |
//! | CompuScore | [`compuscore`] | per year and period | `<pre>` text |
//! | NYRR | [`nyrr`] | year search form | team search table |
//! | Active.com | [`active`] | location search | CSV download or `<pre>` |
//! | L&M Sports | [`lmsports`] | per year | `<pre>` text |
//!
//! Failures of one index page are logged and skipped. Only when every index
//! page fails does enumeration itself fail.

pub mod active;
pub mod bestrace;
pub mod compuscore;
pub mod coolrunning;
pub mod lmsports;
pub mod nyrr;

use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::RowFields;
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use chrono::NaiveDate;
use tracing::warn;
use url::Url;

pub use active::Active;
pub use bestrace::BestRace;
pub use compuscore::CompuScore;
pub use coolrunning::CoolRunning;
pub use lmsports::LmSports;
pub use nyrr::Nyrr;

/// Capability interface every site adapter implements.
pub trait RaceSource {
    fn source_id(&self) -> SourceId;

    /// List the races in `range`. Does not fetch race content.
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError>;

    /// Download the markup `parse_race` needs, one string per page.
    async fn fetch_race<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        candidate: &CandidateRace,
    ) -> Result<Vec<String>, FetchError> {
        let url = Url::parse(&candidate.url)?;
        Ok(vec![session.get(&url).await?])
    }

    /// Extract finisher records from one page of a race.
    fn parse_race(
        &self,
        candidate: &CandidateRace,
        raw: &str,
    ) -> Result<Vec<FinisherRecord>, ParseError>;

    /// Whether results are already limited to the club's team, so that a
    /// run without a roster can treat every finisher as a member.
    fn team_filtered(&self) -> bool {
        false
    }
}

/// The adapter chosen for a run.
#[derive(Debug, Clone)]
pub enum Adapter {
    CoolRunning(CoolRunning),
    BestRace(BestRace),
    CompuScore(CompuScore),
    Nyrr(Nyrr),
    Active(Active),
    LmSports(LmSports),
}

impl RaceSource for Adapter {
    fn source_id(&self) -> SourceId {
        match self {
            Adapter::CoolRunning(a) => a.source_id(),
            Adapter::BestRace(a) => a.source_id(),
            Adapter::CompuScore(a) => a.source_id(),
            Adapter::Nyrr(a) => a.source_id(),
            Adapter::Active(a) => a.source_id(),
            Adapter::LmSports(a) => a.source_id(),
        }
    }

    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        match self {
            Adapter::CoolRunning(a) => a.enumerate_races(session, range).await,
            Adapter::BestRace(a) => a.enumerate_races(session, range).await,
            Adapter::CompuScore(a) => a.enumerate_races(session, range).await,
            Adapter::Nyrr(a) => a.enumerate_races(session, range).await,
            Adapter::Active(a) => a.enumerate_races(session, range).await,
            Adapter::LmSports(a) => a.enumerate_races(session, range).await,
        }
    }

    async fn fetch_race<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        candidate: &CandidateRace,
    ) -> Result<Vec<String>, FetchError> {
        match self {
            Adapter::CoolRunning(a) => a.fetch_race(session, candidate).await,
            Adapter::BestRace(a) => a.fetch_race(session, candidate).await,
            Adapter::CompuScore(a) => a.fetch_race(session, candidate).await,
            Adapter::Nyrr(a) => a.fetch_race(session, candidate).await,
            Adapter::Active(a) => a.fetch_race(session, candidate).await,
            Adapter::LmSports(a) => a.fetch_race(session, candidate).await,
        }
    }

    fn parse_race(
        &self,
        candidate: &CandidateRace,
        raw: &str,
    ) -> Result<Vec<FinisherRecord>, ParseError> {
        match self {
            Adapter::CoolRunning(a) => a.parse_race(candidate, raw),
            Adapter::BestRace(a) => a.parse_race(candidate, raw),
            Adapter::CompuScore(a) => a.parse_race(candidate, raw),
            Adapter::Nyrr(a) => a.parse_race(candidate, raw),
            Adapter::Active(a) => a.parse_race(candidate, raw),
            Adapter::LmSports(a) => a.parse_race(candidate, raw),
        }
    }

    fn team_filtered(&self) -> bool {
        match self {
            Adapter::Nyrr(a) => a.team_filtered(),
            _ => false,
        }
    }
}

/// Collects the outcome of each index page during enumeration.
#[derive(Debug, Default)]
pub(crate) struct IndexWalk {
    pub candidates: Vec<CandidateRace>,
    pages_ok: usize,
    last_error: Option<FetchError>,
}

impl IndexWalk {
    pub fn page_ok(&mut self) {
        self.pages_ok += 1;
    }

    pub fn page_failed(&mut self, source: SourceId, url: &Url, err: FetchError) {
        warn!(%source, %url, error = %err, "Index page failed; skipping");
        self.last_error = Some(err);
    }

    /// The candidates, or the last error when no index page could be read.
    pub fn finish(self) -> Result<Vec<CandidateRace>, FetchError> {
        match (self.pages_ok, self.last_error) {
            (0, Some(err)) => Err(err),
            _ => Ok(self.candidates),
        }
    }
}

/// Stamp race metadata onto parsed rows.
pub(crate) fn finisher_records(
    candidate: &CandidateRace,
    race_name: &str,
    race_date: NaiveDate,
    rows: Vec<RowFields>,
) -> Vec<FinisherRecord> {
    rows.into_iter()
        .map(|row| FinisherRecord {
            raw_name: row.raw_name,
            place: row.place,
            time: row.time,
            race_date,
            source_id: candidate.source_id,
            race_name: race_name.to_string(),
            race_url: candidate.url.clone(),
        })
        .collect()
}
