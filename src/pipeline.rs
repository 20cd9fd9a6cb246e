//! One end-to-end run: enumerate, fetch and parse concurrently, match,
//! aggregate.
//!
//! Candidate races are processed as a `buffer_unordered` stream. This loop is
//! the only writer of the run's outcome lists. An overall deadline ends the
//! loop early; whatever completed by then is still aggregated and the report
//! is flagged as timed out.
//!
//! [`run_listed`] drives the same loop over saved pages from a race list,
//! skipping enumeration and the adapter's own fetching.

use crate::aggregate::aggregate;
use crate::config::RunConfig;
use crate::error::{FetchError, RaceError};
use crate::fetch::{Fetch, Session};
use crate::matcher::{MatchOutcome, MembershipIndex, match_finisher, member_from_name};
use crate::models::{
    AmbiguousFinisher, CandidateRace, DateRange, FinisherRecord, MatchConfidence, MatchedResult,
    RunReport, SkipKind, SkippedRace, SourceId,
};
use crate::scrapers::{Adapter, RaceSource};
use crate::utils::truncate_for_log;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Who counts as a club member for this run.
#[derive(Debug, Clone, Copy)]
pub enum Roster<'a> {
    /// Match names against the loaded membership list.
    Index(&'a MembershipIndex),
    /// The source already filtered by team; every finisher is a member.
    TeamFiltered,
}

/// How a run gets its race pages, and which records it keeps.
#[derive(Debug, Clone, Copy)]
enum Pages<'r> {
    /// Downloaded through the adapter; records outside the range are dropped.
    Site(&'r DateRange),
    /// Saved pages read as they are; every record is kept.
    Listed,
}

/// Fetch and parse one candidate. Pages that fail to parse are skipped as
/// long as at least one page of the race parses.
#[instrument(level = "debug", skip_all, fields(url = %candidate.url, location = ?candidate.location_filter))]
async fn process_race<F: Fetch>(
    adapter: &Adapter,
    session: &Session<'_, F>,
    candidate: &CandidateRace,
    source: Pages<'_>,
) -> Result<Vec<FinisherRecord>, RaceError> {
    let pages = match source {
        Pages::Site(_) => adapter.fetch_race(session, candidate).await?,
        Pages::Listed => {
            let url = Url::parse(&candidate.url).map_err(FetchError::from)?;
            vec![session.get(&url).await?]
        }
    };

    let mut records = Vec::new();
    let mut first_error = None;
    let mut parsed_pages = 0usize;
    for page in &pages {
        match adapter.parse_race(candidate, page) {
            Ok(found) => {
                parsed_pages += 1;
                records.extend(found);
            }
            Err(e) => {
                debug!(error = %e, page = %truncate_for_log(page, 200), "Page did not parse");
                first_error.get_or_insert(e);
            }
        }
    }

    match (parsed_pages, first_error) {
        (0, Some(e)) => Err(e.into()),
        _ => Ok(records),
    }
}

#[derive(Debug, Default)]
struct Collected {
    matched: Vec<MatchedResult>,
    ambiguous: Vec<AmbiguousFinisher>,
    skipped: Vec<SkippedRace>,
    races_parsed: usize,
    out_of_range: usize,
    unmatched: usize,
    /// Earliest and latest race dates among kept records.
    span: Option<(NaiveDate, NaiveDate)>,
    timed_out: bool,
}

impl Collected {
    fn record(
        &mut self,
        candidate: &CandidateRace,
        records: Vec<FinisherRecord>,
        roster: Roster<'_>,
        source: Pages<'_>,
    ) {
        self.races_parsed += 1;
        for finisher in records {
            if let Pages::Site(range) = source {
                if !range.contains(finisher.race_date) {
                    self.out_of_range += 1;
                    continue;
                }
            }
            let date = finisher.race_date;
            self.span = Some(match self.span {
                Some((lo, hi)) => (lo.min(date), hi.max(date)),
                None => (date, date),
            });
            match roster {
                Roster::TeamFiltered => self.matched.push(MatchedResult {
                    member: member_from_name(&finisher.raw_name),
                    finisher,
                    confidence: MatchConfidence::Exact,
                }),
                Roster::Index(index) => match match_finisher(finisher, index) {
                    MatchOutcome::Matched(m) => self.matched.push(m),
                    MatchOutcome::Unmatched(u) if u.ambiguous => {
                        warn!(
                            name = %u.finisher.raw_name,
                            candidates = u.candidates.len(),
                            url = %candidate.url,
                            "Ambiguous finisher; not attributed"
                        );
                        self.ambiguous.push(AmbiguousFinisher {
                            finisher: u.finisher,
                            candidates: u.candidates,
                        });
                    }
                    MatchOutcome::Unmatched(_) => self.unmatched += 1,
                },
            }
        }
    }

    fn skip(&mut self, candidate: &CandidateRace, err: RaceError) {
        let kind = match err {
            RaceError::Fetch(_) => SkipKind::Fetch,
            RaceError::Parse(_) => SkipKind::Parse,
        };
        warn!(url = %candidate.url, error = %err, ?kind, "Race skipped");
        self.skipped.push(SkippedRace {
            url: candidate.url.clone(),
            race_name: candidate.race_name.clone(),
            kind,
            reason: err.to_string(),
        });
    }

    /// Fetch, parse and match every candidate, `concurrency` at a time, until
    /// all are done or `deadline` passes.
    #[allow(clippy::too_many_arguments)]
    async fn process_all<F: Fetch>(
        &mut self,
        adapter: &Adapter,
        session: &Session<'_, F>,
        roster: Roster<'_>,
        candidates: &[CandidateRace],
        source: Pages<'_>,
        concurrency: usize,
        deadline: Instant,
    ) {
        let mut outcomes = stream::iter(candidates.iter())
            .map(|candidate| async move {
                (candidate, process_race(adapter, session, candidate, source).await)
            })
            .buffer_unordered(concurrency.max(1));

        while !self.timed_out {
            match timeout_at(deadline, outcomes.next()).await {
                Ok(Some((candidate, Ok(records)))) => {
                    debug!(url = %candidate.url, records = records.len(), "Race parsed");
                    self.record(candidate, records, roster, source);
                }
                Ok(Some((candidate, Err(e)))) => self.skip(candidate, e),
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        completed = self.races_parsed + self.skipped.len(),
                        total = candidates.len(),
                        "Run deadline reached; keeping partial results"
                    );
                    self.timed_out = true;
                }
            }
        }
    }

    /// Order the side lists, aggregate the matches and build the report.
    fn into_report(
        self,
        source_id: SourceId,
        date_range: DateRange,
        races_attempted: usize,
    ) -> RunReport {
        let Collected {
            matched,
            mut ambiguous,
            mut skipped,
            races_parsed,
            out_of_range,
            unmatched,
            timed_out,
            ..
        } = self;

        ambiguous.sort_by(|a, b| {
            (a.finisher.race_date, &a.finisher.race_url, &a.finisher.raw_name).cmp(&(
                b.finisher.race_date,
                &b.finisher.race_url,
                &b.finisher.raw_name,
            ))
        });
        skipped.sort_by(|a, b| (a.kind as u8, &a.url).cmp(&(b.kind as u8, &b.url)));

        let results = aggregate(matched);
        info!(
            races = races_attempted,
            parsed = races_parsed,
            skipped = skipped.len(),
            matched = results.len(),
            ambiguous = ambiguous.len(),
            unmatched,
            out_of_range,
            timed_out,
            "Run finished"
        );

        RunReport {
            source_id,
            date_range,
            results,
            ambiguous,
            skipped,
            races_attempted,
            races_parsed,
            timed_out,
        }
    }
}

/// Run one adapter over a date range and build the report.
///
/// # Arguments
///
/// * `adapter` - The site to read
/// * `session` - Fetcher and per-request timeout for every page
/// * `roster` - Who counts as a club member
/// * `range` - Races and finisher records outside it are left out
/// * `config` - Concurrency and the overall run deadline
///
/// # Returns
///
/// The report, always. A failed enumeration becomes a single discovery skip,
/// failed races become fetch or parse skips, and a run that reaches its
/// deadline keeps whatever finished and sets `timed_out`.
#[instrument(level = "info", skip_all, fields(source = %adapter.source_id(), %range))]
pub async fn run<F: Fetch>(
    adapter: &Adapter,
    session: &Session<'_, F>,
    roster: Roster<'_>,
    range: DateRange,
    config: &RunConfig,
) -> RunReport {
    let source_id = adapter.source_id();
    let deadline = Instant::now() + config.run_timeout;
    let mut collected = Collected::default();

    let candidates = match timeout_at(deadline, adapter.enumerate_races(session, &range)).await {
        Ok(Ok(candidates)) => candidates,
        Ok(Err(e)) => {
            warn!(error = %e, "Race discovery failed");
            collected.skipped.push(SkippedRace {
                url: source_id.display_name().to_string(),
                race_name: None,
                kind: SkipKind::Discovery,
                reason: e.to_string(),
            });
            Vec::new()
        }
        Err(_) => {
            warn!("Run deadline reached during race discovery");
            collected.timed_out = true;
            Vec::new()
        }
    };
    info!(count = candidates.len(), "Candidate races to process");

    collected
        .process_all(
            adapter,
            session,
            roster,
            &candidates,
            Pages::Site(&range),
            config.concurrency,
            deadline,
        )
        .await;
    collected.into_report(source_id, range, candidates.len())
}

/// Parse saved race pages with one adapter and build the report.
///
/// Nothing is enumerated: each candidate's page is read once through
/// `session` and handed to the adapter's parser. Records are kept whatever
/// their date, and the report covers the span of race dates found. `range`
/// only labels a report in which no page parsed.
#[instrument(level = "info", skip_all, fields(source = %adapter.source_id(), pages = candidates.len()))]
pub async fn run_listed<F: Fetch>(
    adapter: &Adapter,
    session: &Session<'_, F>,
    roster: Roster<'_>,
    candidates: &[CandidateRace],
    range: DateRange,
    config: &RunConfig,
) -> RunReport {
    let deadline = Instant::now() + config.run_timeout;
    let mut collected = Collected::default();
    collected
        .process_all(
            adapter,
            session,
            roster,
            candidates,
            Pages::Listed,
            config.concurrency,
            deadline,
        )
        .await;

    let date_range = collected
        .span
        .and_then(|(lo, hi)| DateRange::new(lo, hi).ok())
        .unwrap_or(range);
    collected.into_report(adapter.source_id(), date_range, candidates.len())
}
