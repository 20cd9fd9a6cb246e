//! BestRace race results.
//!
//! The yearly schedule at `/{yyyy}schedule.html` links every race page, e.g.
//! `/results/13/131110PURPLE.HTM`; the `yymmdd` prefix of the file name is
//! the race date. Results are plain preformatted text, sometimes inside a
//! `<pre>`, sometimes straight in the body.

use super::{IndexWalk, RaceSource, finisher_records};
use crate::dates::find_date;
use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::{html, text};
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, instrument};
use url::Url;

static BESTRACE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://www.bestrace.com").expect("static url"));

static RACE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^/results/(\d{2})/(\d{2})(\d{2})(\d{2})\w+\.htm$").expect("static regex")
});

/// `Purple Stride 5K - November 10, 2013`
static DATED_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.*?)\s*-\s*[A-Za-z]*\.?\s+\d{1,2},\s*\d{4}$").expect("static regex")
});

#[derive(Debug, Clone)]
pub struct BestRace {
    base: Url,
}

impl Default for BestRace {
    fn default() -> Self {
        Self::new()
    }
}

impl BestRace {
    pub fn new() -> Self {
        Self::with_base_url(BESTRACE_URL.clone())
    }

    pub fn with_base_url(base: Url) -> Self {
        Self { base }
    }

    fn race_date(path: &str, year: i32) -> Option<NaiveDate> {
        let caps = RACE_FILE.captures(path)?;
        let dir_yy: i32 = caps[1].parse().ok()?;
        let yy: i32 = caps[2].parse().ok()?;
        if dir_yy != year % 100 || yy != year % 100 {
            return None;
        }
        NaiveDate::from_ymd_opt(year, caps[3].parse().ok()?, caps[4].parse().ok()?)
    }
}

/// Race name from the page title, without the trailing date.
fn race_name_from_title(title: &str) -> String {
    match DATED_TITLE.captures(title) {
        Some(caps) => caps["name"].trim().to_string(),
        None => title.trim().to_string(),
    }
}

impl RaceSource for BestRace {
    fn source_id(&self) -> SourceId {
        SourceId::BestRace
    }

    #[instrument(level = "info", skip_all, fields(source = "bestrace", %range))]
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        let mut walk = IndexWalk::default();

        for year in range.years() {
            let index_url = self.base.join(&format!("/{year}schedule.html"))?;
            let page = match session.get(&index_url).await {
                Ok(page) => page,
                Err(e) => {
                    walk.page_failed(self.source_id(), &index_url, e);
                    continue;
                }
            };
            walk.page_ok();

            let document = Html::parse_document(&page);
            let found: Vec<CandidateRace> = html::links(&document, &index_url)
                .into_iter()
                .filter_map(|(url, link)| {
                    let date = Self::race_date(url.path(), year)?;
                    if !range.contains(date) {
                        return None;
                    }
                    let mut race = CandidateRace::new(SourceId::BestRace, url.to_string())
                        .with_date(date);
                    let name = html::text_of(link);
                    if !name.is_empty() {
                        race = race.with_name(name);
                    }
                    Some(race)
                })
                .unique_by(|c| c.url.clone())
                .collect();

            info!(count = found.len(), year, "Indexed BestRace races");
            walk.candidates.extend(found);
        }

        walk.finish()
    }

    fn parse_race(
        &self,
        candidate: &CandidateRace,
        raw: &str,
    ) -> Result<Vec<FinisherRecord>, ParseError> {
        let document = Html::parse_document(raw);

        let blocks = html::pre_blocks(&document);
        let listing = if blocks.is_empty() {
            html::body_text(&document)
        } else {
            blocks.join("\n")
        };
        let rows = text::parse_block(&listing);
        if rows.is_empty() {
            return Err(ParseError::UnrecognizedMarkup("no result lines".into()));
        }

        let title = html::title(&document);
        let race_date = candidate
            .race_date
            .or_else(|| title.as_deref().and_then(find_date))
            .or_else(|| find_date(&listing))
            .ok_or(ParseError::MissingField("race date"))?;
        let race_name = title
            .map(|t| race_name_from_title(&t))
            .filter(|t| !t.is_empty())
            .or_else(|| candidate.race_name.clone())
            .ok_or(ParseError::MissingField("race name"))?;

        debug!(rows = rows.len(), "Parsed BestRace race");
        Ok(finisher_records(candidate, &race_name, race_date, rows))
    }
}
