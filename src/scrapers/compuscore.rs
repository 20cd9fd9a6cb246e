//! CompuScore race results.
//!
//! Races are filed by year and by period (`janfeb`, `march`, ..., `novdec`):
//! `/cs2013/april/index.htm` links `/cs2013/april/{race}.htm`. The index does
//! not carry dates, so each race page supplies its own `Race Date:MM-DD-YY`
//! and races outside the range are dropped after parsing.

use super::{IndexWalk, RaceSource, finisher_records};
use crate::dates::period_token;
use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::{html, text};
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::Url;

static COMPUSCORE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://www.compuscore.com").expect("static url"));

static RACE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^/cs(\d{4})/([a-z]+)/(\w+)\.htm$").expect("static regex"));

static RACE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Race\s*Date:\s*(\d{1,2})-(\d{1,2})-(\d{2})").expect("static regex")
});

static H2: Lazy<Selector> = Lazy::new(|| Selector::parse("h2").expect("static selector"));
static H3: Lazy<Selector> = Lazy::new(|| Selector::parse("h3").expect("static selector"));

#[derive(Debug, Clone)]
pub struct CompuScore {
    base: Url,
}

impl Default for CompuScore {
    fn default() -> Self {
        Self::new()
    }
}

impl CompuScore {
    pub fn new() -> Self {
        Self::with_base_url(COMPUSCORE_URL.clone())
    }

    pub fn with_base_url(base: Url) -> Self {
        Self { base }
    }
}

/// `(year, period token)` buckets touched by the range, in order.
fn buckets(range: &DateRange) -> Vec<(i32, &'static str)> {
    range
        .months()
        .into_iter()
        .filter_map(|(year, month)| period_token(month).map(|t| (year, t)))
        .dedup()
        .collect()
}

fn date_in(text: &str) -> Option<NaiveDate> {
    let caps = RACE_DATE.captures(text)?;
    NaiveDate::from_ymd_opt(
        2000 + caps[3].parse::<i32>().ok()?,
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
    )
}

/// The `Race Date:` line, from an `<h3>` when there is one, otherwise from
/// anywhere in the page.
fn race_date(document: &Html, raw: &str) -> Option<NaiveDate> {
    document
        .select(&H3)
        .map(html::text_of)
        .find_map(|t| date_in(&t))
        .or_else(|| date_in(raw))
}

impl RaceSource for CompuScore {
    fn source_id(&self) -> SourceId {
        SourceId::CompuScore
    }

    #[instrument(level = "info", skip_all, fields(source = "compuscore", %range))]
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        let mut walk = IndexWalk::default();

        for (year, token) in buckets(range) {
            let index_url = self.base.join(&format!("/cs{year}/{token}/index.htm"))?;
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
                .filter(|(url, _)| {
                    RACE_FILE.captures(url.path()).is_some_and(|caps| {
                        &caps[1] == year.to_string().as_str()
                            && caps[2].eq_ignore_ascii_case(token)
                            && !caps[3].eq_ignore_ascii_case("index")
                    })
                })
                .map(|(url, link)| {
                    CandidateRace::new(SourceId::CompuScore, url.to_string())
                        .with_name(html::text_of(link))
                })
                .unique_by(|c| c.url.clone())
                .collect();

            info!(count = found.len(), year, period = token, "Indexed CompuScore races");
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
        let race_date = race_date(&document, raw)
            .or(candidate.race_date)
            .ok_or(ParseError::MissingField("race date"))?;

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

        let race_name = html::first_text(&document, &H2)
            .or_else(|| html::title(&document))
            .or_else(|| candidate.race_name.clone().filter(|n| !n.is_empty()))
            .unwrap_or_default();

        debug!(rows = rows.len(), %race_date, "Parsed CompuScore race");
        Ok(finisher_records(candidate, &race_name, race_date, rows))
    }
}
