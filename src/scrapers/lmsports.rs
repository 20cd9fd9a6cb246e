//! L&M Sports race results (South Jersey shore).
//!
//! One master page per year, `/results{yy}.htm`, lists every race as
//! `<a href="trail13.htm">Trail Run</a> - Saturday, November 2, 2013 - ...`.
//! Race pages are preformatted text.

use super::{IndexWalk, RaceSource, finisher_records};
use crate::dates::find_date;
use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::{html, text};
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{debug, info, instrument};
use url::Url;

static LMSPORTS_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://www.lmsports.com").expect("static url"));

/// Race pages sit at the top level and end in a two-digit year.
static RACE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^/\w*?\d\d\.htm$").expect("static regex"));

#[derive(Debug, Clone)]
pub struct LmSports {
    base: Url,
}

impl Default for LmSports {
    fn default() -> Self {
        Self::new()
    }
}

impl LmSports {
    pub fn new() -> Self {
        Self::with_base_url(LMSPORTS_URL.clone())
    }

    pub fn with_base_url(base: Url) -> Self {
        Self { base }
    }

    fn master_url(&self, year: i32) -> Result<Url, FetchError> {
        Ok(self.base.join(&format!("/results{:02}.htm", year % 100))?)
    }
}

impl RaceSource for LmSports {
    fn source_id(&self) -> SourceId {
        SourceId::LmSports
    }

    #[instrument(level = "info", skip_all, fields(source = "lmsports", %range))]
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        let mut walk = IndexWalk::default();

        for year in range.years() {
            let index_url = self.master_url(year)?;
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
                .filter(|(url, _)| RACE_FILE.is_match(url.path()))
                .filter_map(|(url, link)| {
                    let date = html::tail_text(link).and_then(|t| find_date(&t))?;
                    if !range.contains(date) {
                        return None;
                    }
                    let mut race =
                        CandidateRace::new(SourceId::LmSports, url.to_string()).with_date(date);
                    let name = html::text_of(link);
                    if !name.is_empty() {
                        race = race.with_name(name);
                    }
                    Some(race)
                })
                .unique_by(|c| c.url.clone())
                .collect();

            info!(count = found.len(), year, "Indexed L&M Sports races");
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

        let race_date = candidate
            .race_date
            .or_else(|| find_date(&listing))
            .ok_or(ParseError::MissingField("race date"))?;
        let race_name = html::title(&document)
            .filter(|t| !t.is_empty())
            .or_else(|| candidate.race_name.clone())
            .ok_or(ParseError::MissingField("race name"))?;

        debug!(rows = rows.len(), "Parsed L&M Sports race");
        Ok(finisher_records(candidate, &race_name, race_date, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;
    use chrono::NaiveDate;
    use std::time::Duration;

    const MASTER: &str = r#"<html><body>
        <a href="trail13.htm">Ocean City Trail Run</a> - Saturday, November 2, 2013 - Somers Point, NJ
          - ( <a href="trail12.htm">2012 results</a> )<br>
        <a href="turkey13.htm">Turkey Trot</a> - Thursday, November 28, 2013 - Ocean City, NJ<br>
        <a href="polar13.htm">Polar Bear 5K</a> - Sunday, December 8, 2013 - Brigantine, NJ<br>
        <a href="calendar.htm">Race calendar</a><br>
        </body></html>"#;

    const RACE: &str = "<html><head><title>Ocean City Trail Run</title></head><body><pre>\n\
        OCEAN CITY TRAIL RUN  NOVEMBER 2, 2013\n\
        Place Name                 Age  Time\n\
        ===== ==================== === =======\n\
            1 Rob Fehn              31   18:22\n\
            2 Kim Reilly            44   21:09\n\
              Sam Ortiz             52     DNF\n\
        </pre></body></html>";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn test_enumerate_from_master_page() {
        let fetcher = FakeFetcher::new().page("http://www.lmsports.com/results13.htm", MASTER);
        let session = Session::new(&fetcher, Duration::from_secs(1));
        let november = DateRange::new(d(2013, 11, 1), d(2013, 11, 30)).unwrap();

        let races = LmSports::new().enumerate_races(&session, &november).await.unwrap();
        let urls: Vec<&str> = races.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://www.lmsports.com/trail13.htm",
                "http://www.lmsports.com/turkey13.htm",
            ]
        );
        assert_eq!(races[0].race_date, Some(d(2013, 11, 2)));
        assert_eq!(races[1].race_name.as_deref(), Some("Turkey Trot"));
    }

    #[tokio::test]
    async fn test_missing_master_page_fails_enumeration() {
        let fetcher = FakeFetcher::new();
        let session = Session::new(&fetcher, Duration::from_secs(1));
        let range = DateRange::new(d(2013, 11, 1), d(2013, 11, 30)).unwrap();
        assert!(matches!(
            LmSports::new().enumerate_races(&session, &range).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_race_page() {
        let candidate = CandidateRace::new(SourceId::LmSports, "http://www.lmsports.com/trail13.htm")
            .with_date(d(2013, 11, 2));
        let records = LmSports::new().parse_race(&candidate, RACE).unwrap();
        let names: Vec<&str> = records.iter().map(|r| r.raw_name.as_str()).collect();
        assert_eq!(names, vec!["Rob Fehn", "Kim Reilly", "Sam Ortiz"]);
        assert_eq!(records[0].race_name, "Ocean City Trail Run");
        assert_eq!(records[1].time.unwrap().to_string(), "21:09");
        assert_eq!(records[2].place, None);
    }

    #[test]
    fn test_parse_reads_date_from_listing_when_unknown() {
        let candidate = CandidateRace::new(SourceId::LmSports, "file:///tmp/trail13.htm");
        let records = LmSports::new().parse_race(&candidate, RACE).unwrap();
        assert!(records.iter().all(|r| r.race_date == d(2013, 11, 2)));
    }

    #[test]
    fn test_parse_page_without_result_lines() {
        let candidate = CandidateRace::new(SourceId::LmSports, "http://www.lmsports.com/x13.htm")
            .with_date(d(2013, 11, 2));
        assert!(matches!(
            LmSports::new().parse_race(&candidate, "<title>Soon</title><pre>Results soon</pre>"),
            Err(ParseError::UnrecognizedMarkup(_))
        ));
    }
}
