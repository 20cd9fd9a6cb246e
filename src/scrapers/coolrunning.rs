//! CoolRunning race results.
//!
//! # URL Pattern
//!
//! Each state has one index page per year, `/results/{yy}/{state}.shtml`,
//! linking race pages such as `/results/13/ma/Jan16_Coloni_set1.shtml`. The
//! month abbreviation and day in the file name are the race date. Large races
//! are split over `..._set1.shtml`, `..._set2.shtml`, linked from the first.
//!
//! # Markup variants
//!
//! The `<meta name="Author">` tag names the timing company. Cape Cod Road
//! Runners publish HTML tables; most others publish a `<pre>` block. A few
//! race series use markup we do not read at all.

use super::{IndexWalk, RaceSource, finisher_records};
use crate::dates::find_date;
use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::{ColumnLayout, NameColumns, RowFields, html, parse_time, text};
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static COOLRUNNING_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://www.coolrunning.com").expect("static url"));

static RACE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/results/(\d{2})/([a-z]{2})/([A-Za-z]{3})(\d{1,2})_[^/]*\.shtml$")
        .expect("static regex")
});

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const TABLE_AUTHORS: &[&str] = &["CapeCodRoadRunners"];

const UNSUPPORTED_AUTHORS: &[&str] = &[
    "colonial",
    "opportunity",
    "Harriers",
    "FFAST",
    "lungne",
    "northeastracers",
    "sri",
    "WCRCSCOTT",
];

const PRE_AUTHORS: &[&str] = &[
    "kick610",
    "JB Race",
    "gstate",
    "ab-mac",
    "FTO",
    "NSTC",
    "ndatrackxc",
    "wcrc",
    "Spitler",
];

#[derive(Debug, Clone)]
pub struct CoolRunning {
    base: Url,
    states: Vec<String>,
}

impl CoolRunning {
    pub fn new(states: Vec<String>) -> Self {
        Self::with_base_url(COOLRUNNING_URL.clone(), states)
    }

    pub fn with_base_url(base: Url, states: Vec<String>) -> Self {
        let states = states
            .into_iter()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { base, states }
    }

    fn index_url(&self, year: i32, state: &str) -> Result<Url, url::ParseError> {
        self.base
            .join(&format!("/results/{:02}/{state}.shtml", year % 100))
    }

    /// Race date encoded in a race page path, when the path belongs to the
    /// given year's index for `state`.
    fn race_date(path: &str, year: i32, state: &str) -> Option<NaiveDate> {
        let caps = RACE_FILE.captures(path)?;
        let yy: i32 = caps[1].parse().ok()?;
        if yy != year % 100 || &caps[2] != state {
            return None;
        }
        let month = MONTHS
            .iter()
            .position(|m| caps[3].eq_ignore_ascii_case(m))?;
        let day: u32 = caps[4].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month as u32 + 1, day)
    }
}

/// Remove the conditional comments Excel leaves in exported pages.
fn strip_excel_conditionals(raw: &str) -> String {
    raw.replace("<![if supportMisalignedColumns]>", "")
        .replace("<![endif]>", "")
}

/// Stem shared by every result set of a race: `Jan16_Coloni_set1.shtml`
/// → `Jan16_Coloni_set`.
fn set_stem(url: &Url) -> Option<String> {
    let file = url.path_segments()?.next_back()?;
    let stem = file.strip_suffix(".shtml")?;
    let base = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    (base.len() < stem.len()).then(|| base.to_string())
}

fn is_set_page(url: &Url, stem: &str) -> bool {
    url.path_segments()
        .and_then(|mut s| s.next_back())
        .and_then(|file| file.strip_suffix(".shtml"))
        .and_then(|s| s.strip_prefix(stem))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Pick the results table out of a table-layout page: the leaf table with
/// the most rows of three or more cells.
fn table_results(doc: &Html) -> Result<Vec<RowFields>, ParseError> {
    let rows = html::leaf_tables(doc)
        .into_iter()
        .map(html::table_rows)
        .map(|rows| rows.into_iter().filter(|r| r.len() >= 3).collect::<Vec<_>>())
        .max_by_key(|rows| rows.len())
        .filter(|rows| !rows.is_empty())
        .ok_or_else(|| ParseError::UnrecognizedMarkup("no results table".into()))?;

    let (layout, data) = match ColumnLayout::from_header(&rows[0]) {
        Some(layout) => (layout, &rows[1..]),
        None => (
            ColumnLayout {
                place: Some(0),
                name: NameColumns::Full(1),
                time: None,
            },
            &rows[..],
        ),
    };

    Ok(data
        .iter()
        .filter_map(|row| {
            let mut fields = layout.read(row)?;
            if layout.time.is_none() {
                fields.time = row.iter().skip(2).find_map(|c| parse_time(c));
            }
            Some(fields)
        })
        .collect())
}

fn pre_results(doc: &Html) -> Result<Vec<RowFields>, ParseError> {
    let blocks = html::pre_blocks(doc);
    if blocks.is_empty() {
        return Err(ParseError::UnrecognizedMarkup("no <pre> block".into()));
    }
    Ok(blocks.iter().flat_map(|b| text::parse_block(b)).collect())
}

impl RaceSource for CoolRunning {
    fn source_id(&self) -> SourceId {
        SourceId::CoolRunning
    }

    #[instrument(level = "info", skip_all, fields(source = "coolrunning", %range))]
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        let mut walk = IndexWalk::default();

        for year in range.years() {
            for state in &self.states {
                let index_url = self.index_url(year, state)?;
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
                    .filter_map(|(url, _)| {
                        let date = Self::race_date(url.path(), year, state)?;
                        range.contains(date).then(|| {
                            CandidateRace::new(SourceId::CoolRunning, url.to_string())
                                .with_date(date)
                                .with_location(state.as_str())
                        })
                    })
                    .unique_by(|c| c.url.clone())
                    .collect();

                info!(
                    count = found.len(),
                    %state,
                    year,
                    "Indexed CoolRunning races"
                );
                walk.candidates.extend(found);
            }
        }

        walk.finish()
    }

    /// The race page plus every further result set it links.
    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    async fn fetch_race<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        candidate: &CandidateRace,
    ) -> Result<Vec<String>, FetchError> {
        let main_url = Url::parse(&candidate.url)?;
        let main_page = session.get(&main_url).await?;

        let set_urls: Vec<Url> = match set_stem(&main_url) {
            Some(stem) => {
                let document = Html::parse_document(&main_page);
                html::links(&document, &main_url)
                    .into_iter()
                    .map(|(url, _)| url)
                    .filter(|url| *url != main_url && is_set_page(url, &stem))
                    .unique()
                    .collect()
            }
            None => Vec::new(),
        };

        let mut pages = vec![main_page];
        for url in set_urls {
            match session.get(&url).await {
                Ok(page) => {
                    debug!(%url, "Fetched CoolRunning result set");
                    pages.push(page);
                }
                Err(e) => warn!(%url, error = %e, "CoolRunning result set failed; skipping"),
            }
        }
        Ok(pages)
    }

    fn parse_race(
        &self,
        candidate: &CandidateRace,
        raw: &str,
    ) -> Result<Vec<FinisherRecord>, ParseError> {
        let document = Html::parse_document(&strip_excel_conditionals(raw));

        let author = html::meta_content(&document, "Author").unwrap_or_default();
        let rows = if TABLE_AUTHORS.contains(&author.as_str()) {
            table_results(&document)?
        } else if UNSUPPORTED_AUTHORS.contains(&author.as_str()) {
            return Err(ParseError::UnrecognizedMarkup(format!(
                "unsupported race series {author:?}"
            )));
        } else {
            if !PRE_AUTHORS.contains(&author.as_str()) {
                warn!(%author, url = %candidate.url, "Unknown CoolRunning variant; trying <pre> layout");
            }
            pre_results(&document)?
        };
        if rows.is_empty() {
            return Err(ParseError::UnrecognizedMarkup("no result rows".into()));
        }
        let race_date = candidate
            .race_date
            .or_else(|| find_date(&html::body_text(&document)))
            .ok_or(ParseError::MissingField("race date"))?;

        let race_name = html::first_text(&document, &H1)
            .or_else(|| html::title(&document))
            .or_else(|| candidate.race_name.clone())
            .unwrap_or_else(|| candidate.url.clone());

        debug!(rows = rows.len(), %author, "Parsed CoolRunning race");
        Ok(finisher_records(candidate, &race_name, race_date, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::FakeFetcher;
    use std::time::Duration;

    const STATE_INDEX: &str = r#"<html><body>
        <a href="/results/13/ma/Jan6_Hangov_set1.shtml">Hangover Classic</a>
        <a href="/results/13/ma/Jan6_Hangov_set1.shtml">Hangover Classic (again)</a>
        <a href="/results/13/ma/Jan20_Frosty_set1.shtml">Frosty 5K</a>
        <a href="/results/13/ma/Feb2_Groundh_set1.shtml">Groundhog</a>
        <a href="/results/13/nh/Jan7_Other_set1.shtml">Wrong state</a>
        <a href="/results/12/ma/Jan7_Stale_set1.shtml">Last year</a>
        <a href="/index.shtml">Home</a>
        </body></html>"#;

    const VANILLA: &str = r#"<html><head>
        <meta name="Author" content="kick610">
        <title>Hangover Classic 5K Results</title></head>
        <body><h1>Hangover Classic 5K</h1>
        <pre>
                  Hangover Classic 5K
  Place Name                 City          Age S  Time
  ===== ==================== ============= === = =======
      1 Brian Allen          Salem, MA      27 M   16:40
      2 Jane Q. Doe          Lynn, MA       41 F   17:02
      3 Joe Smith            Boston, MA     33 M     DNF
        </pre>
        <a href="./Jan6_Hangov_set2.shtml">Next set</a>
        <a href="./Jan6_Hangov_set1.shtml">This set</a>
        </body></html>"#;

    const CAPE_COD: &str = r#"<html><head>
        <meta name="Author" content="CapeCodRoadRunners"></head>
        <body><h1>Cape Cod Frosty 10K</h1>
        <table><tr><td><table>
          <tr><td>Place</td><td>Name</td><td>Age</td><td>Time</td></tr>
          <tr><td>1</td><td>Ron Petit</td><td>52</td><td>38:10</td></tr>
          <tr><td>2</td><td></td><td>30</td><td>39:00</td></tr>
          <tr><td>3</td><td>Mary Ann Van Dyke</td><td>44</td><td>41:12</td></tr>
        </table></td></tr></table></body></html>"#;

    fn candidate(url: &str) -> CandidateRace {
        CandidateRace::new(SourceId::CoolRunning, url)
            .with_date(NaiveDate::from_ymd_opt(2013, 1, 6).unwrap())
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2013, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2013, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_enumerate_filters_by_date_and_state() {
        let fetcher = FakeFetcher::new()
            .page("http://www.coolrunning.com/results/13/ma.shtml", STATE_INDEX);
        let session = Session::new(&fetcher, Duration::from_secs(1));
        let adapter = CoolRunning::new(vec!["MA".into()]);

        let races = adapter.enumerate_races(&session, &january()).await.unwrap();
        let urls: Vec<&str> = races.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "http://www.coolrunning.com/results/13/ma/Jan6_Hangov_set1.shtml",
                "http://www.coolrunning.com/results/13/ma/Jan20_Frosty_set1.shtml",
            ]
        );
        assert_eq!(races[1].race_date, NaiveDate::from_ymd_opt(2013, 1, 20));
        assert_eq!(races[0].location_filter.as_deref(), Some("ma"));
    }

    #[tokio::test]
    async fn test_enumerate_skips_failed_state() {
        let fetcher = FakeFetcher::new()
            .page("http://www.coolrunning.com/results/13/ma.shtml", STATE_INDEX);
        let session = Session::new(&fetcher, Duration::from_secs(1));
        let adapter = CoolRunning::new(vec!["ri".into(), "ma".into()]);

        let races = adapter.enumerate_races(&session, &january()).await.unwrap();
        assert_eq!(races.len(), 2);

        let adapter = CoolRunning::new(vec!["ri".into()]);
        assert!(matches!(
            adapter.enumerate_races(&session, &january()).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_race_follows_result_sets() {
        let main = "http://www.coolrunning.com/results/13/ma/Jan6_Hangov_set1.shtml";
        let fetcher = FakeFetcher::new()
            .page(main, VANILLA)
            .page(
                "http://www.coolrunning.com/results/13/ma/Jan6_Hangov_set2.shtml",
                "<pre>   4 Sam Jones   20:00</pre>",
            );
        let session = Session::new(&fetcher, Duration::from_secs(1));
        let pages = CoolRunning::new(vec!["ma".into()])
            .fetch_race(&session, &candidate(main))
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[1].contains("Sam Jones"));
        assert_eq!(fetcher.requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_parse_vanilla_pre() {
        let adapter = CoolRunning::new(vec!["ma".into()]);
        let records = adapter
            .parse_race(&candidate("http://x/Jan6_Hangov_set1.shtml"), VANILLA)
            .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].raw_name, "Brian Allen");
        assert_eq!(records[0].place, Some(1));
        assert_eq!(records[0].race_name, "Hangover Classic 5K");
        assert_eq!(records[1].raw_name, "Jane Q. Doe");
        assert_eq!(records[2].time, None);
        assert_eq!(records[2].place, Some(3));
    }

    #[test]
    fn test_parse_cape_cod_table() {
        let adapter = CoolRunning::new(vec!["ma".into()]);
        let records = adapter
            .parse_race(&candidate("http://x/Jan6_Frosty_set1.shtml"), CAPE_COD)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].raw_name, "Ron Petit");
        assert_eq!(records[0].time.unwrap().to_string(), "38:10");
        assert_eq!(records[1].raw_name, "Mary Ann Van Dyke");
        assert_eq!(records[1].place, Some(3));
        assert_eq!(records[1].race_name, "Cape Cod Frosty 10K");
    }

    #[test]
    fn test_parse_unsupported_series() {
        let page = r#"<html><head><meta content="colonial" name="Author"></head>
            <body><pre>  1 Brian Allen  16:40</pre></body></html>"#;
        let err = CoolRunning::new(vec![])
            .parse_race(&candidate("http://x"), page)
            .unwrap_err();
        assert!(matches!(err, ParseError::UnrecognizedMarkup(_)));
    }

    #[test]
    fn test_parse_unknown_author_falls_back_to_pre() {
        let page = "<html><head><meta name=\"Author\" content=\"newco\"></head>\
            <body><![if supportMisalignedColumns]><pre>  7 Jo Smith   Lynn  22:10</pre><![endif]></body></html>";
        let records = CoolRunning::new(vec![])
            .parse_race(&candidate("http://x"), page)
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].raw_name, "Jo Smith");
    }

    #[test]
    fn test_parse_page_without_result_rows() {
        let adapter = CoolRunning::new(vec!["ma".into()]);
        let pre = r#"<html><head><meta name="Author" content="kick610"></head>
            <body><pre>   Results will be posted Monday</pre></body></html>"#;
        assert!(matches!(
            adapter.parse_race(&candidate("http://x"), pre),
            Err(ParseError::UnrecognizedMarkup(_))
        ));

        let table = r#"<html><head><meta name="Author" content="CapeCodRoadRunners"></head>
            <body><table><tr><td>Place</td><td>Name</td><td>Time</td></tr>
            <tr><td>DNS</td><td></td><td></td></tr></table></body></html>"#;
        assert!(matches!(
            adapter.parse_race(&candidate("http://x"), table),
            Err(ParseError::UnrecognizedMarkup(_))
        ));
    }

    #[test]
    fn test_parse_saved_page_reads_date_from_body() {
        let saved = CandidateRace::new(SourceId::CoolRunning, "file:///saved/Jan6_Hangov_set1.shtml");
        let page = VANILLA.replace("Hangover Classic 5K\n", "Hangover Classic 5K  January 6, 2013\n");
        let records = CoolRunning::new(vec![]).parse_race(&saved, &page).unwrap();
        assert_eq!(records.len(), 3);
        assert!(
            records
                .iter()
                .all(|r| r.race_date == NaiveDate::from_ymd_opt(2013, 1, 6).unwrap())
        );

        assert_eq!(
            CoolRunning::new(vec![]).parse_race(&saved, VANILLA),
            Err(ParseError::MissingField("race date"))
        );
    }

    #[test]
    fn test_set_stem() {
        let url = Url::parse("http://www.coolrunning.com/results/13/ma/Jan6_Hangov_set12.shtml")
            .unwrap();
        let stem = set_stem(&url).unwrap();
        assert_eq!(stem, "Jan6_Hangov_set");
        let other =
            Url::parse("http://www.coolrunning.com/results/13/ma/Jan6_Hangov_set3.shtml").unwrap();
        assert!(is_set_page(&other, &stem));
        let page = Url::parse("http://www.coolrunning.com/results/13/ma/Jan6_Hangov.shtml").unwrap();
        assert_eq!(set_stem(&page), None);
    }
}
