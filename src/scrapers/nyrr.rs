//! New York Road Runners race results.
//!
//! NYRR does not publish static result pages. The archive page carries a
//! year search form whose answer lists every race of that year, each followed
//! by its date (`MM/DD/YY`). A race link leads to a search page; POSTing its
//! form with a team code returns only that team's finishers.

use super::{IndexWalk, RaceSource, finisher_records};
use crate::dates::find_date;
use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::{ColumnLayout, NameColumns, html};
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static NYRR_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://web2.nyrrc.org").expect("static url"));

const ARCHIVE_PATH: &str = "/cgi-bin/start.cgi/aes-programs/results/resultsarchive.htm";
const RACE_PATH: &str = "/cgi-bin/start.cgi/aes-programs/results/startup.html";
const NO_MATCH: &str = "Your search returns no match.";

static YEAR_FORM: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"form[name="findOtherRaces"]"#).expect("static selector"));
static FORM: Lazy<Selector> = Lazy::new(|| Selector::parse("form").expect("static selector"));
static NAME_SPAN: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td:nth-child(3) span").expect("static selector"));

#[derive(Debug, Clone)]
pub struct Nyrr {
    base: Url,
    team: String,
}

impl Nyrr {
    pub fn new(team: impl Into<String>) -> Self {
        Self::with_base_url(NYRR_URL.clone(), team)
    }

    pub fn with_base_url(base: Url, team: impl Into<String>) -> Self {
        Self {
            base,
            team: team.into().trim().to_string(),
        }
    }

    fn team_search(&self) -> Vec<(String, String)> {
        [
            ("search.method", "search.team"),
            ("input.lname", ""),
            ("input.fname", ""),
            ("input.bib", ""),
            ("overalltype", "All"),
            ("input.agegroup.m", "12 to 19"),
            ("input.agegroup.f", "12 to 19"),
            ("teamgender", ""),
            ("team_code", self.team.as_str()),
            ("items.display", "500"),
            (
                "AESTIVACVNLIST",
                "overalltype,input.agegroup.m,input.agegroup.f,teamgender,team_code",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Race links of one year's search results, kept when inside `range`.
    fn races_in(&self, page: &str, page_url: &Url, range: &DateRange) -> Vec<CandidateRace> {
        let document = Html::parse_document(page);
        html::links(&document, page_url)
            .into_iter()
            .filter(|(url, _)| url.path().contains(RACE_PATH))
            .filter_map(|(url, link)| {
                let date = html::tail_text(link)
                    .and_then(|t| NaiveDate::parse_from_str(&t, "%m/%d/%y").ok());
                let name = html::text_of(link);
                match date {
                    Some(date) if range.contains(date) => Some(
                        CandidateRace::new(SourceId::Nyrr, url.to_string())
                            .with_date(date)
                            .with_name(name),
                    ),
                    Some(_) => {
                        debug!(race = %name, "Skipping NYRR race outside range");
                        None
                    }
                    None => {
                        warn!(race = %name, "NYRR race link without a date");
                        None
                    }
                }
            })
            .unique_by(|c| c.url.clone())
            .collect()
    }
}

/// Action URL of the first form matching `selector`, resolved against the
/// page it came from.
fn form_action(page: &str, page_url: &Url, selector: &Selector) -> Option<Url> {
    let document = Html::parse_document(page);
    let action = document
        .select(selector)
        .next()?
        .value()
        .attr("action")?
        .replace("&amp;", "&");
    page_url.join(action.trim()).ok()
}

impl RaceSource for Nyrr {
    fn source_id(&self) -> SourceId {
        SourceId::Nyrr
    }

    #[instrument(level = "info", skip_all, fields(source = "nyrr", team = %self.team, %range))]
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        let archive_url = self.base.join(ARCHIVE_PATH)?;
        let archive = session.get(&archive_url).await?;
        let Some(search_url) = form_action(&archive, &archive_url, &YEAR_FORM) else {
            warn!(url = %archive_url, "NYRR archive page has no year search form");
            return Err(FetchError::Malformed {
                url: archive_url.to_string(),
                content_type: "text/html without year search form".into(),
            });
        };

        let mut walk = IndexWalk::default();
        for year in range.years() {
            let form = vec![
                ("NYRRYEAR".to_string(), year.to_string()),
                ("AESTIVACVNLIST".to_string(), "NYRRYEAR".to_string()),
            ];
            match session.post_form(&search_url, form).await {
                Ok(page) => {
                    walk.page_ok();
                    let found = self.races_in(&page, &search_url, range);
                    info!(count = found.len(), year, "Indexed NYRR races");
                    walk.candidates.extend(found);
                }
                Err(e) => walk.page_failed(self.source_id(), &search_url, e),
            }
        }
        walk.finish()
    }

    /// Open the race's search page and run the team search on it.
    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    async fn fetch_race<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        candidate: &CandidateRace,
    ) -> Result<Vec<String>, FetchError> {
        let event_url = Url::parse(&candidate.url)?;
        let event_page = session.get(&event_url).await?;
        match form_action(&event_page, &event_url, &FORM) {
            Some(search_url) => Ok(vec![session.post_form(&search_url, self.team_search()).await?]),
            None => {
                warn!("NYRR race page has no search form");
                Ok(vec![event_page])
            }
        }
    }

    fn parse_race(
        &self,
        candidate: &CandidateRace,
        raw: &str,
    ) -> Result<Vec<FinisherRecord>, ParseError> {
        if raw.contains(NO_MATCH) {
            debug!(team = %self.team, "No NYRR finishers for team");
            return Ok(Vec::new());
        }
        let document = Html::parse_document(raw);
        let tables = html::tables(&document);
        if tables.len() < 4 {
            return Err(ParseError::UnrecognizedMarkup(format!(
                "expected a results table, found {} tables",
                tables.len()
            )));
        }
        let race_date = candidate
            .race_date
            .or_else(|| find_date(&html::body_text(&document)))
            .ok_or(ParseError::MissingField("race date"))?;

        let race_name = tables[1]
            .select(&NAME_SPAN)
            .map(html::text_of)
            .find(|t| !t.is_empty())
            .or_else(|| candidate.race_name.clone())
            .ok_or(ParseError::MissingField("race name"))?;

        let rows = html::table_rows(tables[3]);
        let (layout, data) = match rows.first().and_then(|h| ColumnLayout::from_header(h)) {
            Some(layout) => (layout, rows.get(1..).unwrap_or_default()),
            None => (
                ColumnLayout {
                    place: None,
                    name: NameColumns::Split { last: 0, first: 1 },
                    time: None,
                },
                &rows[..],
            ),
        };
        let fields = data.iter().filter_map(|r| layout.read(r)).collect();

        Ok(finisher_records(candidate, &race_name, race_date, fields))
    }

    fn team_filtered(&self) -> bool {
        true
    }
}
