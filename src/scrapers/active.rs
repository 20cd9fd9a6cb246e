//! Active.com race results.
//!
//! Discovery is a location search: every `div.result-title` of the search
//! page is an event. An event page lists its sub-events (5K, half marathon,
//! ...) in a `nav`, the first entry being the event overview. A sub-event
//! page either embeds its results raw in a `pre[id]`, or offers them through
//! a table search form whose action serves the whole table as CSV.

use super::{IndexWalk, RaceSource, finisher_records};
use crate::dates::find_date;
use crate::error::{FetchError, ParseError};
use crate::fetch::{Fetch, Session};
use crate::markup::csv::{looks_like_csv, parse_rows};
use crate::markup::{ColumnLayout, NameColumns, RowFields, html, text};
use crate::models::{CandidateRace, DateRange, FinisherRecord, SourceId};
use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

static ACTIVE_URL: Lazy<Url> =
    Lazy::new(|| Url::parse("http://results.active.com").expect("static url"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static RESULT_TITLE: Lazy<Selector> = Lazy::new(|| sel("div.result-title"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static NAV_LINK: Lazy<Selector> = Lazy::new(|| sel("nav a[href]"));
static TABLE_SEARCH: Lazy<Selector> = Lazy::new(|| sel("form#table_search"));
static RAW_RESULTS: Lazy<Selector> = Lazy::new(|| sel("pre[id]"));

const CSV_SUFFIX: &str = ".csv?per_page=100000";

#[derive(Debug, Clone)]
pub struct Active {
    base: Url,
    location: String,
    radius: u32,
}

/// An event found on the search page.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Event {
    url: Url,
    name: String,
    listing_text: String,
}

impl Active {
    pub fn new(location: impl Into<String>, radius: u32) -> Self {
        Self::with_base_url(ACTIVE_URL.clone(), location, radius)
    }

    pub fn with_base_url(base: Url, location: impl Into<String>, radius: u32) -> Self {
        Self {
            base,
            location: location.into(),
            radius,
        }
    }

    pub fn search_url(&self, range: &DateRange) -> Result<Url, url::ParseError> {
        let mut url = self.base.join("/search")?;
        url.query_pairs_mut()
            .append_pair("utf8", "✓")
            .append_pair("search[query]", "")
            .append_pair("search[source]", "event")
            .append_pair("search[location]", &self.location)
            .append_pair("search[radius]", &self.radius.to_string())
            .append_pair("search[start_date]", &range.start().format("%Y-%m-%d").to_string())
            .append_pair("search[end_date]", &range.stop().format("%Y-%m-%d").to_string());
        Ok(url)
    }
}

fn events_in(page: &str, page_url: &Url) -> Vec<Event> {
    let document = Html::parse_document(page);
    document
        .select(&RESULT_TITLE)
        .filter_map(|title| {
            let anchor = title.select(&ANCHOR).next()?;
            let url = page_url.join(anchor.value().attr("href")?.trim()).ok()?;
            // The date sits beside the title, inside the same result block.
            let listing_text = title
                .parent()
                .and_then(ElementRef::wrap)
                .map(html::text_of)
                .unwrap_or_else(|| html::text_of(title));
            Some(Event {
                url,
                name: html::text_of(anchor),
                listing_text,
            })
        })
        .unique_by(|e| e.url.clone())
        .collect()
}

/// Sub-event candidates of one event page.
fn sub_events(event: &Event, page: &str, range: &DateRange) -> Vec<CandidateRace> {
    let document = Html::parse_document(page);
    let date = find_date(&event.listing_text)
        .or_else(|| find_date(&html::body_text(&document)));
    if let Some(date) = date {
        if !range.contains(date) {
            debug!(event = %event.name, %date, "Skipping Active.com event outside range");
            return Vec::new();
        }
    }

    let nav: Vec<(Url, String)> = document
        .select(&NAV_LINK)
        .filter_map(|a| {
            let url = event.url.join(a.value().attr("href")?.trim()).ok()?;
            Some((url, html::text_of(a)))
        })
        .collect();

    let races: Vec<(Url, String)> = if nav.len() > 1 {
        nav.into_iter()
            .skip(1)
            .map(|(url, sub)| (url, format!("{} - {}", event.name, sub)))
            .collect()
    } else {
        vec![(event.url.clone(), event.name.clone())]
    };

    races
        .into_iter()
        .unique_by(|(url, _)| url.clone())
        .map(|(url, name)| {
            let race = CandidateRace::new(SourceId::Active, url.to_string()).with_name(name);
            match date {
                Some(date) => race.with_date(date),
                None => race,
            }
        })
        .collect()
}

fn csv_rows(raw: &str) -> Vec<RowFields> {
    let rows = parse_rows(raw);
    let Some(header) = rows.first() else {
        return Vec::new();
    };
    let (layout, data) = match ColumnLayout::from_header(header) {
        Some(layout) => (layout, &rows[1..]),
        None => (
            ColumnLayout {
                place: None,
                name: NameColumns::Full(2),
                time: None,
            },
            &rows[..],
        ),
    };
    data.iter().filter_map(|r| layout.read(r)).collect()
}

impl RaceSource for Active {
    fn source_id(&self) -> SourceId {
        SourceId::Active
    }

    #[instrument(level = "info", skip_all, fields(source = "active", location = %self.location, radius = self.radius, %range))]
    async fn enumerate_races<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        range: &DateRange,
    ) -> Result<Vec<CandidateRace>, FetchError> {
        let search_url = self.search_url(range)?;
        let search_page = session.get(&search_url).await?;
        let events = events_in(&search_page, &search_url);
        info!(count = events.len(), "Found Active.com events");

        let mut walk = IndexWalk::default();
        walk.page_ok();
        for event in events {
            match session.get(&event.url).await {
                Ok(page) => {
                    let found = sub_events(&event, &page, range);
                    debug!(event = %event.name, count = found.len(), "Indexed Active.com sub-events");
                    walk.candidates.extend(found);
                }
                Err(e) => walk.page_failed(self.source_id(), &event.url, e),
            }
        }

        walk.finish()
    }

    /// The sub-event page, or its CSV download when it offers one.
    #[instrument(level = "info", skip_all, fields(url = %candidate.url))]
    async fn fetch_race<F: Fetch>(
        &self,
        session: &Session<'_, F>,
        candidate: &CandidateRace,
    ) -> Result<Vec<String>, FetchError> {
        let page_url = Url::parse(&candidate.url)?;
        let page = session.get(&page_url).await?;

        let action = {
            let document = Html::parse_document(&page);
            document
                .select(&TABLE_SEARCH)
                .next()
                .and_then(|form| form.value().attr("action"))
                .map(|a| a.trim().to_string())
        };
        match action {
            Some(action) => {
                let csv_url = page_url.join(&format!("{action}{CSV_SUFFIX}"))?;
                debug!(%csv_url, "Downloading Active.com CSV results");
                Ok(vec![session.get(&csv_url).await?])
            }
            None => Ok(vec![page]),
        }
    }

    fn parse_race(
        &self,
        candidate: &CandidateRace,
        raw: &str,
    ) -> Result<Vec<FinisherRecord>, ParseError> {
        if looks_like_csv(raw) {
            let race_date = candidate
                .race_date
                .ok_or(ParseError::MissingField("race date"))?;
            let race_name = candidate
                .race_name
                .clone()
                .ok_or(ParseError::MissingField("race name"))?;
            return Ok(finisher_records(candidate, &race_name, race_date, csv_rows(raw)));
        }

        let document = Html::parse_document(raw);
        let Some(listing) = document.select(&RAW_RESULTS).next() else {
            warn!(url = %candidate.url, "Active.com page without CSV form or raw results");
            return Err(ParseError::UnrecognizedMarkup(
                "no CSV form or raw results".into(),
            ));
        };
        let rows = text::parse_block(&listing.text().collect::<String>());

        let race_date = candidate
            .race_date
            .or_else(|| find_date(&html::body_text(&document)))
            .ok_or(ParseError::MissingField("race date"))?;
        let race_name = html::title(&document)
            .or_else(|| candidate.race_name.clone())
            .ok_or(ParseError::MissingField("race name"))?;

        Ok(finisher_records(candidate, &race_name, race_date, rows))
    }
}
