//! Shape-level parsing shared by the site adapters.
//!
//! Race results reach us in three shapes:
//!
//! | Shape | Module | Used by |
//! |-------|--------|---------|
//! | HTML tables | [`html`] + [`ColumnLayout`] | CoolRunning (Cape Cod), NYRR |
//! | Preformatted text | [`text`] | CoolRunning, BestRace, CompuScore, Active.com |
//! | CSV downloads | [`csv`] + [`ColumnLayout`] | Active.com |
//!
//! Every shape yields [`RowFields`]; the adapters stamp race metadata on top
//! to make finisher records. Rows that cannot be read are skipped.

pub mod csv;
pub mod html;
pub mod text;

use crate::models::FinishTime;

/// The per-runner fields every shape can provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFields {
    pub raw_name: String,
    pub place: Option<u32>,
    pub time: Option<FinishTime>,
}

/// `"5"` or `"5."` → 5; anything else (DNF, blanks) → `None`.
pub fn parse_place(cell: &str) -> Option<u32> {
    let cell = cell.trim().trim_end_matches('.');
    if cell.is_empty() || !cell.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    cell.parse().ok().filter(|p| *p > 0)
}

pub fn parse_time(cell: &str) -> Option<FinishTime> {
    cell.trim().parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameColumns {
    Full(usize),
    Split { last: usize, first: usize },
}

/// Which columns of a table or CSV hold the fields we need, learned from its
/// header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub place: Option<usize>,
    pub name: NameColumns,
    pub time: Option<usize>,
}

const PLACE_HEADERS: &[&str] = &[
    "place",
    "overall place",
    "overall",
    "oa place",
    "plc",
    "pl",
    "pos",
    "position",
    "rank",
    "overall rank",
];

const TIME_HEADERS: &[&str] = &[
    "net time",
    "chip time",
    "time",
    "finish time",
    "official time",
    "gun time",
    "finish",
    "gun",
];

const FULL_NAME_HEADERS: &[&str] = &["name", "full name", "runner", "participant", "athlete"];

fn header_key(cell: &str) -> String {
    cell.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn find_first(headers: &[String], wanted: &[&str]) -> Option<usize> {
    wanted
        .iter()
        .find_map(|w| headers.iter().position(|h| h == w))
}

impl ColumnLayout {
    /// Read a header row. `None` when no name column can be identified.
    pub fn from_header(cells: &[String]) -> Option<Self> {
        let headers: Vec<String> = cells.iter().map(|c| header_key(c)).collect();

        let name = match find_first(&headers, FULL_NAME_HEADERS) {
            Some(i) => NameColumns::Full(i),
            None => {
                let last = headers.iter().position(|h| h.contains("last"));
                let first = headers.iter().position(|h| h.contains("first"));
                match (last, first) {
                    (Some(last), Some(first)) => NameColumns::Split { last, first },
                    _ => NameColumns::Full(headers.iter().position(|h| {
                        h.contains("name") && !h.contains("team") && !h.contains("club")
                    })?),
                }
            }
        };

        let place = find_first(&headers, PLACE_HEADERS)
            .or_else(|| headers.iter().position(|h| h.starts_with("overall")));
        let time = find_first(&headers, TIME_HEADERS).or_else(|| {
            headers
                .iter()
                .position(|h| h.contains("time") && !h.contains("pace"))
        });

        Some(Self { place, name, time })
    }

    /// Read one data row. `None` when the name cell is missing or empty.
    pub fn read(&self, row: &[String]) -> Option<RowFields> {
        let cell = |i: usize| row.get(i).map(|c| c.trim()).filter(|c| !c.is_empty());
        let raw_name = match self.name {
            NameColumns::Full(i) => cell(i)?.to_string(),
            NameColumns::Split { last, first } => match (cell(last), cell(first)) {
                (Some(l), Some(f)) => format!("{l}, {f}"),
                (Some(l), None) => l.to_string(),
                _ => return None,
            },
        };
        Some(RowFields {
            raw_name,
            place: self.place.and_then(cell).and_then(parse_place),
            time: self.time.and_then(cell).and_then(parse_time),
        })
    }
}
