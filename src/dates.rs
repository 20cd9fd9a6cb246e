//! Turns the CLI's date selection into a [`DateRange`].
//!
//! A selection is a year plus either a month number or a CompuScore period
//! token, optionally narrowed to a day sub-range. An open (current) month
//! never extends past today.

use crate::error::DateError;
use crate::models::DateRange;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// CompuScore groups its archive into these buckets, indexed by month - 1.
const PERIOD_TOKENS: [&str; 12] = [
    "janfeb", "janfeb", "march", "april", "may", "june", "july", "aug", "sept", "october",
    "novdec", "novdec",
];

/// The period token CompuScore files `month` under.
pub fn period_token(month: u32) -> Option<&'static str> {
    PERIOD_TOKENS.get(month.checked_sub(1)? as usize).copied()
}

/// Months covered by a period token, e.g. `janfeb` → `(1, 2)`.
pub fn period_months(token: &str) -> Result<(u32, u32), DateError> {
    let token = token.trim().to_ascii_lowercase();
    let months: Vec<u32> = PERIOD_TOKENS
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == token)
        .map(|(i, _)| i as u32 + 1)
        .collect();
    match (months.first(), months.last()) {
        (Some(first), Some(last)) => Ok((*first, *last)),
        _ => Err(DateError::InvalidPeriod(token)),
    }
}

/// Parse `"5"` or `"5-12"` into an inclusive day pair.
pub fn parse_day_range(s: &str) -> Result<(u32, u32), DateError> {
    let invalid = || DateError::InvalidDayRange(s.to_string());
    let (a, b) = match s.split_once('-') {
        Some((a, b)) => (a, b),
        None => (s, s),
    };
    let a = a.trim().parse::<u32>().map_err(|_| invalid())?;
    let b = b.trim().parse::<u32>().map_err(|_| invalid())?;
    if a == 0 || a > b {
        return Err(invalid());
    }
    Ok((a, b))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)?.pred_opt()
}

/// Resolve a date selection.
///
/// `period` wins over `month` when both are given. `today` is passed in so
/// the open-month rule is deterministic.
pub fn resolve(
    year: i32,
    month: u32,
    day_range: Option<(u32, u32)>,
    period: Option<&str>,
    today: NaiveDate,
) -> Result<DateRange, DateError> {
    let (first_month, last_month) = match period {
        Some(token) => period_months(token)?,
        None => {
            if !(1..=12).contains(&month) {
                return Err(DateError::InvalidMonth(month));
            }
            (month, month)
        }
    };

    let window_start =
        NaiveDate::from_ymd_opt(year, first_month, 1).ok_or(DateError::InvalidMonth(first_month))?;
    let window_end =
        last_day_of_month(year, last_month).ok_or(DateError::InvalidMonth(last_month))?;

    let range = match day_range {
        Some((a, b)) => {
            let invalid = || DateError::InvalidDayRange(format!("{a}-{b}"));
            let start = window_start.with_day(a).ok_or_else(invalid)?;
            let stop = NaiveDate::from_ymd_opt(year, first_month, b).ok_or_else(invalid)?;
            DateRange::new(start, stop)?
        }
        None => {
            let stop = if window_start <= today && today < window_end {
                today
            } else {
                window_end
            };
            DateRange::new(window_start, stop)?
        }
    };

    debug!(%range, year, month, ?period, ?day_range, "Resolved date range");
    Ok(range)
}

const MONTH_PREFIXES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// `Dec 8, 2012`, `December 8, 2012`, `Sept. 8 2012`
static NAMED_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z]{3,9})\.?\s+(\d{1,2}),?\s+(\d{4})\b").expect("static regex")
});
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("static regex"));
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("static regex"));

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    let prefix = lower.get(..3)?;
    MONTH_PREFIXES
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// First calendar date written in free text, in any of the forms event
/// listings use.
pub fn find_date(text: &str) -> Option<NaiveDate> {
    let named = NAMED_DATE.captures_iter(text).find_map(|c| {
        NaiveDate::from_ymd_opt(c[3].parse().ok()?, month_from_name(&c[1])?, c[2].parse().ok()?)
    });
    named
        .or_else(|| {
            SLASH_DATE.captures_iter(text).find_map(|c| {
                NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)
            })
        })
        .or_else(|| {
            ISO_DATE.captures_iter(text).find_map(|c| {
                NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
            })
        })
}
