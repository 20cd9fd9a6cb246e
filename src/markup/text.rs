//! Preformatted (fixed-width) result listings.
//!
//! A typical line:
//!
//! ```text
//!   60 Gene Gugliotta       North Plainfiel,NJ 53 M U   42:17
//! ```
//!
//! There is no reliable column header across timing companies, so a line is
//! read by shape: a leading integer is the place, the first clock-looking
//! token is the time, and the first run of at least two name words (not
//! interrupted by a column gap of two or more spaces) is the name.

use super::{RowFields, parse_place, parse_time};
use once_cell::sync::Lazy;
use regex::Regex;

static TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").expect("static regex"));
static CLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,2}(?::\d{2}){1,2}(?:\.\d+)?$").expect("static regex")
});

fn is_name_token(tok: &str) -> bool {
    tok.chars().any(char::is_alphabetic)
        && tok
            .chars()
            .all(|c| c.is_alphabetic() || matches!(c, '\'' | '.' | '-' | ','))
}

fn word_count(tok: &str) -> usize {
    tok.split(',').filter(|p| !p.is_empty()).count()
}

fn is_sex_code(tok: &str) -> bool {
    matches!(tok, "M" | "F" | "m" | "f")
}

/// Non-finisher markers that make a line a result row without place or time.
fn is_status_marker(tok: &str) -> bool {
    matches!(
        tok.trim_matches(|c: char| !c.is_alphanumeric()).to_ascii_uppercase().as_str(),
        "DNF" | "DNS" | "DQ" | "DSQ"
    )
}

/// The line with a leading or trailing status marker blanked out, or `None`
/// when it has neither.
fn without_status_marker(line: &str) -> Option<String> {
    let first = TOKEN.find(line)?;
    let last = TOKEN.find_iter(line).last()?;
    let marker = [first, last].into_iter().find(|m| is_status_marker(m.as_str()))?;
    let mut blanked = line.to_string();
    blanked.replace_range(marker.range(), &" ".repeat(marker.len()));
    Some(blanked)
}

fn name_run(line: &str) -> Option<String> {
    let mut run: Vec<&str> = Vec::new();
    let mut prev_end = 0usize;

    for m in TOKEN.find_iter(line) {
        let tok = m.as_str();
        let gap = m.start().saturating_sub(prev_end);
        prev_end = m.end();

        if is_name_token(tok) && (run.is_empty() || gap < 2) {
            run.push(tok);
            continue;
        }
        if let Some(name) = finish_run(&mut run) {
            return Some(name);
        }
        if is_name_token(tok) {
            run.push(tok);
        }
    }
    finish_run(&mut run)
}

fn finish_run(run: &mut Vec<&str>) -> Option<String> {
    if run.len() > 2 && run.last().is_some_and(|t| is_sex_code(t)) {
        run.pop();
    }
    let words: usize = run.iter().map(|t| word_count(t)).sum();
    let name = (words >= 2).then(|| run.join(" ").trim_end_matches(',').to_string());
    run.clear();
    name
}

/// Read one line of a listing. `None` for banners, headers and blank lines.
///
/// A line with neither place nor time is still a row when it is marked
/// DNF, DNS, DQ or DSQ at either end.
pub fn parse_line(line: &str) -> Option<RowFields> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let place = trimmed.split_whitespace().next().and_then(parse_place);
    let time = trimmed
        .split_whitespace()
        .find(|t| CLOCK.is_match(t))
        .and_then(parse_time);
    if place.is_none() && time.is_none() {
        let line = without_status_marker(line)?;
        return Some(RowFields {
            raw_name: name_run(&line)?,
            place: None,
            time: None,
        });
    }
    let raw_name = name_run(line)?;
    Some(RowFields {
        raw_name,
        place,
        time,
    })
}

/// Read every result line of a block, skipping what is not one.
pub fn parse_block(text: &str) -> Vec<RowFields> {
    text.lines().filter_map(parse_line).collect()
}
