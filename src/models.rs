//! Data models shared by the adapters, matcher, aggregator and report writers.
//!
//! - [`DateRange`]: inclusive calendar window for one run
//! - [`CandidateRace`]: a discovered race not yet fetched
//! - [`FinisherRecord`]: one runner's normalized result
//! - [`MemberRecord`]: one row of the club roster
//! - [`MatchedResult`] / [`ResultSet`]: matcher and aggregator output
//! - [`RunReport`]: everything a report writer needs

use crate::error::DateError;
use crate::matcher::normalize_name;
use chrono::{Datelike, NaiveDate};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

/// Inclusive calendar span. `start <= stop` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    start: NaiveDate,
    stop: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, stop: NaiveDate) -> Result<Self, DateError> {
        if start > stop {
            return Err(DateError::InvalidDayRange(format!("{start} > {stop}")));
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn stop(&self) -> NaiveDate {
        self.stop
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.stop
    }

    /// Calendar years touched by the range.
    pub fn years(&self) -> RangeInclusive<i32> {
        self.start.year()..=self.stop.year()
    }

    /// `(year, month)` pairs touched by the range, in order.
    pub fn months(&self) -> Vec<(i32, u32)> {
        let mut out = Vec::new();
        let (mut y, mut m) = (self.start.year(), self.start.month());
        while (y, m) <= (self.stop.year(), self.stop.month()) {
            out.push((y, m));
            if m == 12 {
                y += 1;
                m = 1;
            } else {
                m += 1;
            }
        }
        out
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.stop)
    }
}

/// The race-timing websites we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceId {
    CoolRunning,
    BestRace,
    CompuScore,
    Nyrr,
    Active,
    LmSports,
}

impl SourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceId::CoolRunning => "coolrunning",
            SourceId::BestRace => "bestrace",
            SourceId::CompuScore => "compuscore",
            SourceId::Nyrr => "nyrr",
            SourceId::Active => "active",
            SourceId::LmSports => "lmsports",
        }
    }

    /// Name used in provenance lines of the report.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceId::CoolRunning => "CoolRunning",
            SourceId::BestRace => "BestRace",
            SourceId::CompuScore => "CompuScore",
            SourceId::Nyrr => "New York Road Runners",
            SourceId::Active => "Active.com",
            SourceId::LmSports => "L&M Sports",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A race discovered by an adapter's enumeration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRace {
    pub source_id: SourceId,
    pub url: String,
    /// Known up front for sources that encode it in the index; otherwise
    /// read from the race page itself.
    pub race_date: Option<NaiveDate>,
    pub race_name: Option<String>,
    /// CoolRunning state the race was listed under.
    pub location_filter: Option<String>,
}

impl CandidateRace {
    pub fn new(source_id: SourceId, url: impl Into<String>) -> Self {
        Self {
            source_id,
            url: url.into(),
            race_date: None,
            race_name: None,
            location_filter: None,
        }
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.race_date = Some(date);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.race_name = Some(name.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location_filter = Some(location.into());
        self
    }
}

/// A finish time such as `16:40` or `1:02:03.4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FinishTime(pub Duration);

impl FromStr for FinishTime {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (clock, frac) = match s.split_once('.') {
            Some((c, f)) => (c, Some(f)),
            None => (s, None),
        };
        let parts = clock
            .split(':')
            .map(|p| {
                if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                    Err(())
                } else {
                    p.parse::<u64>().map_err(|_| ())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        let secs = match parts.as_slice() {
            [m, s] if *s < 60 => m.checked_mul(60).and_then(|v| v.checked_add(*s)),
            [h, m, s] if *m < 60 && *s < 60 => h
                .checked_mul(3600)
                .and_then(|v| v.checked_add(m * 60 + s)),
            _ => None,
        }
        .ok_or(())?;
        let millis = match frac {
            None => 0,
            Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => {
                let digits: String = f.chars().chain("000".chars()).take(3).collect();
                digits.parse::<u64>().map_err(|_| ())?
            }
            Some(_) => return Err(()),
        };
        Ok(FinishTime(
            Duration::from_secs(secs) + Duration::from_millis(millis),
        ))
    }
}

impl fmt::Display for FinishTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        if h > 0 {
            write!(f, "{h}:{m:02}:{s:02}")?;
        } else {
            write!(f, "{m}:{s:02}")?;
        }
        let millis = self.0.subsec_millis();
        if millis > 0 {
            write!(f, ".{}", format!("{millis:03}").trim_end_matches('0'))?;
        }
        Ok(())
    }
}

impl Serialize for FinishTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One runner's result as found on a race page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinisherRecord {
    /// Name as published: "First Last" or "Last, First".
    pub raw_name: String,
    pub place: Option<u32>,
    pub time: Option<FinishTime>,
    pub race_date: NaiveDate,
    pub source_id: SourceId,
    pub race_name: String,
    pub race_url: String,
}

/// Normalized `(last, first)` key of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MemberKey {
    pub last: String,
    pub first: String,
}

impl MemberKey {
    pub fn new(last: &str, first: &str) -> Self {
        Self {
            last: normalize_name(last),
            first: normalize_name(first),
        }
    }
}

/// One roster row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub last_name: String,
    pub first_name: String,
    /// Any other roster columns, by header name.
    pub extra: BTreeMap<String, String>,
}

impl MemberRecord {
    pub fn new(last_name: impl Into<String>, first_name: impl Into<String>) -> Self {
        Self {
            last_name: last_name.into(),
            first_name: first_name.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(&self.last_name, &self.first_name)
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }
}

/// Strength of a name-to-member correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchConfidence {
    /// Same name once case, whitespace and punctuation are normalized.
    Exact,
    /// Same name after dropping initials and suffixes.
    Normalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedResult {
    pub finisher: FinisherRecord,
    pub member: MemberRecord,
    pub confidence: MatchConfidence,
}

impl MatchedResult {
    pub fn member_key(&self) -> MemberKey {
        self.member.key()
    }
}

/// Aggregated, deduplicated and ordered matches. Only built by
/// [`crate::aggregate::aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultSet(Vec<MatchedResult>);

impl ResultSet {
    pub(crate) fn from_sorted(results: Vec<MatchedResult>) -> Self {
        Self(results)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MatchedResult> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<MatchedResult> {
        self.0
    }

    /// Results grouped per race, races in date order; within a race the
    /// result-set order (place, then last name) is kept.
    pub fn by_race(&self) -> Vec<RaceGroup<'_>> {
        let mut groups: BTreeMap<(NaiveDate, &str, &str), Vec<&MatchedResult>> = BTreeMap::new();
        for result in &self.0 {
            let f = &result.finisher;
            groups
                .entry((f.race_date, f.race_name.as_str(), f.race_url.as_str()))
                .or_default()
                .push(result);
        }
        groups
            .into_iter()
            .map(|((race_date, race_name, race_url), results)| RaceGroup {
                race_date,
                race_name,
                race_url,
                source_id: results[0].finisher.source_id,
                results,
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a MatchedResult;
    type IntoIter = std::slice::Iter<'a, MatchedResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// View of one race's matched results.
#[derive(Debug)]
pub struct RaceGroup<'a> {
    pub race_date: NaiveDate,
    pub race_name: &'a str,
    pub race_url: &'a str,
    pub source_id: SourceId,
    pub results: Vec<&'a MatchedResult>,
}

/// A finisher whose name fits more than one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousFinisher {
    pub finisher: FinisherRecord,
    pub candidates: Vec<MemberRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipKind {
    Discovery,
    Fetch,
    Parse,
}

/// A race (or index page) that contributed nothing because it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRace {
    pub url: String,
    pub race_name: Option<String>,
    pub kind: SkipKind,
    pub reason: String,
}

/// Outcome of one run, handed to the report writers.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source_id: SourceId,
    pub date_range: DateRange,
    pub results: ResultSet,
    pub ambiguous: Vec<AmbiguousFinisher>,
    pub skipped: Vec<SkippedRace>,
    pub races_attempted: usize,
    pub races_parsed: usize,
    pub timed_out: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_rejects_reversed_bounds() {
        assert!(DateRange::new(d(2013, 2, 1), d(2013, 1, 1)).is_err());
        assert!(DateRange::new(d(2013, 1, 1), d(2013, 1, 1)).is_ok());
    }

    #[test]
    fn test_date_range_months_cross_year() {
        let range = DateRange::new(d(2012, 11, 20), d(2013, 2, 3)).unwrap();
        assert_eq!(
            range.months(),
            vec![(2012, 11), (2012, 12), (2013, 1), (2013, 2)]
        );
        assert_eq!(range.years(), 2012..=2013);
        assert!(range.contains(d(2013, 2, 3)));
        assert!(!range.contains(d(2013, 2, 4)));
    }

    #[test]
    fn test_finish_time_parsing() {
        let t: FinishTime = "16:40".parse().unwrap();
        assert_eq!(t.0, Duration::from_secs(16 * 60 + 40));
        let t: FinishTime = "1:02:03".parse().unwrap();
        assert_eq!(t.0, Duration::from_secs(3723));
        let t: FinishTime = "19:05.4".parse().unwrap();
        assert_eq!(t.0, Duration::from_millis(1_145_400));
        assert!("5:73".parse::<FinishTime>().is_err());
        assert!("abc".parse::<FinishTime>().is_err());
        assert!("30-39".parse::<FinishTime>().is_err());
    }

    #[test]
    fn test_finish_time_rejects_oversized_fields() {
        assert!("999999999999999999:00".parse::<FinishTime>().is_err());
        assert!("99999999999999999:00:00".parse::<FinishTime>().is_err());
        assert!("123456789012345678901234:00".parse::<FinishTime>().is_err());
        assert_eq!(crate::markup::parse_time("999999999999999999:00"), None);
    }

    #[test]
    fn test_finish_time_display() {
        assert_eq!("16:40".parse::<FinishTime>().unwrap().to_string(), "16:40");
        assert_eq!(
            "1:02:03".parse::<FinishTime>().unwrap().to_string(),
            "1:02:03"
        );
        assert_eq!("19:05.4".parse::<FinishTime>().unwrap().to_string(), "19:05.4");
    }

    #[test]
    fn test_member_key_is_normalized() {
        let m = MemberRecord::new("  DOE ", "Jane");
        assert_eq!(m.key(), MemberKey::new("doe", "JANE"));
        assert_eq!(m.display_name(), "Jane DOE");
    }
}
