//! Merging matched results from every processed race into one [`ResultSet`].
//!
//! A member listed more than once for the same source and date (e.g. on an
//! overall page and a division page) keeps a single entry. The entry kept and
//! the final order depend only on the data, never on the order in which
//! concurrent fetches completed.

use crate::models::{MatchConfidence, MatchedResult, MemberKey, MemberRecord, ResultSet, SourceId};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

type DedupKey = (SourceId, NaiveDate, MemberKey);

/// Total preference order between two entries for the same member and race
/// day. `Less` means `a` is the better entry.
fn preference(a: &MatchedResult, b: &MatchedResult) -> Ordering {
    let completeness =
        |r: &MatchedResult| r.finisher.place.is_some() as u8 + r.finisher.time.is_some() as u8;
    completeness(b)
        .cmp(&completeness(a))
        .then_with(|| nulls_last(a.finisher.place, b.finisher.place))
        .then_with(|| nulls_last(a.finisher.time, b.finisher.time))
        .then_with(|| a.finisher.race_url.cmp(&b.finisher.race_url))
        .then_with(|| a.finisher.race_name.cmp(&b.finisher.race_name))
        .then_with(|| a.finisher.raw_name.cmp(&b.finisher.raw_name))
        .then_with(|| confidence_rank(a.confidence).cmp(&confidence_rank(b.confidence)))
        .then_with(|| member_fields(&a.member).cmp(&member_fields(&b.member)))
}

fn confidence_rank(confidence: MatchConfidence) -> u8 {
    match confidence {
        MatchConfidence::Exact => 0,
        MatchConfidence::Normalized => 1,
    }
}

fn member_fields(m: &MemberRecord) -> (&str, &str, &BTreeMap<String, String>) {
    (&m.last_name, &m.first_name, &m.extra)
}

fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Result-set order: race date, place (unplaced last), last name.
fn result_order(a: &MatchedResult, b: &MatchedResult) -> Ordering {
    a.finisher
        .race_date
        .cmp(&b.finisher.race_date)
        .then_with(|| nulls_last(a.finisher.place, b.finisher.place))
        .then_with(|| {
            a.member
                .last_name
                .to_lowercase()
                .cmp(&b.member.last_name.to_lowercase())
        })
}

/// Deduplicate and order matched results.
///
/// Idempotent: aggregating a result set's own contents yields the same set.
pub fn aggregate(results: Vec<MatchedResult>) -> ResultSet {
    let total = results.len();
    let mut best: HashMap<DedupKey, MatchedResult> = HashMap::new();

    for result in results {
        let key = (
            result.finisher.source_id,
            result.finisher.race_date,
            result.member_key(),
        );
        match best.get_mut(&key) {
            Some(kept) => {
                if preference(&result, kept) == Ordering::Less {
                    *kept = result;
                }
            }
            None => {
                best.insert(key, result);
            }
        }
    }

    let mut kept: Vec<MatchedResult> = best.into_values().collect();
    // Full tie-break so HashMap iteration order never reaches the output.
    kept.sort_by(|a, b| {
        result_order(a, b)
            .then_with(|| a.member_key().cmp(&b.member_key()))
            .then_with(|| a.finisher.source_id.cmp(&b.finisher.source_id))
    });

    debug!(total, kept = kept.len(), "Aggregated matched results");
    ResultSet::from_sorted(kept)
}
