//! Matching finisher names against the club roster.
//!
//! Names are compared after normalization (case, whitespace, punctuation).
//! Exact lookups always run first; only when nothing matches exactly is a
//! relaxed pass tried that ignores middle initials and suffixes. Whenever more
//! than one distinct member fits, the finisher is reported as ambiguous
//! instead of picking one.

use crate::models::{FinisherRecord, MatchConfidence, MatchedResult, MemberKey, MemberRecord};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

const SUFFIXES: &[&str] = &["jr", "sr", "ii", "iii", "iv", "v"];

/// Lowercase, drop punctuation other than hyphens, collapse whitespace.
pub fn normalize_name(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized name without single-letter initials and generational suffixes.
/// Falls back to the plain normalized name if nothing would be left.
fn relax(s: &str) -> String {
    let normalized = normalize_name(s);
    let kept: Vec<&str> = normalized
        .split_whitespace()
        .filter(|t| t.chars().count() > 1 && !SUFFIXES.contains(t))
        .collect();
    if kept.is_empty() {
        normalized
    } else {
        kept.join(" ")
    }
}

/// Every `(last, first)` reading of a published name.
///
/// "Last, First" is unambiguous about order. Otherwise each split point is
/// tried both as "First… Last…" and "Last… First…".
fn readings(raw_name: &str, norm: fn(&str) -> String) -> Vec<MemberKey> {
    if let Some((last, first)) = raw_name.split_once(',') {
        let key = MemberKey {
            last: norm(last),
            first: norm(first),
        };
        return if key.last.is_empty() || key.first.is_empty() {
            Vec::new()
        } else {
            vec![key]
        };
    }

    let normalized = norm(raw_name);
    let tokens: Vec<&str> = normalized.split_whitespace().collect();
    let mut keys = Vec::new();
    for i in 1..tokens.len() {
        let (head, tail) = (tokens[..i].join(" "), tokens[i..].join(" "));
        keys.push(MemberKey {
            last: tail.clone(),
            first: head.clone(),
        });
        keys.push(MemberKey {
            last: head,
            first: tail,
        });
    }
    keys
}

/// Read-only roster lookup structure, shared by every concurrent match.
#[derive(Debug, Default)]
pub struct MembershipIndex {
    members: Vec<MemberRecord>,
    exact: HashMap<MemberKey, Vec<usize>>,
    relaxed: HashMap<MemberKey, Vec<usize>>,
}

impl MembershipIndex {
    pub fn new(members: Vec<MemberRecord>) -> Self {
        let mut exact: HashMap<MemberKey, Vec<usize>> = HashMap::new();
        let mut relaxed: HashMap<MemberKey, Vec<usize>> = HashMap::new();
        for (i, m) in members.iter().enumerate() {
            exact.entry(m.key()).or_default().push(i);
            relaxed
                .entry(MemberKey {
                    last: relax(&m.last_name),
                    first: relax(&m.first_name),
                })
                .or_default()
                .push(i);
        }
        Self {
            members,
            exact,
            relaxed,
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    fn hits(&self, map: &HashMap<MemberKey, Vec<usize>>, keys: &[MemberKey]) -> BTreeSet<usize> {
        keys.iter()
            .filter_map(|k| map.get(k))
            .flatten()
            .copied()
            .collect()
    }

    /// Look a published name up. Exact readings are always tried before
    /// relaxed ones.
    pub fn lookup(&self, raw_name: &str) -> Lookup<'_> {
        let exact = self.hits(&self.exact, &readings(raw_name, normalize_name));
        let (hits, confidence) = if exact.is_empty() {
            (
                self.hits(&self.relaxed, &readings(raw_name, relax)),
                MatchConfidence::Normalized,
            )
        } else {
            (exact, MatchConfidence::Exact)
        };

        let found: Vec<&MemberRecord> = hits.iter().map(|i| &self.members[*i]).collect();
        match found.len() {
            0 => Lookup::NoMatch,
            1 => Lookup::Member(found[0], confidence),
            _ => Lookup::Ambiguous(found),
        }
    }
}

/// Raw result of [`MembershipIndex::lookup`].
#[derive(Debug, PartialEq, Eq)]
pub enum Lookup<'a> {
    Member(&'a MemberRecord, MatchConfidence),
    Ambiguous(Vec<&'a MemberRecord>),
    NoMatch,
}

/// A finisher that was not attributed to a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unmatched {
    pub finisher: FinisherRecord,
    /// Set when several members fit equally well.
    pub ambiguous: bool,
    pub candidates: Vec<MemberRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(MatchedResult),
    Unmatched(Unmatched),
}

/// Match one finisher against the roster.
pub fn match_finisher(finisher: FinisherRecord, index: &MembershipIndex) -> MatchOutcome {
    match index.lookup(&finisher.raw_name) {
        Lookup::Member(member, confidence) => {
            debug!(name = %finisher.raw_name, ?confidence, "Matched finisher to member");
            MatchOutcome::Matched(MatchedResult {
                member: member.clone(),
                finisher,
                confidence,
            })
        }
        Lookup::Ambiguous(members) => {
            debug!(name = %finisher.raw_name, candidates = members.len(), "Ambiguous finisher");
            MatchOutcome::Unmatched(Unmatched {
                finisher,
                ambiguous: true,
                candidates: members.into_iter().cloned().collect(),
            })
        }
        Lookup::NoMatch => MatchOutcome::Unmatched(Unmatched {
            finisher,
            ambiguous: false,
            candidates: Vec::new(),
        }),
    }
}

/// Build a member straight from a published name. Used for sources that
/// already filtered their results down to the club's team.
pub fn member_from_name(raw_name: &str) -> MemberRecord {
    let cleaned = crate::utils::normalize_ws(raw_name);
    if let Some((last, first)) = cleaned.split_once(',') {
        return MemberRecord::new(last.trim(), first.trim());
    }
    match cleaned.rsplit_once(' ') {
        Some((first, last)) => MemberRecord::new(last, first),
        None => MemberRecord::new(cleaned.as_str(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use chrono::NaiveDate;

    fn index(names: &[(&str, &str)]) -> MembershipIndex {
        MembershipIndex::new(
            names
                .iter()
                .map(|(l, f)| MemberRecord::new(*l, *f))
                .collect(),
        )
    }

    fn finisher(name: &str) -> FinisherRecord {
        FinisherRecord {
            raw_name: name.to_string(),
            place: Some(1),
            time: None,
            race_date: NaiveDate::from_ymd_opt(2013, 1, 6).unwrap(),
            source_id: SourceId::CoolRunning,
            race_name: "Race".into(),
            race_url: "http://x".into(),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  O'Brien,  "), "obrien");
        assert_eq!(normalize_name("Smith-Jones"), "smith-jones");
        assert_eq!(normalize_name("JANE   Q. DOE"), "jane q doe");
    }

    #[test]
    fn test_exact_in_both_orders() {
        let idx = index(&[("Doe", "Jane"), ("Fitzgerald", "Robert")]);
        for name in ["Jane Doe", "Doe, Jane", "  jane   DOE ", "DOE,JANE", "Doe Jane"] {
            match idx.lookup(name) {
                Lookup::Member(m, MatchConfidence::Exact) => assert_eq!(m.last_name, "Doe"),
                other => panic!("{name}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_multi_word_names() {
        let idx = index(&[("Van Dyke", "Mary Ann")]);
        assert!(matches!(
            idx.lookup("Mary Ann Van Dyke"),
            Lookup::Member(_, MatchConfidence::Exact)
        ));
    }

    #[test]
    fn test_relaxed_match_is_normalized() {
        let idx = index(&[("Doe", "Jane"), ("Smith", "Joe")]);
        assert!(matches!(
            idx.lookup("Jane Q. Doe"),
            Lookup::Member(_, MatchConfidence::Normalized)
        ));
        assert!(matches!(
            idx.lookup("Smith Jr., Joe"),
            Lookup::Member(_, MatchConfidence::Normalized)
        ));
    }

    #[test]
    fn test_exact_wins_over_relaxed() {
        // "Joe Q Smith" relaxes to "joe smith", but an exact member exists.
        let idx = index(&[("Smith", "Joe Q"), ("Smith", "Joe")]);
        match idx.lookup("Joe Q Smith") {
            Lookup::Member(m, MatchConfidence::Exact) => assert_eq!(m.first_name, "Joe Q"),
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_duplicate_members_are_ambiguous() {
        let idx = index(&[("Smith", "Joe"), ("SMITH", "joe")]);
        match match_finisher(finisher("Joe Smith"), &idx) {
            MatchOutcome::Unmatched(u) => {
                assert!(u.ambiguous);
                assert_eq!(u.candidates.len(), 2);
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_relaxed_ambiguity() {
        let idx = index(&[("Smith", "Joe A"), ("Smith", "Joe B")]);
        assert!(matches!(idx.lookup("Joe Smith"), Lookup::Ambiguous(_)));
    }

    #[test]
    fn test_reversible_name_hitting_two_members() {
        let idx = index(&[("Scott", "Lee"), ("Lee", "Scott")]);
        assert!(matches!(idx.lookup("Lee Scott"), Lookup::Ambiguous(_)));
        assert!(matches!(
            idx.lookup("Scott, Lee"),
            Lookup::Member(_, MatchConfidence::Exact)
        ));
    }

    #[test]
    fn test_unmatched() {
        let idx = index(&[("Doe", "Jane")]);
        match match_finisher(finisher("Gene Gugliotta"), &idx) {
            MatchOutcome::Unmatched(u) => assert!(!u.ambiguous),
            other => panic!("{other:?}"),
        }
        assert_eq!(idx.lookup("Doe"), Lookup::NoMatch);
        assert_eq!(idx.lookup(", Jane"), Lookup::NoMatch);
    }

    #[test]
    fn test_member_from_name() {
        let m = member_from_name("Petit, Ron");
        assert_eq!((m.last_name.as_str(), m.first_name.as_str()), ("Petit", "Ron"));
        let m = member_from_name("Mary Ann  Smith");
        assert_eq!((m.last_name.as_str(), m.first_name.as_str()), ("Smith", "Mary Ann"));
    }
}
