//! Loading the club roster.
//!
//! Rosters are CSV. With a header row, the last-name and first-name columns
//! are found by name (`LAST NAME`, `LAST`, `FIRST NAME`, `FIRST`, in any
//! order) and every other column is kept as member metadata. Older rosters
//! have no header and are simply `last,first[,...]`.

use crate::error::MembershipError;
use crate::markup::csv::parse_rows;
use crate::matcher::MembershipIndex;
use crate::models::MemberRecord;
use std::path::Path;
use tracing::{info, instrument, warn};

fn header_kind(cell: &str) -> Option<&'static str> {
    let key: String = cell
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect();
    match key.as_str() {
        "LASTNAME" | "LAST" | "SURNAME" => Some("last"),
        "FIRSTNAME" | "FIRST" | "GIVENNAME" => Some("first"),
        _ => None,
    }
}

/// Parse roster text into member records. Rows without both names are
/// skipped.
pub fn parse_membership(text: &str) -> Vec<MemberRecord> {
    let mut rows = parse_rows(text).into_iter();
    let Some(first_row) = rows.next() else {
        return Vec::new();
    };

    let last_col = first_row.iter().position(|c| header_kind(c) == Some("last"));
    let first_col = first_row.iter().position(|c| header_kind(c) == Some("first"));

    let (last_col, first_col, header, data): (usize, usize, Option<Vec<String>>, Vec<Vec<String>>) =
        match (last_col, first_col) {
            (Some(l), Some(f)) => (l, f, Some(first_row), rows.collect()),
            _ => (0, 1, None, std::iter::once(first_row).chain(rows).collect()),
        };

    let mut members = Vec::new();
    for (line, row) in data.into_iter().enumerate() {
        let cell = |i: usize| row.get(i).map(|c| c.trim()).unwrap_or("");
        let (last, first) = (cell(last_col), cell(first_col));
        if last.is_empty() || first.is_empty() {
            warn!(line, "Skipping roster row without both names");
            continue;
        }

        let mut member = MemberRecord::new(last, first);
        if let Some(header) = &header {
            for (i, name) in header.iter().enumerate() {
                if i == last_col || i == first_col {
                    continue;
                }
                let value = cell(i);
                if !name.trim().is_empty() && !value.is_empty() {
                    member.extra.insert(name.trim().to_string(), value.to_string());
                }
            }
        }
        members.push(member);
    }
    members
}

/// Read a roster file and build the lookup index.
///
/// # Arguments
///
/// * `path` - Roster CSV, with or without a header row
///
/// # Returns
///
/// An index over every row that has both names. Rows missing either name are
/// logged and skipped.
///
/// # Errors
///
/// * [`MembershipError::Io`] if the file cannot be read
/// * [`MembershipError::Empty`] if no row has both names
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_membership(path: &Path) -> Result<MembershipIndex, MembershipError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| MembershipError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let members = parse_membership(&text);
    if members.is_empty() {
        return Err(MembershipError::Empty(path.display().to_string()));
    }
    info!(count = members.len(), "Loaded membership list");
    Ok(MembershipIndex::new(members))
}
