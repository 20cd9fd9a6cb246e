//! Race lists: results pages saved to disk.
//!
//! A race list is a text file naming one saved page per line. Blank lines and
//! `#` comments are ignored and relative paths are taken from the current
//! directory. Every page becomes a candidate race with a `file://` URL that
//! [`crate::fetch::LocalPages`] can read back.

use crate::error::RaceListError;
use crate::models::{CandidateRace, SourceId};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use url::Url;

/// Page paths named by race-list text, in order.
pub fn parse_race_list(text: &str) -> Vec<PathBuf> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect()
}

/// Read a race list and turn each page into a candidate race of `source_id`.
///
/// # Arguments
///
/// * `path` - The race-list file
/// * `source_id` - The site the saved pages came from
///
/// # Returns
///
/// One candidate per listed page. Candidates carry no date or name; the
/// adapter reads both from the page.
///
/// # Errors
///
/// * [`RaceListError::Io`] when the list itself cannot be read
/// * [`RaceListError::Empty`] when it names no pages
/// * [`RaceListError::BadPath`] when a page path cannot be made absolute
///
/// A listed page that is missing is not an error here; the run records it as
/// a skipped race.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %source_id))]
pub async fn load_race_list(
    path: &Path,
    source_id: SourceId,
) -> Result<Vec<CandidateRace>, RaceListError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| RaceListError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let pages = parse_race_list(&String::from_utf8_lossy(&bytes));
    if pages.is_empty() {
        return Err(RaceListError::Empty(path.display().to_string()));
    }

    let candidates = pages
        .iter()
        .map(|page| {
            let bad_path = || RaceListError::BadPath(page.display().to_string());
            let absolute = std::path::absolute(page).map_err(|_| bad_path())?;
            let url = Url::from_file_path(&absolute).map_err(|_| bad_path())?;
            Ok(CandidateRace::new(source_id, url.to_string()))
        })
        .collect::<Result<Vec<_>, RaceListError>>()?;
    info!(count = candidates.len(), "Loaded race list");
    Ok(candidates)
}
