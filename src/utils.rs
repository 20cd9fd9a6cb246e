//! Small helpers for text cleanup, logging and output paths.

use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Collapse runs of whitespace (including newlines) into one space and trim.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(normalize_ws("  Ho Ho\n  Ho 5K "), "Ho Ho Ho 5K");
/// ```
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary) with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Make sure the directory that will hold `output` exists and is writable.
///
/// Called before any network I/O so a long run does not end with nowhere to
/// put the report.
///
/// # Arguments
///
/// * `output` - The report path; a bare file name means the current directory
///
/// # Errors
///
/// Returns an error if the directory cannot be created or a file cannot be
/// created in it.
#[instrument(level = "info", skip_all, fields(output = %output.display()))]
pub async fn ensure_writable_parent(output: &Path) -> Result<(), Box<dyn Error>> {
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => Path::new(".").to_path_buf(),
    };
    fs::create_dir_all(&dir).await?;

    let check_path = dir.join("..__write_check__");
    stdfs::File::create(&check_path)?;
    let _ = stdfs::remove_file(&check_path);
    info!(dir = %dir.display(), "Output directory is writable");
    Ok(())
}
