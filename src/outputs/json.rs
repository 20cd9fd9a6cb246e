//! JSON report output.
//!
//! The whole [`RunReport`] is serialized as one document: matched results in
//! aggregate order, then the ambiguous and skipped lists and the run counters.

use crate::models::RunReport;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write a [`RunReport`] as pretty-printed JSON to `path`.
///
/// # Arguments
///
/// * `report` - The finished run
/// * `path` - Destination file; its parent directory is created if missing
///
/// # Errors
///
/// Returns an error when serialization or any file-system step fails.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_report_json(report: &RunReport, path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(report)?;

    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    info!(results = report.results.len(), "Writing JSON");
    fs::write(path, json).await?;
    info!("Wrote JSON report");

    Ok(())
}
