//! Report writers.
//!
//! # Submodules
//!
//! - [`html`]: one `div.race` per race, ready to paste into a newsletter
//! - [`json`]: the full [`RunReport`] for other tools

use crate::config::{OutputFormat, RunConfig};
use crate::models::RunReport;
use std::error::Error;

pub mod html;
pub mod json;

/// Write `report` to the configured output path in the configured format.
pub async fn write_report(report: &RunReport, config: &RunConfig) -> Result<(), Box<dyn Error>> {
    match config.format {
        OutputFormat::Html => html::write_report_html(report, &config.output).await,
        OutputFormat::Json => json::write_report_json(report, &config.output).await,
    }
}
