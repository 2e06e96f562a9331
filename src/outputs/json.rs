//! JSON run report.
//!
//! Each run can leave a machine-readable record of what it found: counters
//! for every stage plus the accepted results (article bodies omitted).
//!
//! Files are organized by date with edition names:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```
//! A later run in the same edition overwrites the earlier report.

use serde::Serialize;
use std::error::Error;
use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::ResultItem;
use crate::pipeline::RunStats;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// The date of the run in `YYYY-MM-DD` format.
    pub local_date: String,
    /// "morning", "afternoon", or "evening".
    pub time_of_day: String,
    pub local_time: String,
    pub stats: &'a RunStats,
    pub results: &'a [ResultItem],
}

/// Write `report` to `{json_output_dir}/{date}/{time_of_day}.json`.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_report(
    report: &RunReport<'_>,
    json_output_dir: &str,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(report)?;

    let full_json_dir = format!("{}/{}", json_output_dir.trim_end_matches('/'), report.local_date);
    info!(%full_json_dir, "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(%full_json_dir, error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let output_json_filename = format!("{}/{}.json", full_json_dir, report.time_of_day);
    fs::write(&output_json_filename, json).await?;
    info!(path = %output_json_filename, "Wrote JSON run report");

    Ok(output_json_filename)
}
