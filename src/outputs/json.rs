//! JSON output for extracted listings.
//!
//! Records are written twice: `<stem>.json` holds an indented array for
//! people, `<stem>.jsonl` one compact record per line for tools that stream.

use std::error::Error;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{error, info, instrument};

use crate::models::ListingRecord;

/// Paths written by [`write_listings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFiles {
    pub json: PathBuf,
    pub jsonl: PathBuf,
}

/// Write `listings` to `<output_dir>/<stem>.json` and `<output_dir>/<stem>.jsonl`.
///
/// Creates `output_dir` if needed. Existing files are replaced.
///
/// # Errors
///
/// Returns an error if directory creation, serialization or a write fails.
#[instrument(level = "info", skip(listings), fields(count = listings.len(), output_dir = %output_dir.display()))]
pub async fn write_listings(
    listings: &[ListingRecord],
    output_dir: &Path,
    stem: &str,
) -> Result<WrittenFiles, Box<dyn Error>> {
    if let Err(e) = fs::create_dir_all(output_dir).await {
        error!(output_dir = %output_dir.display(), error = %e, "Failed to create output dir");
        return Err(e.into());
    }

    let json_path = output_dir.join(format!("{stem}.json"));
    let pretty = serde_json::to_string_pretty(listings)?;
    fs::write(&json_path, pretty).await?;
    info!(path = %json_path.display(), "Wrote JSON listings");

    let jsonl_path = output_dir.join(format!("{stem}.jsonl"));
    let mut lines = String::new();
    for listing in listings {
        lines.push_str(&serde_json::to_string(listing)?);
        lines.push('\n');
    }
    fs::write(&jsonl_path, lines).await?;
    info!(path = %jsonl_path.display(), "Wrote JSON Lines listings");

    Ok(WrittenFiles {
        json: json_path,
        jsonl: jsonl_path,
    })
}
