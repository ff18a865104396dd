//! # Sale Scout
//!
//! Extracts estate and garage sale listings from saved HTML pages, RSS/Atom
//! feeds and plain-text ads, and writes them as uniform JSON records.
//!
//! ## Usage
//!
//! ```sh
//! sale_scout -i estatesales.html flint.rss --regions -o ./out
//! ```
//!
//! ## Architecture
//!
//! 1. **Startup**: load config, gazetteer and geocode cache (any failure here
//!    aborts the run)
//! 2. **Extraction**: split each input into units and extract records; bad
//!    units and unreadable inputs are logged and skipped
//! 3. **Enrichment**: attach regions and coordinates, one record at a time
//! 4. **Output**: write `<stem>.json` and `<stem>.jsonl`

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use sale_scout::cli::Cli;
use sale_scout::config::ScoutConfig;
use sale_scout::extract::Extractor;
use sale_scout::geocode::{GeocodeCache, NominatimGeocoder};
use sale_scout::outputs::json;
use sale_scout::pipeline::{EnrichOptions, InputFormat, Pipeline};
use sale_scout::region::{Gazetteer, RegionResolver};
use sale_scout::utils::ensure_writable_dir;

/// Record label for an input file when `--source` is not given.
fn source_label(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("input")
        .to_string()
}

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("sale_scout starting up");

    let args = Cli::parse();
    debug!(?args.input, ?args.format, %args.output_dir, "Parsed CLI arguments");

    // Early check: ensure output dir is writable
    if let Err(e) = ensure_writable_dir(&args.output_dir).await {
        error!(
            path = %args.output_dir,
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Load config, gazetteer and geocode cache ----
    let config = ScoutConfig::load(args.config.as_deref())?;
    let gazetteer = Arc::new(Gazetteer::load(config.gazetteer.path.as_deref())?);
    let regions = RegionResolver::new(gazetteer, &config.gazetteer.default_region)?;
    info!(default_region = regions.default_region(), "Region resolver ready");

    let geocode = if config.geocode.enabled && !args.no_geocode {
        let geocoder = NominatimGeocoder::new(
            &config.geocode.endpoint,
            &config.geocode.user_agent,
            config.geocode.timeout(),
        )?;
        let cache = GeocodeCache::load(
            &config.geocode.cache_path,
            geocoder,
            config.geocode.min_interval(),
        )
        .await?
        .with_lookup_timeout(config.geocode.timeout());
        Some(cache)
    } else {
        info!("Geocoding disabled");
        None
    };

    let extractor = Extractor::new(config.title_max_chars, config.min_unit_chars);
    let pipeline = Pipeline::new(extractor, regions, geocode)
        .with_listing_selectors(config.listing_selectors);

    // ---- Extract every input ----
    let max_feed_entries = args.limit.unwrap_or(usize::MAX);
    let mut records = Vec::new();
    let mut skipped = 0;
    for path in &args.input {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read input; skipping");
                continue;
            }
        };
        let format = args
            .format
            .explicit()
            .unwrap_or_else(|| InputFormat::detect(path, &contents));
        let source = args.source.clone().unwrap_or_else(|| source_label(path));

        let batch = match format {
            InputFormat::Html => pipeline.process_html(&contents, &source, args.base_url.as_ref()),
            InputFormat::Rss => match pipeline.process_feed(&contents, &source, max_feed_entries) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to parse feed; skipping");
                    continue;
                }
            },
            InputFormat::Text => pipeline.process_text(&contents, &source),
        };

        info!(
            path = %path.display(),
            ?format,
            %source,
            extracted = batch.records.len(),
            skipped = batch.skipped,
            "Processed input"
        );
        skipped += batch.skipped;
        records.extend(batch.records);
    }
    info!(count = records.len(), skipped, "Total records extracted");

    // ---- Enrich ----
    let options = EnrichOptions {
        limit: args.limit,
        regions: args.regions,
    };
    let records = pipeline.enrich(records, options).await;

    // ---- Output ----
    let written = json::write_listings(&records, Path::new(&args.output_dir), &args.stem).await?;

    let elapsed = start_time.elapsed();
    info!(
        records = records.len(),
        skipped,
        json = %written.json.display(),
        jsonl = %written.jsonl.display(),
        elapsed_secs = elapsed.as_secs_f64(),
        "sale_scout finished"
    );

    Ok(())
}
