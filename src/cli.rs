//! Command-line interface definitions for Sale Scout.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Paths and the config file can also be provided via environment variables.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

use crate::pipeline::InputFormat;

/// How input files are split into listing units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Guess from the file extension, then the content
    Auto,
    Html,
    Rss,
    Text,
}

impl Format {
    /// The explicit format, or `None` when it must be detected.
    pub fn explicit(self) -> Option<InputFormat> {
        match self {
            Format::Auto => None,
            Format::Html => Some(InputFormat::Html),
            Format::Rss => Some(InputFormat::Rss),
            Format::Text => Some(InputFormat::Text),
        }
    }
}

/// Command-line arguments for the Sale Scout application.
///
/// # Examples
///
/// ```sh
/// # Extract listings from a saved search page
/// sale_scout -i estatesales.html --base-url https://www.estatesales.net -o ./out
///
/// # Several Craigslist feeds, with regions, no geocoding
/// sale_scout -i flint.rss detroit.rss --regions --no-geocode
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Input files (HTML pages, RSS/Atom feeds or plain text)
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Input format
    #[arg(short, long, value_enum, default_value_t = Format::Auto)]
    pub format: Format,

    /// Source label stored on each record (defaults to the file name)
    #[arg(short, long)]
    pub source: Option<String>,

    /// Base URL used to resolve relative listing links in HTML input
    #[arg(long)]
    pub base_url: Option<Url>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "SALE_SCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output directory for the JSON files
    #[arg(short, long, env = "SALE_SCOUT_OUTPUT_DIR", default_value = "output")]
    pub output_dir: String,

    /// File name stem for the outputs (`<stem>.json`, `<stem>.jsonl`)
    #[arg(long, default_value = "listings")]
    pub stem: String,

    /// Keep at most this many records
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Resolve a canonical region for each record
    #[arg(long)]
    pub regions: bool,

    /// Skip geocoding even if enabled in the config
    #[arg(long)]
    pub no_geocode: bool,
}
