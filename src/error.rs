//! Error types for the extraction pipeline.
//!
//! Only [`LoadError`] is fatal: it is raised while building the process-wide
//! state (config, gazetteer, geocode cache). Everything else is recovered at
//! the unit or lookup boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single extraction unit was skipped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("no title candidate found in unit")]
    NoTitle,
}

/// A failed external geocode lookup. Memoized as a failure, never surfaced
/// past the cache.
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("malformed geocoder response: {reason}")]
    Malformed { reason: String },

    #[error("geocoder did not answer within {secs}s")]
    Timeout { secs: u64 },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
}

/// Startup failures that must abort initialization.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid geocode cache {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid geocoder endpoint {endpoint}: {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("invalid config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("gazetteer has no region entries")]
    EmptyGazetteer,

    #[error("default region \"{region}\" is not declared in the gazetteer")]
    UnknownDefaultRegion { region: String },
}
