//! Maps free-text locations to canonical region identifiers.
//!
//! The gazetteer is a static, ordered list of regions, each with the city
//! names and postal codes it covers. Lookup never fails: anything the
//! gazetteer does not recognise lands in the configured default region.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::LoadError;

static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}\b").expect("valid regex"));

const BUNDLED_GAZETTEER: &str = include_str!("../data/gazetteer.yaml");

/// One region as declared in the gazetteer file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GazetteerEntry {
    pub region: String,
    #[serde(default)]
    pub cities: Vec<String>,
    #[serde(default)]
    pub zipcodes: Vec<String>,
}

/// A region with its match keys normalized for lookup.
#[derive(Debug, Clone)]
struct IndexedRegion {
    region: String,
    keys: HashSet<String>,
}

impl IndexedRegion {
    fn from_entry(entry: GazetteerEntry) -> Self {
        let keys = entry
            .cities
            .iter()
            .chain(entry.zipcodes.iter())
            .map(|key| normalize_key(key))
            .filter(|key| !key.is_empty())
            .collect();
        Self {
            region: entry.region.trim().to_string(),
            keys,
        }
    }
}

fn normalize_key(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Ordered region table. Declaration order breaks ties between regions that
/// share a city name.
#[derive(Debug, Clone)]
pub struct Gazetteer {
    regions: Vec<IndexedRegion>,
}

impl Gazetteer {
    /// The gazetteer compiled into the binary.
    pub fn bundled() -> Result<Self, LoadError> {
        Self::from_yaml_str(BUNDLED_GAZETTEER, Path::new("<bundled gazetteer>"))
    }

    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml, path)
    }

    /// Parse a YAML list of [`GazetteerEntry`]. `origin` only labels errors.
    pub fn from_yaml_str(yaml: &str, origin: &Path) -> Result<Self, LoadError> {
        let entries: Vec<GazetteerEntry> =
            serde_yaml::from_str(yaml).map_err(|source| LoadError::Yaml {
                path: origin.to_path_buf(),
                source,
            })?;
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<GazetteerEntry>) -> Result<Self, LoadError> {
        let regions: Vec<IndexedRegion> = entries
            .into_iter()
            .map(IndexedRegion::from_entry)
            .filter(|r| !r.region.is_empty())
            .collect();
        if regions.is_empty() {
            return Err(LoadError::EmptyGazetteer);
        }
        Ok(Self { regions })
    }

    /// Path-or-bundled convenience used at startup.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        let gazetteer = match path {
            Some(path) => Self::from_path(path)?,
            None => Self::bundled()?,
        };
        info!(regions = gazetteer.regions.len(), "Loaded gazetteer");
        Ok(gazetteer)
    }

    pub fn contains_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r.region == region)
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.region.as_str())
    }

    /// First region, in declaration order, listing `key` as a city or zipcode.
    fn lookup(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        if key.is_empty() {
            return None;
        }
        self.regions
            .iter()
            .find(|r| r.keys.contains(&key))
            .map(|r| r.region.as_str())
    }
}

/// Resolves locations against a shared [`Gazetteer`].
#[derive(Debug, Clone)]
pub struct RegionResolver {
    gazetteer: Arc<Gazetteer>,
    default_region: String,
}

impl RegionResolver {
    /// # Errors
    ///
    /// [`LoadError::UnknownDefaultRegion`] when `default_region` is not one of
    /// the gazetteer's regions.
    pub fn new(gazetteer: Arc<Gazetteer>, default_region: &str) -> Result<Self, LoadError> {
        let default_region = default_region.trim();
        if !gazetteer.contains_region(default_region) {
            return Err(LoadError::UnknownDefaultRegion {
                region: default_region.to_string(),
            });
        }
        Ok(Self {
            gazetteer,
            default_region: default_region.to_string(),
        })
    }

    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// Canonical region for `location`.
    ///
    /// Tries the whole string, then its leading comma segment, then every
    /// five-digit token. Falls back to the default region.
    pub fn resolve(&self, location: &str) -> &str {
        let whole = location.trim();
        let city = whole.split(',').next().unwrap_or_default();
        let candidates = std::iter::once(whole)
            .chain(std::iter::once(city))
            .chain(ZIP_RE.find_iter(whole).map(|m| m.as_str()));

        for candidate in candidates {
            if let Some(region) = self.gazetteer.lookup(candidate) {
                debug!(location, candidate, region, "Resolved region");
                return region;
            }
        }
        debug!(location, region = %self.default_region, "Region fell back to default");
        &self.default_region
    }
}
