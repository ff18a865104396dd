//! Runtime configuration loaded from YAML.
//!
//! Every field has a default, so a missing file, an empty file, or a file
//! that sets only a few keys are all valid:
//!
//! ```yaml
//! title_max_chars: 80    # at least 4
//! min_unit_chars: 10
//! listing_selectors: []  # built-in container selectors when empty
//! gazetteer:
//!   path: null            # bundled gazetteer when null
//!   default_region: sfbay
//! geocode:
//!   enabled: true
//!   cache_path: data/geocode_cache.json
//!   endpoint: https://nominatim.openstreetmap.org/search
//!   user_agent: "SaleScout/0.1 (contact: admin@example.com)"
//!   min_interval_ms: 1100
//!   timeout_secs: 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::LoadError;
use crate::extract::{DEFAULT_MIN_UNIT_CHARS, DEFAULT_TITLE_MAX_CHARS};
use crate::utils::ELLIPSIS;
use crate::geocode::nominatim::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    pub title_max_chars: usize,
    pub min_unit_chars: usize,
    /// Container selectors tried in order on HTML input.
    pub listing_selectors: Vec<String>,
    pub gazetteer: GazetteerConfig,
    pub geocode: GeocodeConfig,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            title_max_chars: DEFAULT_TITLE_MAX_CHARS,
            min_unit_chars: DEFAULT_MIN_UNIT_CHARS,
            listing_selectors: Vec::new(),
            gazetteer: GazetteerConfig::default(),
            geocode: GeocodeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GazetteerConfig {
    /// External gazetteer file; the bundled one is used when unset.
    pub path: Option<PathBuf>,
    pub default_region: String,
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_region: "sfbay".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    pub enabled: bool,
    pub cache_path: PathBuf,
    pub endpoint: String,
    pub user_agent: String,
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_path: PathBuf::from("data/geocode_cache.json"),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_interval_ms: 1100,
            timeout_secs: 10,
        }
    }
}

impl GeocodeConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScoutConfig {
    /// Load from `path`, or return defaults when no path is given.
    ///
    /// # Errors
    ///
    /// [`LoadError::Io`] or [`LoadError::Yaml`] when an explicit file cannot
    /// be read or parsed.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, LoadError> {
        let Some(path) = path else {
            info!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&yaml, path)?;
        info!(?config, "Loaded config");
        Ok(config)
    }

    /// # Errors
    ///
    /// [`LoadError::Yaml`] on malformed YAML, [`LoadError::Config`] when
    /// `title_max_chars` cannot fit one character plus the ellipsis.
    pub fn from_yaml_str(yaml: &str, origin: &Path) -> Result<Self, LoadError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| LoadError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
        let min_title = ELLIPSIS.len() + 1;
        if config.title_max_chars < min_title {
            return Err(LoadError::Config {
                path: origin.to_path_buf(),
                reason: format!(
                    "title_max_chars must be at least {min_title}, got {}",
                    config.title_max_chars
                ),
            });
        }
        Ok(config)
    }
}
