//! Memoized, rate-limited, disk-backed address geocoding.
//!
//! [`GeocodeCache`] sits in front of a [`Geocoder`] and guarantees that each
//! distinct address reaches the external service at most once for the life
//! of the cache file. Failed lookups are remembered too, so a bad address is
//! never retried.
//!
//! # Persistence format
//!
//! One JSON object mapping the address string to a two-element array:
//!
//! ```json
//! {
//!   "Grand Blanc, MI": [42.9253, -83.63],
//!   "Nowhere, ZZ": [null, null]
//! }
//! ```
//!
//! The file is rewritten in full after every new entry, through a temp file
//! that is synced and renamed over the original.

pub mod nominatim;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{GeocodeError, LoadError};
use crate::models::{Coordinates, ListingRecord};

pub use nominatim::NominatimGeocoder;

pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1100);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// An external address lookup service.
///
/// `Ok(None)` means the service answered but knows no such place.
#[allow(async_fn_in_trait)]
pub trait Geocoder {
    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError>;
}

/// A memoized lookup outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredEntry", into = "StoredEntry")]
pub enum GeocodeEntry {
    Found(Coordinates),
    Failed,
}

impl GeocodeEntry {
    pub fn coordinates(self) -> Option<Coordinates> {
        match self {
            GeocodeEntry::Found(coords) => Some(coords),
            GeocodeEntry::Failed => None,
        }
    }
}

/// On-disk `[lat, lon]` pair; `[null, null]` marks a failed lookup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredEntry(Option<f64>, Option<f64>);

impl From<StoredEntry> for GeocodeEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry(Some(latitude), Some(longitude)) => {
                GeocodeEntry::Found(Coordinates { latitude, longitude })
            }
            _ => GeocodeEntry::Failed,
        }
    }
}

impl From<GeocodeEntry> for StoredEntry {
    fn from(entry: GeocodeEntry) -> Self {
        match entry {
            GeocodeEntry::Found(c) => StoredEntry(Some(c.latitude), Some(c.longitude)),
            GeocodeEntry::Failed => StoredEntry(None, None),
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    memo: BTreeMap<String, GeocodeEntry>,
    last_lookup: Option<Instant>,
}

/// Address to coordinate memo in front of a [`Geocoder`].
///
/// All state lives behind one async mutex that is held for the whole of
/// [`GeocodeCache::resolve`], so concurrent callers asking for the same new
/// address queue up behind a single external lookup.
#[derive(Debug)]
pub struct GeocodeCache<G> {
    path: PathBuf,
    geocoder: G,
    min_interval: Duration,
    lookup_timeout: Duration,
    state: Mutex<CacheState>,
}

impl<G: Geocoder> GeocodeCache<G> {
    /// Open the cache file at `path`, creating its parent directory.
    ///
    /// A missing file starts an empty cache.
    ///
    /// # Errors
    ///
    /// - [`LoadError::Io`] when the directory cannot be created or the file
    ///   exists but cannot be read
    /// - [`LoadError::Json`] when the file is not a valid cache table
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(
        path: impl AsRef<Path>,
        geocoder: G,
        min_interval: Duration,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| LoadError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let memo = match fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| LoadError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(LoadError::Io { path, source }),
        };
        info!(entries = memo.len(), "Loaded geocode cache");

        Ok(Self {
            path,
            geocoder,
            min_interval,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            state: Mutex::new(CacheState {
                memo,
                last_lookup: None,
            }),
        })
    }

    /// Upper bound on a single external lookup; expiry is a failed lookup.
    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn geocoder(&self) -> &G {
        &self.geocoder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The memoized outcome for `address`, without triggering a lookup.
    pub async fn cached(&self, address: &str) -> Option<GeocodeEntry> {
        self.state.lock().await.memo.get(address.trim()).copied()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.memo.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Coordinates for `address`, from the memo or one external lookup.
    ///
    /// Blank addresses resolve to `None` without touching the memo. Any lookup
    /// failure (error, no result, timeout) is memoized and reported as `None`.
    #[instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, address: &str) -> Option<Coordinates> {
        let key = address.trim();
        if key.is_empty() {
            return None;
        }

        let mut state = self.state.lock().await;
        if let Some(entry) = state.memo.get(key) {
            debug!(address = key, ?entry, "Geocode cache hit");
            return entry.coordinates();
        }

        if let Some(previous) = state.last_lookup {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        state.last_lookup = Some(Instant::now());

        let entry = match timeout(self.lookup_timeout, self.geocoder.lookup(key)).await {
            Ok(Ok(Some(coords))) => {
                info!(
                    address = key,
                    latitude = coords.latitude,
                    longitude = coords.longitude,
                    "Geocoded address"
                );
                GeocodeEntry::Found(coords)
            }
            Ok(Ok(None)) => {
                warn!(address = key, "Geocoder returned no match");
                GeocodeEntry::Failed
            }
            Ok(Err(e)) => {
                warn!(address = key, error = %e, "Geocode lookup failed");
                GeocodeEntry::Failed
            }
            Err(_) => {
                let e = GeocodeError::Timeout {
                    secs: self.lookup_timeout.as_secs(),
                };
                warn!(address = key, error = %e, "Geocode lookup failed");
                GeocodeEntry::Failed
            }
        };

        state.memo.insert(key.to_string(), entry);
        if let Err(e) = persist(&self.path, &state.memo).await {
            error!(path = %self.path.display(), error = %e, "Failed to persist geocode cache");
        }
        entry.coordinates()
    }

    /// Fill in a record's coordinates from its location.
    ///
    /// Records whose location is the "not specified" sentinel are left alone.
    pub async fn enrich(&self, record: &mut ListingRecord) {
        if !record.has_location() {
            return;
        }
        let coords = self.resolve(&record.location).await;
        record.set_coordinates(coords);
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Write the whole table to a sibling temp file, sync it and rename it into
/// place.
async fn persist(path: &Path, memo: &BTreeMap<String, GeocodeEntry>) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(memo).map_err(io::Error::other)?;
    let tmp = temp_path(path);
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(&json).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), entries = memo.len(), "Persisted geocode cache");
    Ok(())
}
