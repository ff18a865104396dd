//! OpenStreetMap Nominatim client.
//!
//! Issues `GET {endpoint}?q=<address>&format=json&limit=1` with an
//! identifying `User-Agent`, as Nominatim's usage policy requires. The
//! service answers with a JSON array whose first element carries `lat`/`lon`
//! as decimal strings; an empty array means no match.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::Geocoder;
use crate::error::{GeocodeError, LoadError};
use crate::models::Coordinates;
use crate::utils::truncate_for_log;

pub const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_USER_AGENT: &str = "SaleScout/0.1 (contact: admin@example.com)";

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// A [`Geocoder`] backed by a Nominatim-compatible search endpoint.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl NominatimGeocoder {
    /// # Errors
    ///
    /// - [`LoadError::Endpoint`] when `endpoint` is not an absolute URL
    /// - [`LoadError::HttpClient`] when the TLS backend cannot be initialized
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self, LoadError> {
        let endpoint = Url::parse(endpoint).map_err(|source| LoadError::Endpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(LoadError::HttpClient)?;
        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    fn search_url(&self, address: &str) -> String {
        format!(
            "{}?q={}&format=json&limit=1",
            self.endpoint.as_str().trim_end_matches('?'),
            urlencoding::encode(address)
        )
    }

    fn classify(&self, e: reqwest::Error) -> GeocodeError {
        if e.is_timeout() {
            GeocodeError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            GeocodeError::Http(e)
        }
    }
}

/// First place of a Nominatim search response, if any.
fn parse_response(body: &str) -> Result<Option<Coordinates>, GeocodeError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed {
            reason: format!("{e} in {}", truncate_for_log(body, 120)),
        })?;
    let Some(place) = places.first() else {
        return Ok(None);
    };
    let latitude = place.lat.trim().parse::<f64>();
    let longitude = place.lon.trim().parse::<f64>();
    match (latitude, longitude) {
        (Ok(latitude), Ok(longitude)) => Ok(Some(Coordinates { latitude, longitude })),
        _ => Err(GeocodeError::Malformed {
            reason: format!("non-numeric coordinates {:?}/{:?}", place.lat, place.lon),
        }),
    }
}

impl Geocoder for NominatimGeocoder {
    #[instrument(level = "debug", skip(self))]
    async fn lookup(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
        let url = self.search_url(address);
        debug!(%url, "Querying geocoder");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeocodeError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|e| self.classify(e))?;
        parse_response(&body)
    }
}
