//! Data models for extracted sale listings.
//!
//! This module defines the structures that flow out of the pipeline:
//! - [`ListingRecord`]: the canonical record, one per extraction unit
//! - [`FieldKind`]: the four fields the extractor recovers
//! - [`Coordinates`]: a geocoded latitude/longitude pair
//!
//! Every field of a [`ListingRecord`] always carries either a real value or
//! its designated sentinel, so consumers never branch on missing keys.

use serde::{Deserialize, Serialize};

use crate::utils::truncate_with_ellipsis;

/// Sentinel for an unresolved location.
pub const LOCATION_NOT_SPECIFIED: &str = "Location not specified";
/// Sentinel for a listing without any date substring.
pub const DATE_NOT_SPECIFIED: &str = "Date not specified";
/// Sentinel for a listing without a numeric amount.
pub const PRICE_NOT_LISTED: &str = "Price not listed";
/// Generic label used when title cleanup leaves nothing behind.
pub const UNTITLED: &str = "Untitled Sale";

/// The fields recovered by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Title,
    Location,
    Date,
    Price,
}

impl FieldKind {
    /// The value reported when no probe or pattern produced anything.
    pub fn sentinel(self) -> &'static str {
        match self {
            FieldKind::Title => UNTITLED,
            FieldKind::Location => LOCATION_NOT_SPECIFIED,
            FieldKind::Date => DATE_NOT_SPECIFIED,
            FieldKind::Price => PRICE_NOT_LISTED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Title => "title",
            FieldKind::Location => "location",
            FieldKind::Date => "date",
            FieldKind::Price => "price",
        }
    }
}

/// A geocoded point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A sale listing with all four canonical fields resolved.
///
/// `latitude`/`longitude` are filled in only by the geocode cache and
/// `region` only by the region resolver; both serialize as `null` otherwise
/// so the key set is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,
    pub location: String,
    pub date: String,
    pub price: String,
    /// Which collector produced the record (e.g. `"EstateSales.net"`).
    pub source: String,
    /// Absolute URL of the listing, empty when none was found.
    pub link: String,
    pub region: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl ListingRecord {
    /// Applies the display/storage boundary: caps the title length.
    ///
    /// Called once when a record leaves the extractor, never before title
    /// cleanup.
    pub fn finish(mut self, title_max_chars: usize) -> Self {
        if self.title.trim().is_empty() {
            self.title = UNTITLED.to_string();
        }
        self.title = truncate_with_ellipsis(&self.title, title_max_chars);
        self
    }

    pub fn has_location(&self) -> bool {
        self.location != LOCATION_NOT_SPECIFIED && !self.location.trim().is_empty()
    }

    pub fn set_coordinates(&mut self, coords: Option<Coordinates>) {
        self.latitude = coords.map(|c| c.latitude);
        self.longitude = coords.map(|c| c.longitude);
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates { latitude, longitude }),
            _ => None,
        }
    }
}
