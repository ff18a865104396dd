//! # Sale Scout
//!
//! Field extraction for loosely structured estate and garage sale listings.
//!
//! Listing sites, classified feeds and free-text ads all describe the same
//! four facts (what, where, when, how much) in wildly different shapes. This
//! crate recovers them as a uniform [`ListingRecord`](models::ListingRecord),
//! then optionally attaches a canonical region and geographic coordinates.
//!
//! ## Architecture
//!
//! 1. **Collecting**: [`scrapers`] split HTML pages and RSS/Atom feeds into
//!    extraction units
//! 2. **Extracting**: [`extract`] runs the ordered rule tables of [`patterns`]
//!    over each unit; dates go through [`dates`]
//! 3. **Enriching**: [`region`] maps locations to region ids, [`geocode`]
//!    looks up coordinates through a memoized, rate-limited, on-disk cache
//! 4. **Output**: [`outputs`] writes JSON and JSON Lines
//!
//! [`pipeline`] wires the stages together for the `sale_scout` binary.

pub mod cli;
pub mod config;
pub mod dates;
pub mod error;
pub mod extract;
pub mod geocode;
pub mod models;
pub mod outputs;
pub mod patterns;
pub mod pipeline;
pub mod region;
pub mod scrapers;
pub mod utils;

pub use error::{ExtractError, FeedError, GeocodeError, LoadError};
pub use extract::{ExtractionUnit, Extractor};
pub use geocode::{GeocodeCache, Geocoder, NominatimGeocoder};
pub use models::{Coordinates, FieldKind, ListingRecord};
pub use pipeline::Pipeline;
pub use region::{Gazetteer, RegionResolver};
