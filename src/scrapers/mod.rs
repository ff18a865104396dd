//! Collectors that turn raw documents into extraction units.
//!
//! Collectors only find where listings are; they never interpret fields.
//!
//! | Input | Module | Unit |
//! |-------|--------|------|
//! | HTML listing page | [`html`] | one element per sale container |
//! | RSS / Atom feed | [`rss`] | one [`rss::FeedEntry`] per item |
//!
//! Plain-text input needs no collector: each non-blank paragraph is a unit.

pub mod html;
pub mod rss;
