//! Splits a listing page into one markup element per sale.
//!
//! Listing sites rarely agree on markup, so a page is tried against an ordered
//! list of container selectors and the first one that matches anything wins.

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

/// Container selectors tried in order when none are configured.
pub const DEFAULT_LISTING_SELECTORS: &[&str] = &[
    "app-sale-row",
    "[data-sale-id]",
    r#"article[class*="sale"]"#,
    r#"div[class*="sale"]"#,
    r#"li[class*="sale"]"#,
    r#"[class*="listing"]"#,
    r#"[class*="event"]"#,
];

/// Elements matched by the first selector in `selectors` that finds any.
///
/// Selectors that fail to parse are logged and skipped. An empty result means
/// no selector matched.
pub fn listing_units<'a, S: AsRef<str>>(document: &'a Html, selectors: &[S]) -> Vec<ElementRef<'a>> {
    for css in selectors {
        let css = css.as_ref();
        let selector = match Selector::parse(css) {
            Ok(selector) => selector,
            Err(e) => {
                warn!(selector = css, error = ?e, "Skipping invalid listing selector");
                continue;
            }
        };
        let units: Vec<ElementRef<'a>> = document.select(&selector).collect();
        if !units.is_empty() {
            debug!(selector = css, count = units.len(), "Listing selector matched");
            return units;
        }
    }
    debug!("No listing selector matched");
    Vec::new()
}
