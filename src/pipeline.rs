//! Document-to-record pipeline.
//!
//! A [`Pipeline`] wires the collectors, the [`Extractor`], the
//! [`RegionResolver`] and an optional [`GeocodeCache`] together:
//!
//! 1. **Collect**: split an HTML page, RSS/Atom feed or text blob into units
//! 2. **Extract**: run the field cascade over every unit
//! 3. **Enrich**: attach region and coordinates, one record at a time

use std::path::Path;

use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::{info, instrument};
use url::Url;

use crate::error::FeedError;
use crate::extract::{Batch, ExtractionUnit, Extractor};
use crate::geocode::{GeocodeCache, Geocoder, NominatimGeocoder};
use crate::models::ListingRecord;
use crate::region::RegionResolver;
use crate::scrapers::html::{DEFAULT_LISTING_SELECTORS, listing_units};
use crate::scrapers::rss::parse_feed;

static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n").expect("valid regex"));

/// How a raw document should be split into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Html,
    Rss,
    Text,
}

impl InputFormat {
    /// Guess the format from the file extension, then from the content.
    pub fn detect(path: &Path, contents: &str) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("xml" | "rss" | "atom") => return InputFormat::Rss,
            Some("html" | "htm") => return InputFormat::Html,
            Some("txt") => return InputFormat::Text,
            _ => {}
        }
        let head: String = contents.trim_start().chars().take(512).collect::<String>().to_ascii_lowercase();
        if head.starts_with("<?xml") || head.contains("<rss") || head.contains("<feed") {
            InputFormat::Rss
        } else if head.starts_with('<') {
            InputFormat::Html
        } else {
            InputFormat::Text
        }
    }
}

/// Per-run enrichment switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichOptions {
    /// Keep at most this many records.
    pub limit: Option<usize>,
    /// Attach a canonical region to each record.
    pub regions: bool,
}

pub struct Pipeline<G = NominatimGeocoder> {
    extractor: Extractor,
    regions: RegionResolver,
    geocode: Option<GeocodeCache<G>>,
    listing_selectors: Vec<String>,
}

impl<G: Geocoder> Pipeline<G> {
    pub fn new(extractor: Extractor, regions: RegionResolver, geocode: Option<GeocodeCache<G>>) -> Self {
        Self {
            extractor,
            regions,
            geocode,
            listing_selectors: DEFAULT_LISTING_SELECTORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Replace the container selectors tried on HTML pages.
    pub fn with_listing_selectors(mut self, selectors: Vec<String>) -> Self {
        if !selectors.is_empty() {
            self.listing_selectors = selectors;
        }
        self
    }

    pub fn geocode_cache(&self) -> Option<&GeocodeCache<G>> {
        self.geocode.as_ref()
    }

    /// Extract one record per listing container in an HTML page.
    #[instrument(level = "info", skip(self, html), fields(bytes = html.len()))]
    pub fn process_html(&self, html: &str, source: &str, base_url: Option<&Url>) -> Batch {
        let document = Html::parse_document(html);
        let units = listing_units(&document, &self.listing_selectors);
        info!(units = units.len(), "Collected listing containers");
        self.extractor
            .extract_batch(units.into_iter().map(ExtractionUnit::Markup), source, base_url)
    }

    /// Extract one record per feed item.
    ///
    /// # Errors
    ///
    /// [`FeedError`] when the document is not well-formed XML.
    #[instrument(level = "info", skip(self, xml), fields(bytes = xml.len()))]
    pub fn process_feed(&self, xml: &str, source: &str, max_entries: usize) -> Result<Batch, FeedError> {
        let entries = parse_feed(xml, max_entries)?;
        info!(entries = entries.len(), "Collected feed entries");
        Ok(self.extractor.extract_entries(&entries, source))
    }

    /// Extract one record per blank-line separated paragraph.
    #[instrument(level = "info", skip(self, text), fields(bytes = text.len()))]
    pub fn process_text(&self, text: &str, source: &str) -> Batch {
        let normalized = text.replace("\r\n", "\n");
        let units = PARAGRAPH_BREAK
            .split(&normalized)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ExtractionUnit::Text)
            .collect::<Vec<_>>();
        info!(units = units.len(), "Collected text paragraphs");
        self.extractor.extract_batch(units, source, None)
    }

    /// Attach region and coordinates to each record, in order.
    ///
    /// Records are handled one after another so the geocode rate limit
    /// applies across the whole run.
    #[instrument(level = "info", skip_all, fields(records = records.len()))]
    pub async fn enrich(&self, records: Vec<ListingRecord>, options: EnrichOptions) -> Vec<ListingRecord> {
        let limit = options.limit.unwrap_or(usize::MAX);
        let enriched: Vec<ListingRecord> = stream::iter(records.into_iter().take(limit))
            .then(|mut record| async move {
                if options.regions {
                    record.region = Some(self.regions.resolve(&record.location).to_string());
                }
                if let Some(cache) = &self.geocode {
                    cache.enrich(&mut record).await;
                }
                record
            })
            .collect()
            .await;

        let geocoded = enriched.iter().filter(|r| r.coordinates().is_some()).count();
        info!(count = enriched.len(), geocoded, "Enriched records");
        enriched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeocodeError;
    use crate::models::{Coordinates, LOCATION_NOT_SPECIFIED};
    use crate::region::Gazetteer;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct FixedGeocoder {
        calls: AtomicUsize,
    }

    impl Geocoder for FixedGeocoder {
        async fn lookup(&self, address: &str) -> Result<Option<Coordinates>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(address.contains("Grand Blanc").then_some(Coordinates {
                latitude: 42.9253,
                longitude: -83.63,
            }))
        }
    }

    fn resolver() -> RegionResolver {
        RegionResolver::new(Arc::new(Gazetteer::bundled().unwrap()), "sfbay").unwrap()
    }

    fn offline() -> Pipeline<FixedGeocoder> {
        Pipeline::new(Extractor::default(), resolver(), None)
    }

    const PAGE: &str = r#"<html><body>
      <div class="results">
        <div class="sale-item" data-id="1">
          <h3><a href="/sales/1">Downsizing Estate Sale</a></h3>
          <span class="sale-location">Grand Blanc, MI 48439</span>
          <time datetime="2025-07-13">Sunday</time>
        </div>
        <div class="sale-item" data-id="2">
          <h3><a href="/sales/2">Barn and Tool Sale</a></h3>
          <p>Everything must go. Prices from $2. Sat 07/19/2025</p>
        </div>
      </div>
    </body></html>"#;

    #[test]
    fn test_process_html() {
        let base = Url::parse("https://sales.example.com/search").unwrap();
        let batch = offline().process_html(PAGE, "example", Some(&base));
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 0);

        let first = &batch.records[0];
        assert_eq!(first.title, "Downsizing Estate Sale");
        assert_eq!(first.location, "Grand Blanc, MI 48439");
        assert_eq!(first.date, "2025-07-13");
        assert_eq!(first.link, "https://sales.example.com/sales/1");

        let second = &batch.records[1];
        assert_eq!(second.location, LOCATION_NOT_SPECIFIED);
        assert_eq!(second.price, "$2");
        assert_eq!(second.date, "2025-07-19");
    }

    #[test]
    fn test_process_text_splits_paragraphs() {
        let text = "Estate Sale (Grand Blanc, MI) - $5-500 - Jul 13, 2025\r\n\r\n  \n\
                    Moving sale, furniture $40, Fenton, MI\n\n\
                    hi\n";
        let batch = offline().process_text(text, "classifieds");
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.skipped, 0);
        assert_eq!(batch.records[0].date, "2025-07-13");
        assert_eq!(batch.records[1].price, "$40");
        assert_eq!(batch.records[2].title, "hi");
        assert_eq!(batch.records[2].location, LOCATION_NOT_SPECIFIED);
    }

    #[test]
    fn test_custom_listing_selectors() {
        let page = r#"<ul>
            <li class="ad">Porch sale Saturday in Fenton, MI</li>
            <li class="ad">Tools and bikes $15 (Davison)</li>
          </ul>
          <div class="sale-item"><h3>Ignored Estate Sale</h3></div>"#;

        let pipeline = offline().with_listing_selectors(vec!["li.ad".to_string()]);
        let batch = pipeline.process_html(page, "custom", None);
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.records[0].location, "Fenton, MI");
        assert_eq!(batch.records[1].price, "$15");

        // An empty list keeps the built-in selectors
        let batch = offline()
            .with_listing_selectors(Vec::new())
            .process_html(page, "custom", None);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].title, "Ignored Estate Sale");
    }

    #[test]
    fn test_process_feed() {
        let xml = r#"<rss version="2.0"><channel>
            <item>
              <title>Garage sale - tools, bikes $15 (Davison)</title>
              <link>https://flint.craigslist.org/gms/d/davison/1.html</link>
              <pubDate>Fri, 18 Jul 2025 08:15:00 -0400</pubDate>
            </item>
          </channel></rss>"#;
        let batch = offline().process_feed(xml, "Craigslist-flint", 10).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].date, "2025-07-18");
        assert_eq!(batch.records[0].location, "Davison");
    }

    #[test]
    fn test_process_feed_malformed() {
        assert!(offline().process_feed("<rss><item></rss>", "bad", 10).is_err());
    }

    #[tokio::test]
    async fn test_enrich_regions_geocode_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = GeocodeCache::load(
            dir.path().join("geocode_cache.json"),
            FixedGeocoder::default(),
            Duration::ZERO,
        )
        .await
        .unwrap();
        let pipeline = Pipeline::new(Extractor::default(), resolver(), Some(cache));

        let batch = pipeline.process_html(PAGE, "example", None);
        let mut records = batch.records.clone();
        records.extend(batch.records);

        let options = EnrichOptions {
            limit: Some(3),
            regions: true,
        };
        let enriched = pipeline.enrich(records, options).await;
        assert_eq!(enriched.len(), 3);
        assert_eq!(enriched[0].region.as_deref(), Some("flint"));
        assert_eq!(enriched[0].latitude, Some(42.9253));
        assert_eq!(enriched[1].region.as_deref(), Some("sfbay"));
        assert!(enriched[1].coordinates().is_none());
        assert_eq!(enriched[2].latitude, Some(42.9253));

        let calls = pipeline.geocode_cache().unwrap().geocoder().calls.load(Ordering::SeqCst);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_enrich_without_regions_leaves_region_empty() {
        let batch = offline().process_text("Yard sale in Flint, MI this Saturday", "t");
        let enriched = offline().enrich(batch.records, EnrichOptions::default()).await;
        assert_eq!(enriched.len(), 1);
        assert!(enriched[0].region.is_none());
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(InputFormat::detect(Path::new("feed.rss"), ""), InputFormat::Rss);
        assert_eq!(InputFormat::detect(Path::new("page.HTML"), ""), InputFormat::Html);
        assert_eq!(InputFormat::detect(Path::new("ads.txt"), "<rss>"), InputFormat::Text);
        assert_eq!(
            InputFormat::detect(Path::new("dump"), "  <?xml version=\"1.0\"?><rss/>"),
            InputFormat::Rss
        );
        assert_eq!(
            InputFormat::detect(Path::new("dump"), "<!DOCTYPE html><html></html>"),
            InputFormat::Html
        );
        assert_eq!(
            InputFormat::detect(Path::new("dump"), "Estate sale Saturday"),
            InputFormat::Text
        );
    }
}
