//! Cascade engine that turns one listing unit into a [`ListingRecord`].
//!
//! Each field is resolved by a strictly ordered cascade over the
//! [`PatternLibrary`]:
//!
//! 1. **Structured probe**: CSS selectors scoped to a markup unit; the first
//!    probe yielding accepted text wins.
//! 2. **Pattern cascade**: regexes over the unit's flattened text; the first
//!    pattern *in list order* that matches wins, wherever it matches.
//! 3. **Sentinel**: the field's "not specified" value.
//!
//! Extraction is pure. A unit whose text is too short to parse keeps its
//! title but leaves the pattern-derived fields at their sentinels. A unit
//! with no title candidate at all is reported as skipped and the batch moves
//! on.

use itertools::Itertools;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates::{normalize_date, parse_date};
use crate::error::ExtractError;
use crate::models::{FieldKind, ListingRecord, UNTITLED};
use crate::patterns::{PatternLibrary, Probe};
use crate::scrapers::rss::FeedEntry;
use crate::utils::{collapse_whitespace, truncate_for_log};

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("valid selector"));

pub const DEFAULT_TITLE_MAX_CHARS: usize = 80;
pub const DEFAULT_MIN_UNIT_CHARS: usize = 10;

/// The raw input to extraction, supplied by a collector.
#[derive(Debug, Clone, Copy)]
pub enum ExtractionUnit<'a> {
    /// A free-text blob such as a feed title or a classified ad body.
    Text(&'a str),
    /// A markup element whose children can be probed by selector.
    Markup(ElementRef<'a>),
}

impl<'a> ExtractionUnit<'a> {
    /// Non-empty, trimmed text pieces in document order: lines for text,
    /// text nodes for markup.
    pub fn fragments(&self) -> Vec<&'a str> {
        match *self {
            ExtractionUnit::Text(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect(),
            ExtractionUnit::Markup(element) => element
                .text()
                .map(str::trim)
                .filter(|node| !node.is_empty())
                .collect(),
        }
    }

    /// The text the pattern cascade runs over. Fragments stay on separate
    /// lines so single-line patterns never straddle two elements.
    pub fn flattened(&self) -> String {
        self.fragments()
            .into_iter()
            .map(collapse_whitespace)
            .join("\n")
    }

    /// Text of the first element matched by `probe` that passes its length
    /// check. Text units have no structure to probe.
    fn probe(&self, probe: &Probe) -> Option<String> {
        let ExtractionUnit::Markup(element) = self else {
            return None;
        };
        element.select(&probe.selector).find_map(|hit| {
            let from_attr = probe
                .attr
                .and_then(|name| hit.value().attr(name))
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string);
            let value = from_attr.unwrap_or_else(|| {
                collapse_whitespace(
                    &hit.text()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .join(probe.joiner),
                )
            });
            (!value.is_empty() && value.chars().count() > probe.min_chars).then_some(value)
        })
    }

    /// Absolute URL of the unit's first link, resolved against `base`.
    fn link(&self, base: Option<&Url>) -> String {
        let ExtractionUnit::Markup(element) = self else {
            return String::new();
        };
        let own = (element.value().name() == "a")
            .then(|| element.value().attr("href"))
            .flatten();
        let href = own.or_else(|| {
            element
                .select(&LINK_SELECTOR)
                .find_map(|a| a.value().attr("href"))
        });
        href.and_then(|href| resolve_link(href.trim(), base))
            .unwrap_or_default()
    }
}

fn resolve_link(href: &str, base: Option<&Url>) -> Option<String> {
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    Some(url.to_string())
}

/// Where a field value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Probe(&'static str),
    Pattern(&'static str),
    /// The first text fragment, used as a title of last resort.
    LeadingText,
}

/// A resolved field value and the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub value: String,
    pub origin: Origin,
}

/// Records produced from a batch plus the number of units skipped.
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<ListingRecord>,
    pub skipped: usize,
}

/// Applies the pattern library to extraction units.
#[derive(Debug, Clone)]
pub struct Extractor {
    patterns: &'static PatternLibrary,
    title_max_chars: usize,
    min_unit_chars: usize,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE_MAX_CHARS, DEFAULT_MIN_UNIT_CHARS)
    }
}

impl Extractor {
    pub fn new(title_max_chars: usize, min_unit_chars: usize) -> Self {
        Self {
            patterns: PatternLibrary::shared(),
            title_max_chars,
            min_unit_chars,
        }
    }

    /// The best value for `kind`, or the field's sentinel.
    pub fn extract_field(&self, unit: &ExtractionUnit<'_>, kind: FieldKind) -> String {
        self.find_field(unit, kind)
            .map(|found| found.value)
            .unwrap_or_else(|| kind.sentinel().to_string())
    }

    /// Run the cascade for `kind`; `None` means the sentinel applies.
    pub fn find_field(&self, unit: &ExtractionUnit<'_>, kind: FieldKind) -> Option<FieldValue> {
        let found = match kind {
            FieldKind::Title => self.find_title(unit),
            FieldKind::Location => self.find_location(unit),
            FieldKind::Date => self.find_date(unit),
            FieldKind::Price => self.find_price(unit),
        };
        match &found {
            Some(field) => debug!(field = kind.as_str(), value = %field.value, origin = ?field.origin, "Resolved field"),
            None => debug!(field = kind.as_str(), "Field fell back to sentinel"),
        }
        found
    }

    fn find_title(&self, unit: &ExtractionUnit<'_>) -> Option<FieldValue> {
        let (raw, origin) = self
            .patterns
            .title
            .probes
            .iter()
            .find_map(|probe| unit.probe(probe).map(|v| (v, Origin::Probe(probe.css))))
            .or_else(|| {
                unit.fragments()
                    .first()
                    .map(|first| (collapse_whitespace(first), Origin::LeadingText))
            })?;
        let cleaned = self.patterns.title_cleanup.apply(&raw);
        let value = if cleaned.is_empty() {
            UNTITLED.to_string()
        } else {
            cleaned
        };
        Some(FieldValue { value, origin })
    }

    fn find_location(&self, unit: &ExtractionUnit<'_>) -> Option<FieldValue> {
        let rules = &self.patterns.location;
        if let Some(found) = rules.probes.iter().find_map(|probe| {
            unit.probe(probe).map(|value| FieldValue {
                value,
                origin: Origin::Probe(probe.css),
            })
        }) {
            return Some(found);
        }
        let text = self.pattern_text(unit)?;
        rules.first_capture(&text).map(|(rule, value)| FieldValue {
            value: value.to_string(),
            origin: Origin::Pattern(rule),
        })
    }

    fn find_date(&self, unit: &ExtractionUnit<'_>) -> Option<FieldValue> {
        let rules = &self.patterns.date;
        if let Some(found) = rules.probes.iter().find_map(|probe| {
            unit.probe(probe).map(|text| FieldValue {
                value: self.date_from_probe_text(&text),
                origin: Origin::Probe(probe.css),
            })
        }) {
            return Some(found);
        }
        let text = self.pattern_text(unit)?;
        rules.first_capture(&text).map(|(rule, token)| FieldValue {
            value: normalize_date(token),
            origin: Origin::Pattern(rule),
        })
    }

    /// A probed date element may hold more than a date ("Sat, Jul 13 9am").
    /// Prefer the whole text, then the first date-looking substring, then
    /// the text as-is.
    fn date_from_probe_text(&self, text: &str) -> String {
        if let Some(date) = parse_date(text) {
            return date.format("%Y-%m-%d").to_string();
        }
        match self.patterns.date.first_capture(text) {
            Some((_, token)) => normalize_date(token),
            None => text.to_string(),
        }
    }

    fn find_price(&self, unit: &ExtractionUnit<'_>) -> Option<FieldValue> {
        let rules = &self.patterns.price;
        let probed = rules.probes.iter().find_map(|probe| {
            let text = unit.probe(probe)?;
            let caps = self.patterns.amount.captures(&text)?;
            Some(FieldValue {
                value: format!("${}", &caps[1]),
                origin: Origin::Probe(probe.css),
            })
        });
        if probed.is_some() {
            return probed;
        }
        let text = self.pattern_text(unit)?;
        rules.first_capture(&text).map(|(rule, amount)| FieldValue {
            value: format!("${amount}"),
            origin: Origin::Pattern(rule),
        })
    }

    /// Flattened text for the pattern cascade, or `None` when the unit holds
    /// fewer than `min_unit_chars` characters.
    fn pattern_text(&self, unit: &ExtractionUnit<'_>) -> Option<String> {
        let text = unit.flattened();
        let chars = collapse_whitespace(&text).chars().count();
        if chars < self.min_unit_chars {
            debug!(chars, min = self.min_unit_chars, "Unit too short for pattern cascade");
            return None;
        }
        Some(text)
    }

    /// Build a full record from one unit.
    ///
    /// # Errors
    ///
    /// [`ExtractError::NoTitle`] when no title candidate exists at all.
    pub fn extract(
        &self,
        unit: &ExtractionUnit<'_>,
        source: &str,
        base_url: Option<&Url>,
    ) -> Result<ListingRecord, ExtractError> {
        let title = self
            .find_field(unit, FieldKind::Title)
            .ok_or(ExtractError::NoTitle)?;

        let record = ListingRecord {
            title: title.value,
            location: self.extract_field(unit, FieldKind::Location),
            date: self.extract_field(unit, FieldKind::Date),
            price: self.extract_field(unit, FieldKind::Price),
            source: source.to_string(),
            link: unit.link(base_url),
            region: None,
            latitude: None,
            longitude: None,
        };
        Ok(record.finish(self.title_max_chars))
    }

    /// Build a record from a feed entry. The title is the text unit; a
    /// parseable-or-not `published` timestamp takes precedence over any date
    /// found in the title, and the description is searched for a location
    /// when the title has none.
    pub fn extract_entry(
        &self,
        entry: &FeedEntry,
        source: &str,
    ) -> Result<ListingRecord, ExtractError> {
        let unit = ExtractionUnit::Text(&entry.title);
        let title = self
            .find_field(&unit, FieldKind::Title)
            .ok_or(ExtractError::NoTitle)?;

        let date = match entry.published.as_deref().map(str::trim) {
            Some(published) if !published.is_empty() => normalize_date(published),
            _ => self.extract_field(&unit, FieldKind::Date),
        };

        let location = self
            .find_field(&unit, FieldKind::Location)
            .or_else(|| {
                let description = entry.description.as_deref()?;
                self.find_field(&ExtractionUnit::Text(description), FieldKind::Location)
            })
            .map(|found| found.value)
            .unwrap_or_else(|| FieldKind::Location.sentinel().to_string());

        let record = ListingRecord {
            title: title.value,
            location,
            date,
            price: self.extract_field(&unit, FieldKind::Price),
            source: source.to_string(),
            link: resolve_link(entry.link.trim(), None).unwrap_or_default(),
            region: None,
            latitude: None,
            longitude: None,
        };
        Ok(record.finish(self.title_max_chars))
    }

    /// Extract every unit, skipping (and logging) the ones that fail.
    #[instrument(level = "info", skip_all, fields(%source))]
    pub fn extract_batch<'a, I>(&self, units: I, source: &str, base_url: Option<&Url>) -> Batch
    where
        I: IntoIterator<Item = ExtractionUnit<'a>>,
    {
        let mut batch = Batch::default();
        for (index, unit) in units.into_iter().enumerate() {
            match self.extract(&unit, source, base_url) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    warn!(
                        index,
                        error = %e,
                        preview = %truncate_for_log(&unit.flattened(), 80),
                        "Skipping listing unit"
                    );
                    batch.skipped += 1;
                }
            }
        }
        info!(
            extracted = batch.records.len(),
            skipped = batch.skipped,
            "Extracted listing batch"
        );
        batch
    }

    /// Feed counterpart of [`Extractor::extract_batch`].
    #[instrument(level = "info", skip_all, fields(%source))]
    pub fn extract_entries(&self, entries: &[FeedEntry], source: &str) -> Batch {
        let mut batch = Batch::default();
        for (index, entry) in entries.iter().enumerate() {
            match self.extract_entry(entry, source) {
                Ok(record) => batch.records.push(record),
                Err(e) => {
                    warn!(index, error = %e, title = %entry.title, "Skipping feed entry");
                    batch.skipped += 1;
                }
            }
        }
        info!(
            extracted = batch.records.len(),
            skipped = batch.skipped,
            "Extracted feed batch"
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DATE_NOT_SPECIFIED, LOCATION_NOT_SPECIFIED, PRICE_NOT_LISTED};
    use scraper::Html;

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        let selector = Selector::parse(css).unwrap();
        doc.select(&selector).next().unwrap()
    }

    #[test]
    fn test_text_unit_example_listing() {
        let extractor = Extractor::default();
        let unit = ExtractionUnit::Text("Estate Sale (Grand Blanc, MI) - $5-500 - Jul 13, 2025");
        assert_eq!(extractor.extract_field(&unit, FieldKind::Location), "Grand Blanc, MI");
        assert_eq!(extractor.extract_field(&unit, FieldKind::Price), "$5");
        assert_eq!(extractor.extract_field(&unit, FieldKind::Date), "2025-07-13");
    }

    #[test]
    fn test_structural_date_beats_text_pattern() {
        let doc = Html::parse_fragment(
            r#"<div class="sale-card">
                 <h3>Downsizing Estate Sale</h3>
                 <time>July 13, 2025</time>
                 <p>Rain date 07/20/2025</p>
               </div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div.sale-card"));
        let found = Extractor::default().find_field(&unit, FieldKind::Date).unwrap();
        assert_eq!(found.value, "2025-07-13");
        assert_eq!(found.origin, Origin::Probe("time"));
    }

    #[test]
    fn test_time_datetime_attribute_preferred() {
        let doc = Html::parse_fragment(
            r#"<div><h3>Barn Sale</h3><time datetime="2025-08-02">Saturday</time></div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div"));
        assert_eq!(
            Extractor::default().extract_field(&unit, FieldKind::Date),
            "2025-08-02"
        );
    }

    #[test]
    fn test_date_probe_with_extra_words() {
        let doc = Html::parse_fragment(
            r#"<div><h3>Yard Sale</h3><span class="sale-date">Sat, Jul 13, 2025 9am-4pm</span></div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div"));
        assert_eq!(
            Extractor::default().extract_field(&unit, FieldKind::Date),
            "2025-07-13"
        );
    }

    #[test]
    fn test_structural_location_joins_address_lines() {
        let doc = Html::parse_fragment(
            r#"<article class="listing">
                 <h2>Moving Sale</h2>
                 <address><div>4410 Maple Ave</div><span>Flint, MI 48503</span></address>
                 <p>Held near Grand Blanc, MI</p>
               </article>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "article"));
        assert_eq!(
            Extractor::default().extract_field(&unit, FieldKind::Location),
            "4410 Maple Ave, Flint, MI 48503"
        );
    }

    #[test]
    fn test_price_probe_without_amount_falls_through() {
        let doc = Html::parse_fragment(
            r#"<div><h3>Garage Sale</h3><span class="price">Various</span><p>Bikes $40</p></div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div"));
        let found = Extractor::default().find_field(&unit, FieldKind::Price).unwrap();
        assert_eq!(found.value, "$40");
        assert_eq!(found.origin, Origin::Pattern("dollar_sign"));
    }

    #[test]
    fn test_price_probe_amount() {
        let doc = Html::parse_fragment(
            r#"<div><h3>Piano</h3><span class="price">USD 1,200</span><p>was $2,000</p></div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div"));
        assert_eq!(
            Extractor::default().extract_field(&unit, FieldKind::Price),
            "$1,200"
        );
    }

    #[test]
    fn test_every_field_present_when_nothing_matches() {
        let extractor = Extractor::default();
        let unit = ExtractionUnit::Text("Something happening sometime somewhere");
        let record = extractor.extract(&unit, "test", None).unwrap();
        assert_eq!(record.title, "Something happening sometime somewhere");
        assert_eq!(record.location, LOCATION_NOT_SPECIFIED);
        assert_eq!(record.date, DATE_NOT_SPECIFIED);
        assert_eq!(record.price, PRICE_NOT_LISTED);
        assert_eq!(record.link, "");
        assert_eq!(record.source, "test");
    }

    #[test]
    fn test_title_cleanup_and_cap() {
        let extractor = Extractor::new(24, DEFAULT_MIN_UNIT_CHARS);
        let unit = ExtractionUnit::Text("Antique oak dining table and six chairs $450 (Fenton)");
        let record = extractor.extract(&unit, "craigslist", None).unwrap();
        assert_eq!(record.title, "Antique oak dining ta...");
        assert_eq!(record.location, "Fenton");
        assert_eq!(record.price, "$450");
    }

    #[test]
    fn test_title_of_only_price_gets_generic_label() {
        let unit = ExtractionUnit::Text("$25 (Holly, MI)");
        let record = Extractor::new(80, 5).extract(&unit, "rss", None).unwrap();
        assert_eq!(record.title, UNTITLED);
        assert_eq!(record.location, "Holly, MI");
    }

    #[test]
    fn test_short_unit_keeps_title_with_sentinels() {
        let unit = ExtractionUnit::Text("Sale $5");
        let record = Extractor::default().extract(&unit, "test", None).unwrap();
        assert_eq!(record.title, "Sale");
        assert_eq!(record.price, PRICE_NOT_LISTED);
        assert_eq!(record.location, LOCATION_NOT_SPECIFIED);
        assert_eq!(record.date, DATE_NOT_SPECIFIED);
    }

    #[test]
    fn test_short_markup_unit_still_probed() {
        let doc = Html::parse_fragment(
            r#"<div class="sale"><h3><a href="/sales/9">Yard Sale</a></h3></div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div.sale"));
        let base = Url::parse("https://sales.example.com").unwrap();
        let record = Extractor::default()
            .extract(&unit, "test", Some(&base))
            .unwrap();
        assert_eq!(record.title, "Yard Sale");
        assert_eq!(record.link, "https://sales.example.com/sales/9");
        assert_eq!(record.location, LOCATION_NOT_SPECIFIED);
    }

    #[test]
    fn test_unit_without_title_candidate_is_skipped() {
        let doc = Html::parse_fragment(r#"<div class="sale"><img src="photo.jpg"></div>"#);
        let unit = ExtractionUnit::Markup(first(&doc, "div.sale"));
        assert_eq!(
            Extractor::default().extract(&unit, "test", None),
            Err(ExtractError::NoTitle)
        );
        assert_eq!(
            Extractor::default().extract(&ExtractionUnit::Text(" \n "), "test", None),
            Err(ExtractError::NoTitle)
        );
    }

    #[test]
    fn test_markup_link_resolved_against_base() {
        let doc = Html::parse_fragment(
            r#"<div><h3><a class="sale-row" href="/MI/Flint/48503/4242">Estate Sale in Flint</a></h3></div>"#,
        );
        let unit = ExtractionUnit::Markup(first(&doc, "div"));
        let base = Url::parse("https://www.estatesales.net").unwrap();
        let record = Extractor::default()
            .extract(&unit, "EstateSales.net", Some(&base))
            .unwrap();
        assert_eq!(record.link, "https://www.estatesales.net/MI/Flint/48503/4242");
        assert_eq!(record.title, "Estate Sale in Flint");
    }

    #[test]
    fn test_relative_link_without_base_is_empty() {
        let doc = Html::parse_fragment(r#"<div><a href="/sale/1">Community yard sale</a></div>"#);
        let unit = ExtractionUnit::Markup(first(&doc, "div"));
        let record = Extractor::default().extract(&unit, "test", None).unwrap();
        assert_eq!(record.link, "");
    }

    #[test]
    fn test_batch_skips_bad_units_and_continues() {
        let units = vec![
            ExtractionUnit::Text("Estate Sale (Flint, MI) $10"),
            ExtractionUnit::Text("   "),
            ExtractionUnit::Text("Tag sale"),
            ExtractionUnit::Text("Moving sale Jul 19, 2025 in Fenton, MI"),
        ];
        let batch = Extractor::default().extract_batch(units, "test", None);
        assert_eq!(batch.records.len(), 3);
        assert_eq!(batch.skipped, 1);
        assert_eq!(batch.records[1].title, "Tag sale");
        assert_eq!(batch.records[2].date, "2025-07-19");
        assert_eq!(batch.records[2].location, "Fenton, MI");
    }

    #[test]
    fn test_feed_entry_uses_published_date() {
        let entry = FeedEntry {
            title: "Garage sale - tools, bikes $15 (Davison)".to_string(),
            link: "https://flint.craigslist.org/gms/d/davison-garage-sale/123.html".to_string(),
            published: Some("Fri, 18 Jul 2025 08:15:00 -0400".to_string()),
            description: None,
        };
        let record = Extractor::default()
            .extract_entry(&entry, "Craigslist-flint")
            .unwrap();
        assert_eq!(record.title, "Garage sale - tools, bikes");
        assert_eq!(record.location, "Davison");
        assert_eq!(record.price, "$15");
        assert_eq!(record.date, "2025-07-18");
        assert_eq!(
            record.link,
            "https://flint.craigslist.org/gms/d/davison-garage-sale/123.html"
        );
    }

    #[test]
    fn test_feed_entry_without_published_date_uses_title() {
        let entry = FeedEntry {
            title: "Estate sale 7/26/2025 in Holly, MI".to_string(),
            link: String::new(),
            published: None,
            description: None,
        };
        let record = Extractor::default().extract_entry(&entry, "rss").unwrap();
        assert_eq!(record.date, "2025-07-26");
        assert_eq!(record.location, "Holly, MI");
    }

    #[test]
    fn test_short_feed_entry_keeps_published_date_and_description_location() {
        let entry = FeedEntry {
            title: "Yard Sale".to_string(),
            link: "https://flint.craigslist.org/gms/d/flint-yard-sale/77.html".to_string(),
            published: Some("Fri, 18 Jul 2025 08:15:00 -0400".to_string()),
            description: Some("Flint, MI 48503".to_string()),
        };
        let batch = Extractor::default().extract_entries(&[entry], "Craigslist-flint");
        assert_eq!(batch.skipped, 0);
        let record = &batch.records[0];
        assert_eq!(record.title, "Yard Sale");
        assert_eq!(record.date, "2025-07-18");
        assert_eq!(record.location, "Flint, MI 48503");
        assert_eq!(
            record.link,
            "https://flint.craigslist.org/gms/d/flint-yard-sale/77.html"
        );
    }

    #[test]
    fn test_feed_entry_location_from_description() {
        let entry = FeedEntry {
            title: "Huge multi-family garage sale".to_string(),
            link: String::new(),
            published: None,
            description: Some("Three houses on one street. Swartz Creek, MI 48473".to_string()),
        };
        let record = Extractor::default().extract_entry(&entry, "rss").unwrap();
        assert_eq!(record.location, "Swartz Creek, MI 48473");
        assert_eq!(record.date, DATE_NOT_SPECIFIED);
    }
}
