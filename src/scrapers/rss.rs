//! RSS 2.0 / Atom feed reading.
//!
//! Feeds are walked with a streaming `quick-xml` reader. Each `<item>` (RSS)
//! or `<entry>` (Atom) becomes a [`FeedEntry`]; everything outside those
//! elements is ignored. Entity references and CDATA sections are decoded, and
//! markup inside descriptions is flattened to text.

use quick_xml::Reader;
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use scraper::Html;
use tracing::{debug, instrument};

use crate::error::FeedError;
use crate::utils::collapse_whitespace;

/// One feed item, with its text fields decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    /// `pubDate` (RSS) or `published`/`updated` (Atom), as written.
    pub published: Option<String>,
    /// `description` or `summary`, with markup stripped.
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    Updated,
    Description,
}

impl Field {
    fn from_tag(local_name: &[u8]) -> Option<Self> {
        match local_name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" | b"published" | b"date" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            b"description" | b"summary" => Some(Field::Description),
            _ => None,
        }
    }
}

/// Text collected for the entry currently being read.
#[derive(Debug, Default)]
struct EntryBuffer {
    title: String,
    link: String,
    published: String,
    updated: String,
    description: String,
}

impl EntryBuffer {
    fn slot(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Description => &mut self.description,
        }
    }

    /// Atom links carry the URL in `href`; prefer `rel="alternate"` or no rel.
    fn take_link_attr(&mut self, element: &BytesStart<'_>) {
        if !self.link.is_empty() {
            return;
        }
        let rel = attr_value(element, b"rel");
        if matches!(rel.as_deref(), Some(r) if r != "alternate") {
            return;
        }
        if let Some(href) = attr_value(element, b"href") {
            self.link = href;
        }
    }

    fn finish(self) -> Option<FeedEntry> {
        let title = collapse_whitespace(&self.title);
        if title.is_empty() {
            return None;
        }
        let published = [self.published, self.updated]
            .into_iter()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty());
        let description = Some(strip_markup(&self.description)).filter(|d| !d.is_empty());
        Some(FeedEntry {
            title,
            link: self.link.trim().to_string(),
            published,
            description,
        })
    }
}

fn attr_value(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    let attr = element.try_get_attribute(name).ok().flatten()?;
    let raw = String::from_utf8_lossy(&attr.value);
    let value = unescape(&raw).map(|v| v.into_owned()).unwrap_or_else(|_| raw.into_owned());
    Some(value)
}

/// Flatten HTML carried inside a description to plain text.
fn strip_markup(html: &str) -> String {
    if !html.contains('<') {
        return collapse_whitespace(html);
    }
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    collapse_whitespace(&text.join(" "))
}

/// Parse an RSS or Atom document into at most `max_entries` entries.
///
/// Entries without a title are dropped. A malformed document fails as a
/// whole; callers treat that as one failed feed, not a failed run.
///
/// # Errors
///
/// Returns [`FeedError::Xml`] with the byte position of the syntax error.
#[instrument(level = "debug", skip(xml), fields(bytes = xml.len()))]
pub fn parse_feed(xml: &str, max_entries: usize) -> Result<Vec<FeedEntry>, FeedError> {
    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<EntryBuffer> = None;
    let mut field: Option<(Field, Vec<u8>)> = None;

    loop {
        let event = reader.read_event().map_err(|source| FeedError::Xml {
            position: reader.error_position(),
            source,
        })?;
        match event {
            Event::Start(e) => {
                let local = e.local_name();
                let tag = local.as_ref();
                if current.is_none() {
                    if matches!(tag, b"item" | b"entry") {
                        current = Some(EntryBuffer::default());
                    }
                } else if field.is_none() {
                    if let (Some(buffer), Some(f)) = (current.as_mut(), Field::from_tag(tag)) {
                        if f == Field::Link {
                            buffer.take_link_attr(&e);
                        }
                        field = Some((f, tag.to_vec()));
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(buffer) = current.as_mut() {
                    if e.local_name().as_ref() == b"link" {
                        buffer.take_link_attr(&e);
                    }
                }
            }
            Event::End(e) => {
                let local = e.local_name();
                if matches!(&field, Some((_, tag)) if tag.as_slice() == local.as_ref()) {
                    field = None;
                } else if field.is_none() && matches!(local.as_ref(), b"item" | b"entry") {
                    if let Some(entry) = current.take().and_then(EntryBuffer::finish) {
                        entries.push(entry);
                        if entries.len() >= max_entries {
                            break;
                        }
                    }
                }
            }
            Event::Text(e) => {
                if let (Some(buffer), Some((f, _))) = (current.as_mut(), &field) {
                    let raw = String::from_utf8_lossy(&e);
                    match unescape(&raw) {
                        Ok(text) => buffer.slot(*f).push_str(&text),
                        Err(_) => buffer.slot(*f).push_str(&raw),
                    }
                }
            }
            Event::CData(e) => {
                if let (Some(buffer), Some((f, _))) = (current.as_mut(), &field) {
                    buffer.slot(*f).push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::GeneralRef(e) => {
                if let (Some(buffer), Some((f, _))) = (current.as_mut(), &field) {
                    let resolved = match e.resolve_char_ref() {
                        Ok(Some(ch)) => Some(ch.to_string()),
                        _ => e
                            .decode()
                            .ok()
                            .and_then(|name| resolve_predefined_entity(&name).map(str::to_string)),
                    };
                    if let Some(text) = resolved {
                        buffer.slot(*f).push_str(&text);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(entries = entries.len(), "Parsed feed");
    Ok(entries)
}
