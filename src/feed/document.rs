use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use thiserror::Error;

use super::atom::AtomDocument;
use super::rss::RssDocument;

pub(crate) const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Content type of every rewritten feed response.
pub const FEED_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Errors from reading or writing a feed document.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Document root is not the element this format requires
    #[error("expected <{expected}> root element, found {}", found.as_deref().unwrap_or("none"))]
    UnexpectedRoot {
        expected: &'static str,
        found: Option<String>,
    },
    /// Structure did not match the format's model
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("XML serialize error: {0}")]
    Serialize(String),
}

/// Shared view of one feed entry, whatever the wire format.
///
/// Only the rewriting step uses this; each format's (de)serialization
/// stays on its own concrete types.
pub trait Entry {
    fn title(&self) -> &str;
    fn set_title(&mut self, title: String);
    /// The entry's article link, `None` when absent or blank.
    fn link(&self) -> Option<&str>;
    fn set_link(&mut self, link: String);
    /// Replaces the entry's content with extracted article HTML.
    fn set_content(&mut self, html: String);
    /// The content string a beacon is appended to.
    fn content_mut(&mut self) -> &mut String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedKind {
    Rss,
    Atom,
}

/// A parsed feed. Exactly one format is live per request.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedDocument {
    Rss(RssDocument),
    Atom(AtomDocument),
}

impl FeedDocument {
    /// Parses `bytes` as RSS, then as Atom.
    ///
    /// The two root elements are incompatible, so order only matters for
    /// which error is reported; the Atom error is returned when both fail.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        match RssDocument::parse(bytes) {
            Ok(rss) => Ok(Self::Rss(rss)),
            Err(rss_err) => {
                tracing::trace!(error = %rss_err, "Not an RSS document, trying Atom");
                AtomDocument::parse(bytes).map(Self::Atom)
            }
        }
    }

    pub fn kind(&self) -> FeedKind {
        match self {
            Self::Rss(_) => FeedKind::Rss,
            Self::Atom(_) => FeedKind::Atom,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Rss(rss) => &rss.channel.title,
            Self::Atom(atom) => &atom.title.value,
        }
    }

    /// Sets the feed icon (RSS `<image>`, Atom `<icon>`) if it has none.
    pub fn ensure_icon(&mut self, icon_url: &str) {
        match self {
            Self::Rss(rss) => rss.ensure_image(icon_url),
            Self::Atom(atom) => atom.ensure_icon(icon_url),
        }
    }

    pub fn entry_count(&self) -> usize {
        match self {
            Self::Rss(rss) => rss.channel.items.len(),
            Self::Atom(atom) => atom.entries.len(),
        }
    }

    /// Entries in document order.
    pub fn entries_mut(&mut self) -> Box<dyn Iterator<Item = &mut dyn Entry> + '_> {
        match self {
            Self::Rss(rss) => Box::new(
                rss.channel
                    .items
                    .iter_mut()
                    .map(|item| item as &mut dyn Entry),
            ),
            Self::Atom(atom) => Box::new(
                atom.entries
                    .iter_mut()
                    .map(|entry| entry as &mut dyn Entry),
            ),
        }
    }

    /// Entry links in document order, `None` for entries without one.
    pub fn entry_links(&mut self) -> Vec<Option<String>> {
        self.entries_mut()
            .map(|entry| entry.link().map(str::to_owned))
            .collect()
    }

    /// Serializes back to the document's own wire format.
    pub fn to_xml(&self) -> Result<String, FormatError> {
        match self {
            Self::Rss(rss) => rss.to_xml(),
            Self::Atom(atom) => atom.to_xml(),
        }
    }
}

/// Decodes feed bytes, replacing invalid UTF-8 and dropping a leading BOM.
pub(crate) fn decode_utf8(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

/// Fails unless the first element of `xml` is named `expected`.
///
/// SEC-002: quick-xml (0.37) never expands DOCTYPE entity declarations,
/// so scanning untrusted input here cannot trigger XXE.
pub(crate) fn check_root(xml: &str, expected: &'static str) -> Result<(), FormatError> {
    let found = root_element(xml);
    if found.as_deref() == Some(expected) {
        Ok(())
    } else {
        Err(FormatError::UnexpectedRoot { expected, found })
    }
}

/// Drops every element whose namespace prefix differs from the root's,
/// subtree included.
///
/// Extension vocabularies (`atom:link`, `itunes:image`, `media:content`,
/// `dc:title`) reuse core element names, and the deserializer matches on
/// local names only.
pub(crate) fn strip_foreign_elements(xml: &str) -> Result<String, FormatError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut root_prefix: Option<Option<Vec<u8>>> = None;
    let mut skip_depth = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FormatError::Xml(e.to_string()))?;

        if skip_depth > 0 {
            match event {
                Event::Start(_) => skip_depth += 1,
                Event::End(_) => skip_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match &event {
            Event::Start(e) | Event::Empty(e) => {
                let prefix = e.name().prefix().map(|p| p.as_ref().to_vec());
                let root = root_prefix.get_or_insert_with(|| prefix.clone());
                if *root != prefix {
                    if matches!(event, Event::Start(_)) {
                        skip_depth = 1;
                    }
                    continue;
                }
            }
            Event::Eof => break,
            _ => {}
        }

        writer
            .write_event(event)
            .map_err(|e| FormatError::Xml(e.to_string()))?;
    }

    String::from_utf8(writer.into_inner()).map_err(|e| FormatError::Xml(e.to_string()))
}

/// Deserializes an element that may repeat, keeping the first occurrence.
pub(crate) fn first_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let all = Vec::<T>::deserialize(deserializer)?;
    Ok(all.into_iter().next().unwrap_or_default())
}

/// Optional variant of [`first_or_default`].
pub(crate) fn first<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let all = Vec::<T>::deserialize(deserializer)?;
    Ok(all.into_iter().next())
}

fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<rss version="2.0"><channel><title>R</title>
        <item><title>a</title><link>http://a/x</link></item>
        <item><title>b</title></item>
        </channel></rss>"#;

    const ATOM: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>A</title>
        <entry><title>a</title><link href="http://a/y"/></entry>
        </feed>"#;

    #[test]
    fn test_detects_rss() {
        let doc = FeedDocument::parse(RSS.as_bytes()).unwrap();
        assert_eq!(doc.kind(), FeedKind::Rss);
        assert_eq!(doc.title(), "R");
        assert_eq!(doc.entry_count(), 2);
    }

    #[test]
    fn test_detects_atom() {
        let doc = FeedDocument::parse(ATOM.as_bytes()).unwrap();
        assert_eq!(doc.kind(), FeedKind::Atom);
        assert_eq!(doc.title(), "A");
    }

    #[test]
    fn test_entry_links_in_order() {
        let mut doc = FeedDocument::parse(RSS.as_bytes()).unwrap();
        assert_eq!(
            doc.entry_links(),
            vec![Some("http://a/x".to_owned()), None]
        );
    }

    #[test]
    fn test_entries_mut_shared_view() {
        let mut doc = FeedDocument::parse(ATOM.as_bytes()).unwrap();
        for entry in doc.entries_mut() {
            entry.set_content("<p>x</p>".to_owned());
        }
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("&lt;p&gt;x&lt;/p&gt;"));
        assert!(xml.contains(r#"type="html""#));
    }

    #[test]
    fn test_html_is_not_a_feed() {
        let html = "<!DOCTYPE html><html><head><title>t</title></head><body></body></html>";
        let result = FeedDocument::parse(html.as_bytes());
        assert!(matches!(
            result,
            Err(FormatError::UnexpectedRoot { expected: "feed", found: Some(ref f) }) if f == "html"
        ));
    }

    #[test]
    fn test_garbage_is_not_a_feed() {
        assert!(FeedDocument::parse(b"not xml at all").is_err());
        assert!(FeedDocument::parse(b"").is_err());
    }

    #[test]
    fn test_strip_foreign_elements_keeps_core() {
        let xml = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
            <atom:link href="http://a/feed" rel="self"/><link>http://a/</link>
            <media:group><title>nested</title><media:title>x</media:title></media:group>
            <description><![CDATA[<b>kept</b>]]></description></channel></rss>"#;
        let stripped = strip_foreign_elements(xml).unwrap();
        assert!(stripped.contains("<link>http://a/</link>"));
        assert!(stripped.contains("<![CDATA[<b>kept</b>]]>"));
        assert!(stripped.contains(r#"xmlns:atom="http://www.w3.org/2005/Atom""#));
        assert!(!stripped.contains("atom:link"));
        assert!(!stripped.contains("media:"));
        assert!(!stripped.contains("nested"));
    }

    #[test]
    fn test_strip_foreign_elements_follows_root_prefix() {
        let xml = r#"<a:feed xmlns:a="http://www.w3.org/2005/Atom"><a:title>T</a:title><dc:title>D</dc:title></a:feed>"#;
        let stripped = strip_foreign_elements(xml).unwrap();
        assert!(stripped.contains("<a:title>T</a:title>"));
        assert!(!stripped.contains("dc:title"));
    }

    #[test]
    fn test_bom_is_ignored() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(RSS.as_bytes());
        assert!(FeedDocument::parse(&bytes).is_ok());
    }
}
