//! Atom 1.0 document model.
//!
//! Entries are direct children of `<feed>`. Like the RSS model, unknown
//! elements are ignored on read and omitted on write, and foreign-namespace
//! extensions (`media:*`, `dc:*`) are stripped before deserializing.

use serde::{Deserialize, Serialize};

use super::document::{
    check_root, decode_utf8, first, first_or_default, strip_foreign_elements, Entry, FormatError,
    XML_DECLARATION,
};

pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

fn default_namespace() -> String {
    ATOM_NAMESPACE.to_owned()
}

/// Root `<feed>` element.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename = "feed")]
pub struct AtomDocument {
    #[serde(rename = "@xmlns", default = "default_namespace")]
    pub xmlns: String,
    #[serde(default, deserialize_with = "first_or_default")]
    pub title: AtomText,
    #[serde(default, deserialize_with = "first_or_default")]
    pub id: String,
    #[serde(default, deserialize_with = "first_or_default")]
    pub updated: String,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub subtitle: Option<AtomText>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub icon: Option<String>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub logo: Option<String>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub rights: Option<AtomText>,
    #[serde(rename = "link", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<AtomLink>,
    #[serde(rename = "author", default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<AtomPerson>,
    #[serde(rename = "entry", default)]
    pub entries: Vec<AtomEntry>,
}

/// Text construct (`title`, `subtitle`, `summary`, `rights`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AtomText {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

/// `<content>`; carries a distinct type attribute from the summary.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AtomContent {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "@src", default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AtomLink {
    #[serde(rename = "@href", default)]
    pub href: String,
    #[serde(rename = "@rel", default, skip_serializing_if = "Option::is_none")]
    pub rel: Option<String>,
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(rename = "@title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl AtomLink {
    /// A link with no `rel` is an alternate link per RFC 4287.
    fn is_alternate(&self) -> bool {
        matches!(self.rel.as_deref(), None | Some("alternate"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AtomPerson {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One `<entry>`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AtomEntry {
    #[serde(default, deserialize_with = "first_or_default")]
    pub title: AtomText,
    #[serde(default, deserialize_with = "first_or_default")]
    pub id: String,
    #[serde(default, deserialize_with = "first_or_default")]
    pub updated: String,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub published: Option<String>,
    #[serde(rename = "link", default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<AtomLink>,
    #[serde(rename = "author", default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<AtomPerson>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub summary: Option<AtomText>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<AtomContent>,
}

impl AtomEntry {
    fn primary_link(&self) -> Option<&AtomLink> {
        self.links
            .iter()
            .find(|l| l.is_alternate())
            .or_else(|| self.links.first())
    }

    fn primary_link_mut(&mut self) -> Option<&mut AtomLink> {
        let index = self
            .links
            .iter()
            .position(AtomLink::is_alternate)
            .unwrap_or(0);
        self.links.get_mut(index)
    }
}

impl AtomDocument {
    /// Parses an Atom 1.0 document.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnexpectedRoot`] if the root element is not
    /// `<feed>`, or [`FormatError::Xml`] if the structure does not match.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let xml = decode_utf8(bytes);
        check_root(&xml, "feed")?;
        let xml = strip_foreign_elements(&xml)?;
        quick_xml::de::from_str(&xml).map_err(|e| FormatError::Xml(e.to_string()))
    }

    pub fn to_xml(&self) -> Result<String, FormatError> {
        let mut doc = self.clone();
        if doc.xmlns.is_empty() {
            doc.xmlns = default_namespace();
        }
        let body =
            quick_xml::se::to_string(&doc).map_err(|e| FormatError::Serialize(e.to_string()))?;
        Ok(format!("{XML_DECLARATION}{body}"))
    }

    pub fn ensure_icon(&mut self, icon_url: &str) {
        if matches!(self.icon.as_deref(), None | Some("")) {
            self.icon = Some(icon_url.to_owned());
        }
    }
}

impl Entry for AtomEntry {
    fn title(&self) -> &str {
        &self.title.value
    }

    fn set_title(&mut self, title: String) {
        self.title = AtomText {
            kind: None,
            value: title,
        };
    }

    fn link(&self) -> Option<&str> {
        self.primary_link()
            .map(|l| l.href.as_str())
            .filter(|href| !href.trim().is_empty())
    }

    fn set_link(&mut self, link: String) {
        match self.primary_link_mut() {
            Some(existing) => existing.href = link,
            None => self.links.push(AtomLink {
                href: link,
                ..AtomLink::default()
            }),
        }
    }

    fn set_content(&mut self, html: String) {
        let content = self.content.get_or_insert_with(AtomContent::default);
        content.kind = Some("html".to_owned());
        content.src = None;
        content.value = html;
    }

    /// Content if present, else the summary, else a new html content element.
    fn content_mut(&mut self) -> &mut String {
        if self.content.is_none() {
            if let Some(summary) = self.summary.as_mut() {
                return &mut summary.value;
            }
        }
        let content = self.content.get_or_insert_with(|| AtomContent {
            kind: Some("html".to_owned()),
            ..AtomContent::default()
        });
        &mut content.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Example Blog</title>
  <link href="https://example.com" rel="alternate"/>
  <updated>2024-01-01T00:00:00Z</updated>
  <link href="https://example.com/feed.xml" rel="self"/>
  <id>urn:example</id>
  <author><name>Someone</name></author>
  <entry>
    <id>1</id>
    <title>First Post</title>
    <link href="https://example.com/post/1/comments" rel="replies"/>
    <updated>2024-01-01T00:00:00Z</updated>
    <link href="https://example.com/post/1"/>
    <summary>Short</summary>
    <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
  </entry>
  <entry>
    <id>2</id>
    <title>Linkless</title>
    <updated>2024-01-02T00:00:00Z</updated>
    <content type="text">Untouched</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_and_entries() {
        let doc = AtomDocument::parse(ATOM.as_bytes()).unwrap();
        assert_eq!(doc.title.value, "Example Blog");
        assert_eq!(doc.links.len(), 2);
        assert_eq!(doc.entries.len(), 2);

        let first = &doc.entries[0];
        assert_eq!(first.title(), "First Post");
        assert_eq!(first.link(), Some("https://example.com/post/1"));
        assert_eq!(first.content.as_ref().unwrap().value, "<p>Body</p>");
        assert_eq!(
            first.content.as_ref().unwrap().kind.as_deref(),
            Some("html")
        );

        assert_eq!(doc.entries[1].link(), None);
    }

    #[test]
    fn test_round_trip() {
        let doc = AtomDocument::parse(ATOM.as_bytes()).unwrap();
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains(r#"xmlns="http://www.w3.org/2005/Atom""#));
        let again = AtomDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn test_media_and_dc_extensions_ignored() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom"
            xmlns:media="http://search.yahoo.com/mrss/"
            xmlns:dc="http://purl.org/dc/elements/1.1/">
          <title>Video Feed</title>
          <dc:title>Other title</dc:title>
          <entry>
            <title>Clip</title>
            <dc:title>Clip (dc)</dc:title>
            <link rel="alternate" href="https://example.com/clip"/>
            <media:group>
              <media:title>Clip (media)</media:title>
              <media:content url="https://example.com/clip.mp4"/>
            </media:group>
            <media:content url="https://example.com/clip.webm"/>
            <content type="text">Body</content>
          </entry>
        </feed>"#;

        let doc = AtomDocument::parse(atom.as_bytes()).unwrap();
        assert_eq!(doc.title.value, "Video Feed");
        let entry = &doc.entries[0];
        assert_eq!(entry.title(), "Clip");
        assert_eq!(entry.link(), Some("https://example.com/clip"));
        assert_eq!(entry.content.as_ref().unwrap().value, "Body");
    }

    #[test]
    fn test_rss_root_rejected() {
        let rss = r#"<rss version="2.0"><channel><title>x</title></channel></rss>"#;
        let result = AtomDocument::parse(rss.as_bytes());
        assert!(matches!(result, Err(FormatError::UnexpectedRoot { .. })));
    }

    #[test]
    fn test_set_content_forces_html_type() {
        let mut doc = AtomDocument::parse(ATOM.as_bytes()).unwrap();
        let entry = &mut doc.entries[1];
        entry.set_content("<p>Full</p>".to_owned());
        let content = entry.content.as_ref().unwrap();
        assert_eq!(content.kind.as_deref(), Some("html"));
        assert_eq!(content.value, "<p>Full</p>");
    }

    #[test]
    fn test_set_link_replaces_alternate_only() {
        let mut doc = AtomDocument::parse(ATOM.as_bytes()).unwrap();
        let entry = &mut doc.entries[0];
        entry.set_link("https://canonical.example/1".to_owned());
        assert_eq!(entry.link(), Some("https://canonical.example/1"));
        assert_eq!(entry.links[0].href, "https://example.com/post/1/comments");
    }

    #[test]
    fn test_content_mut_falls_back_to_summary() {
        let mut entry = AtomEntry {
            summary: Some(AtomText {
                kind: None,
                value: "sum".to_owned(),
            }),
            ..AtomEntry::default()
        };
        entry.content_mut().push('!');
        assert_eq!(entry.summary.as_ref().unwrap().value, "sum!");
        assert!(entry.content.is_none());
    }

    #[test]
    fn test_content_mut_creates_html_content() {
        let mut entry = AtomEntry::default();
        entry.content_mut().push_str("<img/>");
        let content = entry.content.unwrap();
        assert_eq!(content.kind.as_deref(), Some("html"));
        assert_eq!(content.value, "<img/>");
    }

    #[test]
    fn test_ensure_icon() {
        let mut doc = AtomDocument::parse(ATOM.as_bytes()).unwrap();
        doc.ensure_icon("https://icons.example/x.png");
        assert_eq!(doc.icon.as_deref(), Some("https://icons.example/x.png"));

        doc.ensure_icon("https://icons.example/other.png");
        assert_eq!(doc.icon.as_deref(), Some("https://icons.example/x.png"));
    }
}
