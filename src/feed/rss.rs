//! RSS 2.0 document model.
//!
//! Mirrors the element shapes of `<rss><channel>...<item>...</item></channel></rss>`.
//! Elements not modeled here are dropped on read and therefore on write.
//! Namespaced extensions (`atom:link`, `itunes:*`, `dc:*`) are removed
//! before deserializing, so only core RSS elements reach these structures.
//! Elements RSS allows once but feeds sometimes repeat keep their first
//! occurrence.

use serde::{Deserialize, Serialize};

use super::document::{
    check_root, decode_utf8, first, first_or_default, strip_foreign_elements, Entry, FormatError,
    XML_DECLARATION,
};

fn default_version() -> String {
    "2.0".to_owned()
}

/// Root `<rss>` element.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename = "rss")]
pub struct RssDocument {
    #[serde(rename = "@version", default = "default_version")]
    pub version: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Channel {
    #[serde(default, deserialize_with = "first_or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "first_or_default")]
    pub link: String,
    #[serde(default, deserialize_with = "first_or_default")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub language: Option<String>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub copyright: Option<String>,
    #[serde(
        rename = "pubDate",
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub pub_date: Option<String>,
    #[serde(
        rename = "lastBuildDate",
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_build_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<Category>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub generator: Option<String>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub ttl: Option<String>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub image: Option<Image>,
    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Image {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Category {
    #[serde(rename = "@domain", default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Guid {
    #[serde(
        rename = "@isPermaLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_perma_link: Option<String>,
    #[serde(rename = "$text", default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Enclosure {
    #[serde(rename = "@url", default)]
    pub url: String,
    #[serde(rename = "@length", default, skip_serializing_if = "Option::is_none")]
    pub length: Option<String>,
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One `<item>`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Item {
    #[serde(default, deserialize_with = "first_or_default")]
    pub title: String,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<String>,
    #[serde(default, deserialize_with = "first_or_default")]
    pub description: String,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category: Vec<Category>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub comments: Option<String>,
    /// Podcast feeds occasionally carry more than one.
    #[serde(rename = "enclosure", default, skip_serializing_if = "Vec::is_empty")]
    pub enclosures: Vec<Enclosure>,
    #[serde(
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub guid: Option<Guid>,
    #[serde(
        rename = "pubDate",
        default,
        deserialize_with = "first",
        skip_serializing_if = "Option::is_none"
    )]
    pub pub_date: Option<String>,
}

impl RssDocument {
    /// Parses an RSS 2.0 document.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::UnexpectedRoot`] if the root element is not
    /// `<rss>`, or [`FormatError::Xml`] if the structure does not match.
    pub fn parse(bytes: &[u8]) -> Result<Self, FormatError> {
        let xml = decode_utf8(bytes);
        check_root(&xml, "rss")?;
        let xml = strip_foreign_elements(&xml)?;
        quick_xml::de::from_str(&xml).map_err(|e| FormatError::Xml(e.to_string()))
    }

    pub fn to_xml(&self) -> Result<String, FormatError> {
        let body =
            quick_xml::se::to_string(self).map_err(|e| FormatError::Serialize(e.to_string()))?;
        Ok(format!("{XML_DECLARATION}{body}"))
    }

    /// Fills in a channel image pointing at `icon_url` when the feed has none.
    pub fn ensure_image(&mut self, icon_url: &str) {
        let channel = &mut self.channel;
        let image = channel.image.get_or_insert_with(|| Image {
            url: String::new(),
            title: channel.title.clone(),
            link: channel.link.clone(),
        });
        if image.url.is_empty() {
            image.url = icon_url.to_owned();
        }
    }
}

impl Entry for Item {
    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }

    fn link(&self) -> Option<&str> {
        self.link.as_deref().filter(|l| !l.trim().is_empty())
    }

    fn set_link(&mut self, link: String) {
        self.link = Some(link);
    }

    fn set_content(&mut self, html: String) {
        self.description = html;
    }

    fn content_mut(&mut self) -> &mut String {
        &mut self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Example Blog</title>
    <link>https://example.com</link>
    <description>An example blog</description>
    <atom:link href="https://example.com/feed.xml" rel="self"/>
    <category>tech</category>
    <category domain="x">rust</category>
    <item>
      <title>First Post</title>
      <link>https://example.com/post/1</link>
      <description><![CDATA[<p>Summary</p>]]></description>
      <guid isPermaLink="false">post-1</guid>
      <category>news</category>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
      <dc:creator>nobody</dc:creator>
    </item>
    <item>
      <title>No Link</title>
      <description>Plain</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_channel_and_items() {
        let doc = RssDocument::parse(RSS.as_bytes()).unwrap();
        assert_eq!(doc.version, "2.0");
        assert_eq!(doc.channel.title, "Example Blog");
        assert_eq!(doc.channel.link, "https://example.com");
        assert_eq!(doc.channel.category.len(), 2);
        assert_eq!(doc.channel.items.len(), 2);

        let first = &doc.channel.items[0];
        assert_eq!(first.title, "First Post");
        assert_eq!(first.description, "<p>Summary</p>");
        assert_eq!(first.guid.as_ref().map(|g| g.value.as_str()), Some("post-1"));
        assert_eq!(first.link(), Some("https://example.com/post/1"));

        assert_eq!(doc.channel.items[1].link(), None);
    }

    #[test]
    fn test_round_trip_preserves_modeled_fields() {
        let doc = RssDocument::parse(RSS.as_bytes()).unwrap();
        let xml = doc.to_xml().unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(!xml.contains("rel=\"self\""));
        let again = RssDocument::parse(xml.as_bytes()).unwrap();
        assert_eq!(again, doc);
    }

    #[test]
    fn test_set_link_adds_or_replaces_link() {
        let mut doc = RssDocument::parse(RSS.as_bytes()).unwrap();
        let items = &mut doc.channel.items;
        items[0].set_link("https://canonical.example/1".to_owned());
        assert_eq!(items[0].link(), Some("https://canonical.example/1"));

        items[1].set_link("https://example.com/2".to_owned());
        assert_eq!(items[1].link(), Some("https://example.com/2"));
    }

    #[test]
    fn test_html_description_is_escaped_on_write() {
        let doc = RssDocument::parse(RSS.as_bytes()).unwrap();
        let xml = doc.to_xml().unwrap();
        assert!(xml.contains("&lt;p&gt;Summary&lt;/p&gt;"));
    }

    #[test]
    fn test_extension_elements_sharing_core_names() {
        let rss = r#"<rss version="2.0"
            xmlns:itunes="http://www.itunes.com/dtds/podcast-1.0.dtd"
            xmlns:media="http://search.yahoo.com/mrss/">
          <channel>
            <title>Podcast</title>
            <itunes:author>Host</itunes:author>
            <itunes:image href="https://example.com/art.jpg"/>
            <link>https://example.com</link>
            <item>
              <title>Episode</title>
              <media:title>Episode (media)</media:title>
              <itunes:author>Guest</itunes:author>
              <author>host@example.com</author>
              <media:description>Media text</media:description>
              <description>Show notes</description>
              <link>https://example.com/ep/1</link>
            </item>
          </channel>
        </rss>"#;

        let doc = RssDocument::parse(rss.as_bytes()).unwrap();
        assert_eq!(doc.channel.image, None);
        let item = &doc.channel.items[0];
        assert_eq!(item.title, "Episode");
        assert_eq!(item.author.as_deref(), Some("host@example.com"));
        assert_eq!(item.description, "Show notes");
        assert_eq!(item.link(), Some("https://example.com/ep/1"));
    }

    #[test]
    fn test_repeated_single_elements_keep_first() {
        let rss = r#"<rss version="2.0"><channel><title>t</title><link>https://example.com</link>
            <item>
              <title>Episode</title>
              <enclosure url="https://example.com/ep.mp3" length="1" type="audio/mpeg"/>
              <guid>a</guid>
              <enclosure url="https://example.com/ep.m4a" length="2" type="audio/mp4"/>
              <guid>b</guid>
              <comments>https://example.com/c1</comments>
              <comments>https://example.com/c2</comments>
              <link>https://example.com/ep</link>
              <link>https://example.com/ep-dup</link>
            </item>
            </channel></rss>"#;

        let doc = RssDocument::parse(rss.as_bytes()).unwrap();
        let item = &doc.channel.items[0];
        assert_eq!(item.enclosures.len(), 2);
        assert_eq!(item.enclosures[1].url, "https://example.com/ep.m4a");
        assert_eq!(item.guid.as_ref().map(|g| g.value.as_str()), Some("a"));
        assert_eq!(item.comments.as_deref(), Some("https://example.com/c1"));
        assert_eq!(item.link(), Some("https://example.com/ep"));

        let xml = doc.to_xml().unwrap();
        assert_eq!(xml.matches("<enclosure ").count(), 2);
    }

    #[test]
    fn test_atom_root_rejected() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#;
        let result = RssDocument::parse(atom.as_bytes());
        assert!(matches!(result, Err(FormatError::UnexpectedRoot { .. })));
    }

    #[test]
    fn test_missing_channel_rejected() {
        let result = RssDocument::parse(br#"<rss version="2.0"></rss>"#);
        assert!(matches!(result, Err(FormatError::Xml(_))));
    }

    #[test]
    fn test_ensure_image_adds_favicon() {
        let mut doc = RssDocument::parse(RSS.as_bytes()).unwrap();
        doc.ensure_image("https://icons.example/x.png");
        let image = doc.channel.image.unwrap();
        assert_eq!(image.url, "https://icons.example/x.png");
        assert_eq!(image.title, "Example Blog");
        assert_eq!(image.link, "https://example.com");
    }

    #[test]
    fn test_ensure_image_keeps_existing_url() {
        let rss = r#"<rss version="2.0"><channel><title>t</title>
            <image><url>https://example.com/logo.png</url><title>t</title><link>l</link></image>
            </channel></rss>"#;
        let mut doc = RssDocument::parse(rss.as_bytes()).unwrap();
        doc.ensure_image("https://icons.example/x.png");
        assert_eq!(
            doc.channel.image.unwrap().url,
            "https://example.com/logo.png"
        );
    }
}
