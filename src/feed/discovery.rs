use scraper::{Html, Selector};
use url::Url;

/// `<link rel="alternate">` tags advertising an RSS or Atom representation.
const FEED_LINK_SELECTOR: &str = concat!(
    r#"link[rel~="alternate"][type="application/rss+xml"][href], "#,
    r#"link[rel~="alternate"][type="application/atom+xml"][href]"#
);

/// Scans a landing page for its feed autodiscovery link.
///
/// Parses `html` leniently and returns the first RSS/Atom alternate link,
/// resolved against `base_url` (absolute, root-relative, path-relative and
/// protocol-relative hrefs are all handled by the URL parser). Returns `None`
/// when no usable link exists, including hrefs that resolve to a non-HTTP
/// scheme.
///
/// # Examples
///
/// ```
/// use fullfeed::feed::find_feed_link;
/// use url::Url;
///
/// let base = Url::parse("http://site/page").unwrap();
/// let html = r#"<link rel="alternate" type="application/rss+xml" href="/feed.xml">"#;
/// let found = find_feed_link(&base, html).unwrap();
/// assert_eq!(found.as_str(), "http://site/feed.xml");
/// ```
pub fn find_feed_link(base_url: &Url, html: &str) -> Option<Url> {
    let selector = Selector::parse(FEED_LINK_SELECTOR).ok()?;
    let document = Html::parse_document(html);

    let href = document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())?;

    let resolved = base_url.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        scheme => {
            tracing::debug!(href = %href, scheme = %scheme, "Ignoring feed link with non-HTTP scheme");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn find(html: &str, base_url: &str) -> Option<String> {
        find_feed_link(&base(base_url), html).map(String::from)
    }

    #[test]
    fn test_find_rss_link_in_html() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/rss+xml" href="/feed.xml" title="RSS">
        </head><body></body></html>"#;
        assert_eq!(
            find(html, "http://site/page"),
            Some("http://site/feed.xml".to_owned())
        );
    }

    #[test]
    fn test_find_atom_link_in_html() {
        let html = r#"<html><head>
            <link rel="alternate" type="application/atom+xml" href="https://example.com/atom.xml">
        </head><body></body></html>"#;
        assert_eq!(
            find(html, "https://example.com"),
            Some("https://example.com/atom.xml".to_owned())
        );
    }

    #[test]
    fn test_find_feed_link_reversed_attrs() {
        let html = r#"<html><head>
            <link href="/feed.xml" type="application/rss+xml" rel="alternate">
        </head><body></body></html>"#;
        assert_eq!(
            find(html, "https://example.com"),
            Some("https://example.com/feed.xml".to_owned())
        );
    }

    #[test]
    fn test_first_matching_link_wins() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="alternate" type="application/atom+xml" href="/atom">
            <link rel="alternate" type="application/rss+xml" href="/rss">
        </head></html>"#;
        assert_eq!(
            find(html, "https://example.com/"),
            Some("https://example.com/atom".to_owned())
        );
    }

    #[test]
    fn test_no_feed_link_in_html() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="alternate" hreflang="fr" href="/fr/">
        </head><body></body></html>"#;
        assert_eq!(find(html, "https://example.com"), None);
    }

    #[test]
    fn test_find_feed_link_protocol_relative() {
        let html = r#"<link rel="alternate" type="application/rss+xml" href="//cdn.example.com/feed.xml">"#;
        assert_eq!(
            find(html, "https://example.com"),
            Some("https://cdn.example.com/feed.xml".to_owned())
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        let html = r#"<link rel="alternate" type="application/rss+xml" href="feed.xml">"#;
        assert_eq!(
            find(html, "https://example.com/blog/"),
            Some("https://example.com/blog/feed.xml".to_owned())
        );
    }

    #[test]
    fn test_empty_href_skipped() {
        let html = r#"<link rel="alternate" type="application/rss+xml" href="  ">"#;
        assert_eq!(find(html, "https://example.com"), None);
    }

    #[test]
    fn test_javascript_href_rejected() {
        let html = r#"<link rel="alternate" type="application/rss+xml" href="javascript:alert(1)">"#;
        assert_eq!(find(html, "https://example.com"), None);
    }

    #[test]
    fn test_garbage_input_yields_none() {
        assert_eq!(find("\u{0}<<<>>>not html", "https://example.com"), None);
        assert_eq!(find("", "https://example.com"), None);
    }
}
