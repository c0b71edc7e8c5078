//! Analytics beacons for rewritten feeds.
//!
//! Each request gets a random client id. The feed itself is reported once
//! with a dispatched hit; every rewritten entry gets an inline `<img>` beacon
//! in its content plus a dispatched hit of its own. Dispatch is detached and
//! its outcome is never observed by the request.

use url::{Position, Url};

use crate::config::TrackingConfig;
use crate::feed::FETCH_TIMEOUT;

/// Per-request tracking state.
///
/// `title`/`page` describe whatever is currently being reported: the feed
/// at first, then each entry in turn.
#[derive(Debug, Clone)]
pub struct TrackingContext {
    client_id: u32,
    client_ip: Option<String>,
    base_url: Url,
    title: String,
    page: Option<Url>,
}

impl TrackingContext {
    /// Starts a context for a request for `base_url` with a fresh client id.
    pub fn new(base_url: Url, client_ip: Option<String>) -> Self {
        Self::with_client_id(base_url, client_ip, rand::random())
    }

    pub fn with_client_id(base_url: Url, client_ip: Option<String>, client_id: u32) -> Self {
        Self {
            client_id,
            client_ip,
            base_url,
            title: String::new(),
            page: None,
        }
    }

    pub fn client_id(&self) -> u32 {
        self.client_id
    }

    /// Reports the feed itself.
    pub fn set_feed(&mut self, title: &str) {
        self.title = title.to_string();
        self.page = None;
    }

    /// Reports one entry. An unparseable link falls back to the feed URL.
    pub fn set_entry(&mut self, title: &str, link: Option<&str>) {
        self.title = title.to_string();
        self.page = link.and_then(|l| Url::parse(l).ok());
    }

    fn page(&self) -> &Url {
        self.page.as_ref().unwrap_or(&self.base_url)
    }
}

/// Builds and sends beacons according to [`TrackingConfig`].
#[derive(Debug, Clone)]
pub struct Tracker {
    client: reqwest::Client,
    endpoint: Option<Url>,
    property_id: String,
    hostname: String,
    include_client_ip: bool,
}

impl Tracker {
    /// A tracker is inert when tracking is disabled or the endpoint is not
    /// a valid URL.
    pub fn new(client: reqwest::Client, config: &TrackingConfig) -> Self {
        let endpoint = if config.enabled {
            match Url::parse(&config.endpoint) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(endpoint = %config.endpoint, error = %e, "Invalid tracking endpoint, tracking disabled");
                    None
                }
            }
        } else {
            None
        };

        Self {
            client,
            endpoint,
            property_id: config.property_id.clone(),
            hostname: config.hostname.clone(),
            include_client_ip: config.include_client_ip,
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: None,
            property_id: String::new(),
            hostname: String::new(),
            include_client_ip: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Beacon URL for the context's current page, or `None` when disabled.
    ///
    /// The client IP is only attached when both `include_ip` and the
    /// configuration allow it.
    pub fn beacon_url(&self, ctx: &TrackingContext, include_ip: bool) -> Option<Url> {
        let mut url = self.endpoint.clone()?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("v", "1")
                .append_pair("tid", &self.property_id)
                .append_pair("cid", &ctx.client_id.to_string())
                .append_pair("t", "pageview")
                .append_pair("dh", &self.hostname)
                .append_pair("dp", &url_as_path(ctx.page()))
                .append_pair("dt", &ctx.title);
            if include_ip && self.include_client_ip {
                if let Some(ip) = &ctx.client_ip {
                    query.append_pair("uip", ip);
                }
            }
        }
        Some(url)
    }

    /// Appends an inline `<img>` beacon to `content`.
    pub fn inject(&self, content: &mut String, ctx: &TrackingContext) {
        if let Some(url) = self.beacon_url(ctx, false) {
            content.push_str("<img src=\"");
            content.push_str(&quick_xml::escape::escape(url.as_str()));
            content.push_str("\"/>");
        }
    }

    /// Sends the context's beacon on a detached task.
    ///
    /// Must be called from within a Tokio runtime. The result is logged at
    /// trace level and otherwise discarded.
    pub fn fire_and_forget(&self, ctx: &TrackingContext) {
        let Some(url) = self.beacon_url(ctx, true) else {
            return;
        };
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.get(url).timeout(FETCH_TIMEOUT).send().await {
                Ok(response) => {
                    tracing::trace!(status = %response.status(), "Beacon delivered");
                }
                Err(e) => {
                    tracing::trace!(error = %e, "Beacon dispatch failed");
                }
            }
        });
    }
}

/// Renders `url` as an analytics page path: `/host[:port]/path[?query][#fragment]`,
/// with scheme and credentials stripped.
pub fn url_as_path(url: &Url) -> String {
    match url.host_str() {
        Some(_) => format!("/{}", &url[Position::BeforeHost..]),
        None => url[Position::BeforePath..].to_string(),
    }
}
