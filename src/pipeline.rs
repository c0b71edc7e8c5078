//! Fetch, detect, rewrite, serialize.
//!
//! The fetched body is tried as RSS, then Atom, then as a landing page whose
//! feed link becomes a redirect. For a feed, every entry with a link is
//! resolved to its full article; entries whose resolution yields nothing are
//! left exactly as they were.

use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use url::Url;

use crate::content::ArticleResolver;
use crate::feed::{find_feed_link, Entry, FeedDocument, FetchError, Fetcher, FormatError};
use crate::feed::FEED_CONTENT_TYPE;
use crate::storage::ArticleRecord;
use crate::tracking::{Tracker, TrackingContext};

/// Article resolutions in flight per request.
pub const DEFAULT_CONCURRENCY: usize = 8;

const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Guard veto, network failure, timeout or non-2xx status
    #[error("{0}")]
    Fetch(#[from] FetchError),
    /// Neither RSS, Atom, nor a landing page with a feed link
    #[error("Not a feed: no RSS or Atom document and no feed link found")]
    NotAFeed,
    #[error("Failed to write feed: {0}")]
    Serialize(#[from] FormatError),
}

impl PipelineError {
    pub fn is_blocked_host(&self) -> bool {
        matches!(self, PipelineError::Fetch(e) if e.is_blocked_host())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Copy extracted titles onto entries.
    pub propagate_title: bool,
    pub concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            propagate_title: true,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// One incoming feed request.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub url: Url,
    /// Requesting client's address, reported with dispatched beacons.
    pub client_ip: Option<String>,
}

impl FeedRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client_ip: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Rewritten feed document.
    Feed {
        body: String,
        content_type: &'static str,
    },
    /// The URL was a landing page advertising this feed.
    Redirect(Url),
}

/// The feed-rewriting pipeline.
///
/// Holds only shared, read-only collaborators, so one instance serves all
/// requests concurrently.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Fetcher,
    resolver: ArticleResolver,
    tracker: Tracker,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        fetcher: Fetcher,
        resolver: ArticleResolver,
        tracker: Tracker,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            resolver,
            tracker,
            options,
        }
    }

    /// Fetches `request.url` and processes the body.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Fetch`] - guard veto or fetch failure
    /// - [`PipelineError::NotAFeed`] - body is no feed and links to none
    /// - [`PipelineError::Serialize`] - rewritten document could not be written
    pub async fn process(&self, request: &FeedRequest) -> Result<Outcome, PipelineError> {
        let fetched = self.fetcher.get(&request.url).await?;
        if fetched.truncated {
            tracing::debug!(url = %request.url, "Processing truncated feed body");
        }
        self.process_bytes(request, &fetched.body).await
    }

    /// Processes an already-fetched body as if it came from `request.url`.
    pub async fn process_bytes(
        &self,
        request: &FeedRequest,
        body: &[u8],
    ) -> Result<Outcome, PipelineError> {
        let mut doc = match FeedDocument::parse(body) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "Not a feed, checking for landing page");
                let html = String::from_utf8_lossy(body);
                return match find_feed_link(&request.url, &html) {
                    Some(feed_url) => {
                        tracing::info!(url = %request.url, feed = %feed_url, "Landing page links to feed");
                        Ok(Outcome::Redirect(feed_url))
                    }
                    None => Err(PipelineError::NotAFeed),
                };
            }
        };

        self.rewrite(&mut doc, request).await;

        let body = doc.to_xml()?;
        Ok(Outcome::Feed {
            body,
            content_type: FEED_CONTENT_TYPE,
        })
    }

    async fn rewrite(&self, doc: &mut FeedDocument, request: &FeedRequest) {
        let mut ctx = TrackingContext::new(request.url.clone(), request.client_ip.clone());
        ctx.set_feed(doc.title());
        self.tracker.fire_and_forget(&ctx);

        if let Some(icon) = favicon_url(&request.url) {
            doc.ensure_icon(&icon);
        }

        // Feeds repeat links; each distinct one is resolved once
        let links = doc.entry_links();
        let unique: Vec<String> = {
            let mut seen = HashSet::new();
            links
                .iter()
                .flatten()
                .filter(|link| seen.insert(link.as_str()))
                .cloned()
                .collect()
        };

        let resolver = &self.resolver;
        let resolved: HashMap<String, ArticleRecord> = stream::iter(unique)
            .map(|link| async move {
                let record = resolver.resolve(&link).await;
                record.map(|record| (link, record))
            })
            .buffer_unordered(self.options.concurrency.max(1))
            .filter_map(|resolved| async move { resolved })
            .collect()
            .await;

        let mut rewritten = 0usize;
        for (entry, link) in doc.entries_mut().zip(links) {
            // Nothing resolved: leave the entry exactly as it was
            let Some(record) = link
                .and_then(|link| resolved.get(&link))
                .filter(|r| !r.is_empty())
                .cloned()
            else {
                continue;
            };
            apply_record(entry, record, self.options.propagate_title);

            ctx.set_entry(entry.title(), entry.link());
            self.tracker.inject(entry.content_mut(), &ctx);
            self.tracker.fire_and_forget(&ctx);
            rewritten += 1;
        }

        tracing::info!(
            url = %request.url,
            kind = ?doc.kind(),
            entries = doc.entry_count(),
            rewritten,
            "Rewrote feed"
        );
    }
}

/// Copies the non-empty fields of `record` onto `entry`.
fn apply_record(entry: &mut dyn Entry, record: ArticleRecord, propagate_title: bool) {
    if propagate_title && !record.title.is_empty() {
        entry.set_title(record.title);
    }
    if !record.final_url.is_empty() {
        entry.set_link(record.final_url);
    }
    if !record.content.is_empty() {
        entry.set_content(record.content);
    }
}

/// Icon service URL for the feed's host.
fn favicon_url(feed_url: &Url) -> Option<String> {
    let host = feed_url.host_str()?;
    let mut url = Url::parse(FAVICON_SERVICE).ok()?;
    url.query_pairs_mut()
        .append_pair("domain", host)
        .append_pair("alt", "feed");
    Some(url.into())
}
