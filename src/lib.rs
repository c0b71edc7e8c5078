//! Feed-rewriting proxy.
//!
//! Fetches an RSS or Atom feed, replaces each entry's summary with the full
//! article resolved from its link, appends a tracking beacon, and returns the
//! rewritten feed. A landing-page URL is answered with a redirect to the feed
//! it advertises.

pub mod config;
pub mod content;
pub mod feed;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod tracking;
pub mod util;
