//! Feed acquisition and the RSS/Atom document model.
//!
//! - **Fetching**: bounded, guard-checked HTTP GET with manual redirect following
//! - **Model**: typed RSS 2.0 and Atom 1.0 documents that round-trip through XML
//! - **Discovery**: feed autodiscovery on landing pages
//!
//! # Architecture
//!
//! - [`rss`] / [`atom`] - format-specific structures, serialized with `quick-xml`'s serde support
//! - [`FeedDocument`] - tagged variant over both formats with a shared [`Entry`] view
//! - [`Fetcher`] - HTTP retrieval with a timeout and body size cap
//! - [`find_feed_link`] - landing-page `<link rel="alternate">` scan
//!
//! # Example
//!
//! ```ignore
//! use crate::feed::{FeedDocument, Fetcher};
//!
//! let fetched = fetcher.get(&url).await?;
//! let mut doc = FeedDocument::parse(&fetched.body)?;
//! for entry in doc.entries_mut() {
//!     println!("{:?}", entry.link());
//! }
//! ```

pub mod atom;
mod discovery;
mod document;
mod fetcher;
pub mod rss;

pub use discovery::find_feed_link;
pub use document::{Entry, FeedDocument, FeedKind, FormatError, FEED_CONTENT_TYPE};
pub use fetcher::{FetchError, Fetched, Fetcher, FETCH_TIMEOUT, MAX_RESPONSE_SIZE};
