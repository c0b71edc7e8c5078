use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Cache backend failures.
///
/// Never surfaced to a feed request: the resolver logs these and carries
/// on as if the cache had missed.
#[derive(Debug, Error)]
pub enum CacheError {
    /// `cache_url` is neither `memory` nor a Redis URL
    #[error("Unsupported cache URL '{0}' (expected 'memory' or redis://...)")]
    UnsupportedUrl(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Resolved article content for one entry link.
///
/// Every field may be empty: an empty `title` leaves the entry title alone,
/// an empty `final_url` keeps the original link, and an empty `content`
/// means extraction failed or produced nothing. A record with all three
/// empty is the "absent" record cached after a failed extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: String,
    pub final_url: String,
    pub content: String,
}

impl ArticleRecord {
    /// True when the record carries nothing to apply to an entry.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.final_url.is_empty() && self.content.is_empty()
    }

    /// Whether the record came from a successful extraction.
    pub fn has_content(&self) -> bool {
        !self.content.is_empty()
    }
}
