//! Article extraction and resolution.
//!
//! An [`Extractor`] turns an article URL into its title, canonical URL and
//! main-content HTML. The [`ArticleResolver`] puts the article cache in
//! front of whichever extractor is configured.

mod jina;
mod readability;
mod resolver;

pub use jina::{JinaExtractor, DEFAULT_JINA_BASE_URL};
pub use self::readability::ReadabilityExtractor;
pub use resolver::ArticleResolver;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::feed::FetchError;
use crate::storage::ArticleRecord;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Article fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Request timed out")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Malformed extraction response: {0}")]
    Decode(String),
    #[error("Extraction failed: {0}")]
    Extraction(String),
}

/// Opaque article-extraction capability.
///
/// Implementations return whatever they could recover; empty fields in the
/// returned record mean "unknown".
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &Url) -> Result<ArticleRecord, ContentError>;
}
