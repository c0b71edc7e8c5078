use std::sync::Arc;
use url::Url;

use super::Extractor;
use crate::storage::{ArticleCache, ArticleRecord};

/// Cache-fronted article resolution.
///
/// After a miss the cache is always populated, failed extractions included,
/// so a link is extracted at most once per TTL window.
#[derive(Clone)]
pub struct ArticleResolver {
    cache: ArticleCache,
    extractor: Arc<dyn Extractor>,
}

impl ArticleResolver {
    pub fn new(cache: ArticleCache, extractor: Arc<dyn Extractor>) -> Self {
        Self { cache, extractor }
    }

    /// Resolves the article behind `link`.
    ///
    /// Returns `None` for an empty link. Otherwise always returns a record;
    /// an empty record means extraction failed. Cache and extraction errors
    /// are logged and absorbed.
    pub async fn resolve(&self, link: &str) -> Option<ArticleRecord> {
        let link = link.trim();
        if link.is_empty() {
            return None;
        }

        let key = ArticleCache::key_for(link);
        match self.cache.get(&key).await {
            Ok(Some(record)) => {
                tracing::trace!(link = %link, "Article cache hit");
                return Some(record);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Article cache lookup failed, treating as miss");
            }
        }

        let record = match Url::parse(link) {
            Ok(url) => match self.extractor.extract(&url).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::debug!(link = %link, error = %e, "Article extraction failed");
                    ArticleRecord::default()
                }
            },
            Err(e) => {
                tracing::debug!(link = %link, error = %e, "Entry link is not a valid URL");
                ArticleRecord::default()
            }
        };

        let ttl = ArticleCache::ttl_for(&record);
        if let Err(e) = self.cache.put(&key, &record, ttl).await {
            tracing::warn!(link = %link, error = %e, "Failed to store article in cache");
        }

        Some(record)
    }
}
