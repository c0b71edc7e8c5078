use async_trait::async_trait;
use std::io::Cursor;
use url::Url;

use super::{ContentError, Extractor};
use crate::feed::Fetcher;
use crate::storage::ArticleRecord;

/// In-process extraction: fetch the page through the guarded [`Fetcher`],
/// then run the readability scorer over it.
#[derive(Debug, Clone)]
pub struct ReadabilityExtractor {
    fetcher: Fetcher,
}

impl ReadabilityExtractor {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Extractor for ReadabilityExtractor {
    async fn extract(&self, url: &Url) -> Result<ArticleRecord, ContentError> {
        let fetched = self.fetcher.get(url).await?;
        let final_url = fetched.url;

        // Scoring walks the whole DOM; keep it off the async workers.
        let base = final_url.clone();
        let product = tokio::task::spawn_blocking(move || {
            let mut reader = Cursor::new(fetched.body);
            ::readability::extractor::extract(&mut reader, &base)
        })
        .await
        .map_err(|e| ContentError::Extraction(e.to_string()))?
        .map_err(|e| ContentError::Extraction(e.to_string()))?;

        tracing::debug!(
            url = %url,
            final_url = %final_url,
            content_len = product.content.len(),
            "Readability extraction complete"
        );

        Ok(ArticleRecord {
            title: product.title.trim().to_string(),
            final_url: final_url.to_string(),
            content: product.content.trim().to_string(),
        })
    }
}
