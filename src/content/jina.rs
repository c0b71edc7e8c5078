use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{ContentError, Extractor};
use crate::feed::FETCH_TIMEOUT;
use crate::storage::ArticleRecord;
use crate::util::validate_url;

pub const DEFAULT_JINA_BASE_URL: &str = "https://r.jina.ai";

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Reader API response envelope (`Accept: application/json`).
#[derive(Debug, Deserialize)]
struct ReaderResponse {
    data: ReaderData,
}

#[derive(Debug, Default, Deserialize)]
struct ReaderData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Extraction delegated to the jina.ai Reader service.
///
/// The service fetches the article itself, so only the configured base URL
/// is contacted from here.
#[derive(Debug, Clone)]
pub struct JinaExtractor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl JinaExtractor {
    /// Creates an extractor against `base_url` (default [`DEFAULT_JINA_BASE_URL`]).
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::InsecureBaseUrl`] if `base_url` is plain HTTP
    /// to anything other than localhost.
    pub fn new(
        client: reqwest::Client,
        base_url: Option<&str>,
        api_key: Option<SecretString>,
    ) -> Result<Self, ContentError> {
        let base = base_url
            .unwrap_or(DEFAULT_JINA_BASE_URL)
            .trim_end_matches('/');

        // SEC-002: Enforce HTTPS for base URL to prevent API key exposure
        // Allow HTTP only for localhost/127.0.0.1 (testing purposes)
        if !base.starts_with("https://") {
            let is_localhost =
                base.starts_with("http://127.0.0.1") || base.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base, "Rejecting non-HTTPS base URL (HTTPS required except for localhost)");
                return Err(ContentError::InsecureBaseUrl);
            }
            tracing::warn!(base_url = %base, "Using non-HTTPS Jina base URL (localhost only)");
        }

        if base_url.is_some() {
            tracing::info!(base_url = %base, "Using custom Jina API base URL");
        }

        Ok(Self {
            client,
            base_url: base.to_string(),
            api_key,
            timeout: FETCH_TIMEOUT,
        })
    }

    fn is_official(&self) -> bool {
        self.base_url == "https://r.jina.ai" || self.base_url == "https://api.jina.ai"
    }
}

#[async_trait]
impl Extractor for JinaExtractor {
    async fn extract(&self, url: &Url) -> Result<ArticleRecord, ContentError> {
        let parsed_url = validate_url(url.as_str()).map_err(|_| ContentError::InvalidUrl)?;
        let reader_url = format!("{}/{}", self.base_url, parsed_url.as_str());

        let mut request = self
            .client
            .get(&reader_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("X-Return-Format", "html");

        // SEC-002: Only send API key to official Jina domain to prevent credential leakage
        if let Some(key) = &self.api_key {
            if self.is_official() {
                tracing::trace!("Jina API authentication configured");
                request =
                    request.header("Authorization", format!("Bearer {}", key.expose_secret()));
            } else {
                tracing::debug!("Skipping API key for non-official Jina URL (custom base_url in use)");
            }
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ContentError::Timeout)??;

        if !response.status().is_success() {
            return Err(ContentError::HttpStatus(response.status().as_u16()));
        }

        let body = tokio::time::timeout(
            self.timeout,
            read_limited_text(response, MAX_CONTENT_SIZE),
        )
        .await
        .map_err(|_| ContentError::Timeout)??;

        let envelope: ReaderResponse =
            serde_json::from_str(&body).map_err(|e| ContentError::Decode(e.to_string()))?;
        let data = envelope.data;

        Ok(ArticleRecord {
            title: data.title.trim().to_string(),
            final_url: data.url.trim().to_string(),
            content: data.content.trim().to_string(),
        })
    }
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        // SEC-003: Use saturating_add to prevent integer overflow in size check
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}
