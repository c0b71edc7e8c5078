use crate::util::{guard_rejection, NetworkGuard, UrlValidationError};
use std::sync::Arc;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Overall budget for one fetch, redirects and body read included.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Bytes read from a response body before it is truncated.
pub const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024; // 4MB
const MAX_REDIRECTS: usize = 10;

/// Errors that can occur during an outbound fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The target (or a redirect hop) failed URL validation or hit the network guard
    #[error("{0}")]
    Rejected(#[from] UrlValidationError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the fetch timeout
    #[error("Request timed out")]
    Timeout,
    /// Redirect chain longer than the hop limit
    #[error("Too many redirects")]
    TooManyRedirects,
    /// 3xx response without a usable Location header
    #[error("Redirect without a valid Location header")]
    BadRedirect,
}

impl FetchError {
    /// Returns true if the network guard vetoed the request.
    pub fn is_blocked_host(&self) -> bool {
        matches!(
            self,
            FetchError::Rejected(UrlValidationError::BlockedHost { .. })
        )
    }
}

/// A fetched response body.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// URL the body was served from, after redirects
    pub url: Url,
    pub body: Vec<u8>,
    /// True if the body hit the size cap and was cut short
    pub truncated: bool,
}

/// Bounded HTTP GET client.
///
/// Every request, and every redirect hop, passes through the [`NetworkGuard`]
/// before it is sent, and the guard is also the client's DNS resolver, so
/// the addresses connected to are the addresses checked. Redirects are
/// followed here rather than by reqwest so each hop can be checked. Bodies are capped at
/// [`MAX_RESPONSE_SIZE`]; oversized bodies are truncated, not rejected.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    guard: NetworkGuard,
    timeout: Duration,
    max_bytes: usize,
}

impl Fetcher {
    pub fn new(guard: NetworkGuard) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .dns_resolver(Arc::new(guard.clone()))
            .user_agent(concat!("fullfeed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            guard,
            timeout: FETCH_TIMEOUT,
            max_bytes: MAX_RESPONSE_SIZE,
        })
    }

    /// Overrides the timeout and body cap.
    pub fn with_limits(mut self, timeout: Duration, max_bytes: usize) -> Self {
        self.timeout = timeout;
        self.max_bytes = max_bytes;
        self
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetches `url`, following redirects.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Rejected`] - URL invalid or host blocked by the guard
    /// - [`FetchError::Timeout`] - the whole exchange exceeded the timeout
    /// - [`FetchError::HttpStatus`] - final response was not 2xx
    /// - [`FetchError::Network`] - connection, TLS or body stream failure
    pub async fn get(&self, url: &Url) -> Result<Fetched, FetchError> {
        tokio::time::timeout(self.timeout, self.get_following(url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn get_following(&self, url: &Url) -> Result<Fetched, FetchError> {
        let mut current = url.clone();

        for _ in 0..=MAX_REDIRECTS {
            self.guard.check_url(&current).await?;

            let response = self
                .client
                .get(current.as_str())
                .send()
                .await
                .map_err(|e| match guard_rejection(&e) {
                    Some(rejection) => FetchError::Rejected(rejection),
                    None => FetchError::Network(e),
                })?;
            let status = response.status();

            if status.is_redirection() {
                let next = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or(FetchError::BadRedirect)?;
                tracing::debug!(from = %current, to = %next, status = %status, "Following redirect");
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let (body, truncated) = read_capped_bytes(response, self.max_bytes).await?;
            if truncated {
                tracing::debug!(url = %current, limit = self.max_bytes, "Response body truncated at size cap");
            }

            return Ok(Fetched {
                url: current,
                body,
                truncated,
            });
        }

        Err(FetchError::TooManyRedirects)
    }
}

/// Reads at most `limit` bytes of the body. The response is dropped on
/// return, which releases the connection whether or not it was drained.
async fn read_capped_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), FetchError> {
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        let remaining = limit.saturating_sub(bytes.len());
        if chunk.len() > remaining {
            bytes.extend_from_slice(&chunk[..remaining]);
            return Ok((bytes, true));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok((bytes, false))
}
