use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::backend::CacheBackend;
use super::types::{ArticleRecord, CacheError};

/// TTL for records that carry extracted content (7 days)
pub const SUCCESS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// TTL for empty records after a failed extraction (3 minutes)
pub const FAILURE_TTL: Duration = Duration::from_secs(3 * 60);

const KEY_PREFIX: &str = "fullfeed_";

/// Decompressed records larger than this are treated as corrupt.
const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// Size prefix written by `lz4_flex::compress_prepend_size`.
const SIZE_PREFIX_LEN: usize = 4;

/// Content-addressed store of resolved articles.
///
/// Cloning is cheap; all clones share one backend. With no backend the
/// cache is disabled: `get` always misses and `put` does nothing.
#[derive(Clone, Default)]
pub struct ArticleCache {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl fmt::Debug for ArticleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArticleCache")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl ArticleCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Derives the cache key for an article URL.
    ///
    /// Fixed length regardless of URL length, and safe for any backend's
    /// key alphabet.
    pub fn key_for(url: &str) -> String {
        let hash = Sha256::digest(url.as_bytes());
        format!("{KEY_PREFIX}{:x}", hash)
    }

    /// TTL policy: long for successful extractions, short for failures.
    pub fn ttl_for(record: &ArticleRecord) -> Duration {
        if record.has_content() {
            SUCCESS_TTL
        } else {
            FAILURE_TTL
        }
    }

    /// Looks up a record.
    ///
    /// A stored value that fails to decompress or deserialize is reported
    /// as a miss.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the lookup itself failed.
    pub async fn get(&self, key: &str) -> Result<Option<ArticleRecord>, CacheError> {
        let Some(backend) = &self.backend else {
            return Ok(None);
        };
        let Some(bytes) = backend.get(key).await? else {
            return Ok(None);
        };
        match decode(&bytes) {
            Some(record) => Ok(Some(record)),
            None => {
                tracing::warn!(key = %key, len = bytes.len(), "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Stores `record` under `key` for `ttl`, replacing any previous value.
    pub async fn put(
        &self,
        key: &str,
        record: &ArticleRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        let bytes = encode(record)?;
        backend.set(key, bytes, ttl).await
    }
}

/// JSON, then LZ4 with a little-endian size prefix.
pub(crate) fn encode(record: &ArticleRecord) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(record)?;
    Ok(lz4_flex::compress_prepend_size(&json))
}

pub(crate) fn decode(bytes: &[u8]) -> Option<ArticleRecord> {
    // Read the size prefix ourselves so a corrupt value cannot request
    // an arbitrarily large allocation.
    let prefix: [u8; SIZE_PREFIX_LEN] = bytes.get(..SIZE_PREFIX_LEN)?.try_into().ok()?;
    let size = u32::from_le_bytes(prefix) as usize;
    if size > MAX_RECORD_SIZE {
        return None;
    }
    let json = lz4_flex::decompress(&bytes[SIZE_PREFIX_LEN..], size).ok()?;
    serde_json::from_slice(&json).ok()
}
