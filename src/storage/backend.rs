//! Key/value stores behind the article cache.
//!
//! Both backends store opaque bytes with a per-key TTL. Expiry is enforced
//! by the store itself; callers never see an expired value.

use async_trait::async_trait;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::types::CacheError;

/// Entries kept by the in-process backend before least-recently-used eviction.
pub const DEFAULT_MEMORY_CAPACITY: usize = 4096;

/// A shared, concurrency-safe byte store with TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;
}

/// Opens the backend named by a `cache_url` setting.
///
/// `memory` selects the in-process LRU; `redis://` and `rediss://` URLs
/// connect to Redis.
///
/// # Errors
///
/// Returns [`CacheError::UnsupportedUrl`] for any other value, or
/// [`CacheError::Redis`] if the Redis connection cannot be established.
pub async fn connect(cache_url: &str) -> Result<Arc<dyn CacheBackend>, CacheError> {
    let cache_url = cache_url.trim();
    if cache_url.eq_ignore_ascii_case("memory") {
        tracing::info!(capacity = DEFAULT_MEMORY_CAPACITY, "Using in-memory article cache");
        return Ok(Arc::new(MemoryBackend::new(DEFAULT_MEMORY_CAPACITY)));
    }
    if cache_url.starts_with("redis://") || cache_url.starts_with("rediss://") {
        let backend = RedisBackend::connect(cache_url).await?;
        tracing::info!("Connected to Redis article cache");
        return Ok(Arc::new(backend));
    }
    Err(CacheError::UnsupportedUrl(cache_url.to_string()))
}

// ============================================================================
// In-memory backend
// ============================================================================

struct MemoryEntry {
    expires_at: Instant,
    value: Vec<u8>,
}

/// Bounded in-process store for single-instance deployments and tests.
pub struct MemoryBackend {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        // A poisoned lock only means another request panicked mid-insert;
        // the map itself is still consistent.
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()))
            }
            Some(_) => {}
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        entries.put(
            key.to_string(),
            MemoryEntry {
                expires_at: Instant::now() + ttl,
                value,
            },
        );
        Ok(())
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Networked store shared between proxy instances.
///
/// `ConnectionManager` is a cheap-to-clone multiplexed handle that
/// reconnects on its own, so each call clones it rather than locking.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }
}
