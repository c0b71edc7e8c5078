mod backend;
mod content_cache;
mod types;

pub use backend::{connect, CacheBackend, MemoryBackend, RedisBackend, DEFAULT_MEMORY_CAPACITY};
pub use content_cache::{ArticleCache, FAILURE_TTL, SUCCESS_TTL};
pub use types::{ArticleRecord, CacheError};
