use serde_json::Value;

use super::CacheKey;

/// The process-local cache layer.
///
/// Entries do not expire. The first value inserted for a key wins, see
/// [`Cacher::cached_get`](super::Cacher::cached_get).
pub type InMemoryCache = moka::future::Cache<CacheKey, Value>;

/// Creates an in-memory cache holding at most `capacity` entries.
pub fn new_in_memory_cache(capacity: u64) -> InMemoryCache {
    InMemoryCache::builder()
        .name("holonet-in-memory")
        .max_capacity(capacity)
        .eviction_listener(|key, _value, cause| {
            tracing::trace!(%key, ?cause, "evicted from in-memory cache");
        })
        .build()
}
