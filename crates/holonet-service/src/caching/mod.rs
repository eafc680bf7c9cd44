//! # Holonet caching infrastructure
//!
//! Every upstream resource Holonet touches goes through this module. Upstream APIs are slow and
//! rate limited, so results are cached aggressively in two layers.
//!
//! ## Cache Layers
//!
//! - An in-memory layer, local to the process. Entries never expire, the first value stored
//!   under a key is kept for the lifetime of the process. The layer is bounded by
//!   [`CacheConfigs::in_memory_capacity`](crate::config::CacheConfigs::in_memory_capacity), least
//!   recently used entries are evicted once it is full.
//! - A shared layer, backed by Redis, which is shared between Holonet instances. Entries are JSON
//!   strings written with a time-to-live.
//!
//! A cache request goes through the following steps:
//! - First, it goes through the in-memory layer.
//! - On miss, it connects to the shared cache. Failing to connect fails the request.
//! - It then tries the shared cache. A corrupt entry is treated like a miss.
//! - On miss, it finally fetches a fresh item from the upstream API.
//! - The fresh item is written to the shared cache and stored in the in-memory layer. Failing to
//!   write to the shared cache is not an error.
//!
//! Batch lookups go through [`Cacher::parallel_cached_get`], which bounds the number of
//! concurrent lookups with a semaphore.
//!
//! The OData flight data is cached through [`odata`], which talks to the shared cache directly
//! and checks validity by the timestamp stored alongside the response.
//!
//! ### Metrics
//!
//! - `caches.access`: All accesses.
//! - `caches.memory.hit`: Accesses served by the in-memory layer.
//! - `shared_cache.fetch`: Accesses to the shared cache, tagged by `hit` and `status`.
//! - `caches.computation`: Actual upstream fetches, not served by any of the caching layers.

mod cache_error;
mod cache_key;
mod cacher;
mod memory;
pub mod odata;
mod shared_cache;

pub use cache_error::FetchError;
pub use cache_key::{CacheKey, ItemKind, last_path_segment};
pub use cacher::Cacher;
pub use memory::{InMemoryCache, new_in_memory_cache};
pub use odata::ODataCache;
pub use shared_cache::config::{SharedCacheBackendConfig, SharedCacheConfig};
pub use shared_cache::{MemoryStore, SharedCacheConnection, SharedCacheService};
