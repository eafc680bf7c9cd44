use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::download::{Fetch, Headers};

use super::{CacheKey, FetchError, InMemoryCache, ItemKind, SharedCacheService};

/// Resolves upstream resources through the in-memory cache, the shared cache, and finally the
/// upstream API.
///
/// Cloning is cheap, all clones share the same in-memory cache and concurrency limit.
#[derive(Clone)]
pub struct Cacher {
    memory: InMemoryCache,
    shared_cache: SharedCacheService,
    fetcher: Arc<dyn Fetch>,
    /// Bounds the number of concurrent lookups in [`parallel_cached_get`](Self::parallel_cached_get).
    gate: Arc<Semaphore>,
    default_ttl: Duration,
}

impl std::fmt::Debug for Cacher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cacher")
            .field("in-memory items", &self.memory.entry_count())
            .field("shared_cache", &self.shared_cache)
            .field("fetcher", &self.fetcher)
            .field("available permits", &self.gate.available_permits())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl Cacher {
    pub fn new(
        memory: InMemoryCache,
        shared_cache: SharedCacheService,
        fetcher: Arc<dyn Fetch>,
        max_concurrent_fetches: usize,
        default_ttl: Duration,
    ) -> Self {
        Self {
            memory,
            shared_cache,
            fetcher,
            gate: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
            default_ttl,
        }
    }

    /// The fetcher used on cache misses.
    pub fn fetcher(&self) -> &Arc<dyn Fetch> {
        &self.fetcher
    }

    pub fn shared_cache(&self) -> &SharedCacheService {
        &self.shared_cache
    }

    /// The time-to-live of shared cache entries when none is given explicitly.
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Resolves `key`, fetching `url` if it is in neither cache layer.
    ///
    /// A value found in the shared cache or freshly fetched is stored in the in-memory cache. If
    /// another caller stored a value for the same key in the meantime, that value wins and is
    /// returned instead.
    ///
    /// Fails if the shared cache is unreachable, or if the fetch fails. Failing to read or write
    /// the shared cache is not an error. A `ttl` of `None` uses the
    /// [default](Self::default_ttl).
    #[tracing::instrument(skip_all, fields(key = %key, url = %url))]
    pub async fn cached_get(
        &self,
        key: CacheKey,
        url: &str,
        params: &[(&str, &str)],
        headers: &Headers,
        ttl: Option<Duration>,
    ) -> Result<Value, FetchError> {
        let kind = key.kind();
        metric!(counter("caches.access") += 1, "cache" => kind);

        if let Some(value) = self.memory.get(&key).await {
            metric!(counter("caches.memory.hit") += 1, "cache" => kind);
            return Ok(value);
        }

        let mut conn = self.shared_cache.connect().await?;

        if let Some(raw) = conn.get(&key).await {
            match serde_json::from_str(&raw) {
                Ok(value) => return Ok(self.store_local(key, value).await),
                Err(err) => {
                    let stderr: &dyn std::error::Error = &err;
                    tracing::warn!(stderr, "Corrupted shared cache entry, refetching");
                    metric!(counter("caches.shared_cache.corrupt") += 1, "cache" => kind);
                }
            }
        }

        metric!(counter("caches.computation") += 1, "cache" => kind);
        let value = self.fetcher.fetch(url, params, headers).await?;

        let ttl = ttl.unwrap_or(self.default_ttl);
        conn.set(&key, &value.to_string(), ttl).await;

        Ok(self.store_local(key, value).await)
    }

    /// Resolves every URL in `urls` through [`cached_get`](Self::cached_get).
    ///
    /// The key of each URL is its last path segment under `kind`, see
    /// [`CacheKey::item`]. All lookups are started at once, but only as many as configured by
    /// `max_concurrent_fetches` run at the same time. The results are in completion order.
    ///
    /// Every lookup runs to completion. If any of them failed, the first failure is returned.
    pub async fn parallel_cached_get(
        &self,
        kind: ItemKind,
        urls: &[String],
        headers: &Headers,
        ttl: Option<Duration>,
    ) -> Result<Vec<Value>, FetchError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut lookups: FuturesUnordered<_> = urls
            .iter()
            .map(|url| {
                let key = CacheKey::item(kind, url);
                async move {
                    // The gate is never closed.
                    let _permit = self.gate.acquire().await.ok();
                    self.cached_get(key, url, &[], headers, ttl).await
                }
            })
            .collect();

        let mut results = Vec::with_capacity(urls.len());
        let mut first_error = None;
        while let Some(result) = lookups.next().await {
            match result {
                Ok(value) => results.push(value),
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(err) => {
                    let stderr: &dyn std::error::Error = &err;
                    tracing::debug!(stderr, "Additional batch lookup failure");
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }

    async fn store_local(&self, key: CacheKey, value: Value) -> Value {
        self.memory.entry(key).or_insert(value).await.into_value()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use crate::caching::{MemoryStore, new_in_memory_cache};
    use crate::download::testutils::MockFetcher;

    use super::*;

    const TTL: Option<Duration> = Some(Duration::from_secs(3600));

    fn cacher(
        fetcher: Arc<MockFetcher>,
        store: Arc<MemoryStore>,
        max_concurrent_fetches: usize,
    ) -> Cacher {
        Cacher::new(
            new_in_memory_cache(100),
            SharedCacheService::in_memory(store),
            fetcher,
            max_concurrent_fetches,
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_local_hit_is_idempotent() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://swapi.dev/api/species/1/", json!({"name": "Human"}));
        let store = MemoryStore::new();
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        let key = CacheKey::item(ItemKind::Species, "https://swapi.dev/api/species/1/");
        let headers = Headers::new();
        let first = cacher
            .cached_get(key.clone(), "https://swapi.dev/api/species/1/", &[], &headers, TTL)
            .await
            .unwrap();
        let second = cacher
            .cached_get(key, "https://swapi.dev/api/species/1/", &[], &headers, TTL)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.calls(), 1);
        // the second lookup never touches the shared cache
        assert_eq!(store.reads(), 1);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_shared_hit_skips_fetch() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        let store = MemoryStore::new();
        store.insert_raw(
            "species_3",
            r#"{"name":"Wookie"}"#,
            Duration::from_secs(60),
        );
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        let value = cacher
            .cached_get(
                CacheKey::item(ItemKind::Species, "https://swapi.dev/api/species/3/"),
                "https://swapi.dev/api/species/3/",
                &[],
                &Headers::new(),
                TTL,
            )
            .await
            .unwrap();

        assert_eq!(value, json!({"name": "Wookie"}));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_refetched() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://swapi.dev/api/films/1/", json!({"title": "A New Hope"}));
        let store = MemoryStore::new();
        store.insert_raw("films_1", "{not json", Duration::from_secs(60));
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        let value = cacher
            .cached_get(
                CacheKey::item(ItemKind::Films, "https://swapi.dev/api/films/1/"),
                "https://swapi.dev/api/films/1/",
                &[],
                &Headers::new(),
                TTL,
            )
            .await
            .unwrap();

        assert_eq!(value, json!({"title": "A New Hope"}));
        assert_eq!(fetcher.calls(), 1);
        let stored: Value = serde_json::from_str(&store.get_raw("films_1").unwrap()).unwrap();
        assert_eq!(stored, value);
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://swapi.dev/api/films/1/", json!({}));
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let cacher = cacher(fetcher.clone(), store, 5);

        let err = cacher
            .cached_get(
                CacheKey::item(ItemKind::Films, "https://swapi.dev/api/films/1/"),
                "https://swapi.dev/api/films/1/",
                &[],
                &Headers::new(),
                TTL,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::CacheConnect(_)));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_still_returns() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://swapi.dev/api/films/2/", json!({"title": "Empire"}));
        let store = MemoryStore::new();
        store.set_reject_writes(true);
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        let key = CacheKey::item(ItemKind::Films, "https://swapi.dev/api/films/2/");
        let value = cacher
            .cached_get(key.clone(), "https://swapi.dev/api/films/2/", &[], &Headers::new(), TTL)
            .await
            .unwrap();
        assert_eq!(value, json!({"title": "Empire"}));
        assert_eq!(store.get_raw("films_2"), None);

        // still served from memory afterwards
        cacher
            .cached_get(key, "https://swapi.dev/api/films/2/", &[], &Headers::new(), TTL)
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_cached() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.fail("https://swapi.dev/api/films/9/", 500);
        let store = MemoryStore::new();
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        for _ in 0..2 {
            let err = cacher
                .cached_get(
                    CacheKey::item(ItemKind::Films, "https://swapi.dev/api/films/9/"),
                    "https://swapi.dev/api/films/9/",
                    &[],
                    &Headers::new(),
                    TTL,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
        }
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn test_admission_bound() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::with_delay(Duration::from_millis(10)));
        let urls: Vec<String> = (0..20)
            .map(|i| format!("https://swapi.dev/api/species/{i}/"))
            .collect();
        for (i, url) in urls.iter().enumerate() {
            fetcher.respond(url, json!({ "id": i }));
        }
        let cacher = cacher(fetcher.clone(), MemoryStore::new(), 5);

        let results = cacher
            .parallel_cached_get(ItemKind::Species, &urls, &Headers::new(), TTL)
            .await
            .unwrap();

        assert_eq!(results.len(), 20);
        assert_eq!(fetcher.calls(), 20);
        assert!(fetcher.max_in_flight() <= 5, "{}", fetcher.max_in_flight());
        assert!(fetcher.max_in_flight() > 1, "lookups did not overlap");
    }

    #[tokio::test]
    async fn test_unordered_completeness() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        let urls: Vec<String> = ["1", "2", "3", "4"]
            .iter()
            .map(|id| format!("https://swapi.dev/api/films/{id}/"))
            .collect();
        for url in &urls {
            fetcher.respond(url, json!({ "url": url }));
        }
        let store = MemoryStore::new();
        let cacher = cacher(fetcher.clone(), store.clone(), 2);

        let results = cacher
            .parallel_cached_get(ItemKind::Films, &urls, &Headers::new(), TTL)
            .await
            .unwrap();

        let got: HashSet<&str> = results.iter().filter_map(|v| v["url"].as_str()).collect();
        let expected: HashSet<&str> = urls.iter().map(String::as_str).collect();
        assert_eq!(got, expected);
        for id in ["1", "2", "3", "4"] {
            assert!(store.get_raw(&format!("films_{id}")).is_some());
        }
    }

    #[tokio::test]
    async fn test_batch_failure_drains_all() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        let urls: Vec<String> = ["1", "2", "3"]
            .iter()
            .map(|id| format!("https://swapi.dev/api/species/{id}/"))
            .collect();
        fetcher.respond(&urls[0], json!({"name": "Human"}));
        fetcher.fail(&urls[1], 500);
        fetcher.respond(&urls[2], json!({"name": "Wookie"}));
        let store = MemoryStore::new();
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        let err = cacher
            .parallel_cached_get(ItemKind::Species, &urls, &Headers::new(), TTL)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
        assert_eq!(fetcher.calls(), 3);
        assert!(store.get_raw("species_1").is_some());
        assert!(store.get_raw("species_3").is_some());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        holonet_test::setup();
        let fetcher = Arc::new(MockFetcher::new());
        let store = MemoryStore::new();
        store.set_unreachable(true);
        let cacher = cacher(fetcher.clone(), store.clone(), 5);

        let results = cacher
            .parallel_cached_get(ItemKind::Species, &[], &Headers::new(), TTL)
            .await
            .unwrap();

        assert!(results.is_empty());
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(store.reads(), 0);
    }
}
