use holonet_service::caching::{
    CacheKey, Cacher, FetchError, ItemKind, SharedCacheService, new_in_memory_cache,
};
use holonet_service::download::Headers;
use holonet_service::extract::fetch_vehicles_paginated;
use holonet_test::Upstream;
use serde_json::json;

use crate::utils::{config, setup_services};

#[tokio::test]
async fn test_single_page() {
    let upstream = Upstream::new();
    let (services, store) = setup_services(&config(&upstream, false));
    let url = upstream.url("single/vehicles").to_string();

    let data = fetch_vehicles_paginated(&services.cacher, &url, &Headers::new(), None)
        .await
        .unwrap();
    assert_eq!(data.results, vec![json!({"name": "Speeder"})]);
    assert_eq!(upstream.accesses(), 1);

    // the in-memory layer serves the second walk, the shared cache is not consulted
    let reads = store.reads();
    fetch_vehicles_paginated(&services.cacher, &url, &Headers::new(), None)
        .await
        .unwrap();
    assert_eq!(upstream.accesses(), 0);
    assert_eq!(store.reads(), reads);
    assert!(store.get_raw(&CacheKey::page(&url).to_string()).is_some());
}

#[tokio::test]
async fn test_shared_cache_across_instances() {
    let upstream = Upstream::new();
    let config = config(&upstream, false);
    let (first, store) = setup_services(&config);
    let url = upstream.url("vehicles").to_string();

    fetch_vehicles_paginated(&first.cacher, &url, &Headers::new(), None)
        .await
        .unwrap();
    assert_eq!(upstream.accesses(), 2);

    // a second instance sharing the store never reaches the upstream
    let second = Cacher::new(
        new_in_memory_cache(100),
        SharedCacheService::in_memory(store),
        first.cacher.fetcher().clone(),
        5,
        config.default_ttl,
    );
    let data = fetch_vehicles_paginated(&second, &url, &Headers::new(), None)
        .await
        .unwrap();
    assert_eq!(data.results.len(), 4);
    assert_eq!(upstream.accesses(), 0);
}

#[tokio::test]
async fn test_unreachable_shared_cache() {
    let upstream = Upstream::new();
    let (services, store) = setup_services(&config(&upstream, false));
    store.set_unreachable(true);
    let url = upstream.url("single/vehicles").to_string();

    let err = fetch_vehicles_paginated(&services.cacher, &url, &Headers::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::CacheConnect(_)));
    assert_eq!(upstream.accesses(), 0);
}

#[tokio::test]
async fn test_parallel_cached_get() {
    let upstream = Upstream::new();
    let (services, store) = setup_services(&config(&upstream, false));
    let urls: Vec<String> = ["1", "2", "22", "28"]
        .iter()
        .map(|id| upstream.url(&format!("api/species/{id}/")).to_string())
        .collect();

    let species = services
        .cacher
        .parallel_cached_get(ItemKind::Species, &urls, &Headers::new(), None)
        .await
        .unwrap();

    let mut names: Vec<_> = species
        .iter()
        .filter_map(|species| species["name"].as_str())
        .collect();
    names.sort();
    assert_eq!(names, ["Droid", "Human", "Kaleesh", "Zabrak"]);
    assert_eq!(upstream.accesses(), 4);
    assert!(store.get_raw("species_28").is_some());
}
