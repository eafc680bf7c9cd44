use std::sync::Arc;

use holonet_service::caching::{MemoryStore, SharedCacheService};
use holonet_service::config::{Config, UpstreamConfig};
use holonet_service::download::{FetchTimeouts, HttpFetcher, create_client};
use holonet_service::services::SharedServices;
use holonet_test::Upstream;

/// A config pointing all upstream APIs at `upstream`.
pub fn config(upstream: &Upstream, use_prod: bool) -> Config {
    let base_url = upstream.base_url();
    Config {
        upstream: UpstreamConfig {
            dev_base_url: base_url.clone(),
            prod_base_url: base_url.clone(),
            api_token: Some("test-token".into()),
            use_prod,
            odata_base_url: format!("{base_url}/odata"),
        },
        ..Config::default()
    }
}

/// Creates services talking to real HTTP upstreams, with an in-memory shared cache.
pub fn setup_services(config: &Config) -> (SharedServices, Arc<MemoryStore>) {
    holonet_test::setup();

    let client = create_client(&FetchTimeouts::from_config(config)).unwrap();
    let store = MemoryStore::new();
    let services = SharedServices::with_components(
        config,
        Arc::new(HttpFetcher::new(client)),
        SharedCacheService::in_memory(store.clone()),
    );
    (services, store)
}
