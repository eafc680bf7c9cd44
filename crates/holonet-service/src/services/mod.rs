//! Provides the Holonet services and a way to initialize them.
//!
//! All services resolve upstream data through one shared [`Cacher`], so they share the
//! in-memory cache, the shared cache and the concurrency limit for batch lookups.
//! [`SharedServices::new`] creates them according to the provided [`Config`].

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::caching::{Cacher, ODataCache, SharedCacheService, new_in_memory_cache};
use crate::config::Config;
use crate::download::{Fetch, FetchTimeouts, HttpFetcher, create_client};

pub mod characters;
pub mod etl;
pub mod flights;

pub use characters::{Character, CharacterService, SearchError};
pub use etl::EtlService;
pub use flights::{Dataset, FlightError, FlightReport, FlightService, LongestFlight};

/// All services, ready to be shared between request handlers.
#[derive(Debug, Clone)]
pub struct SharedServices {
    pub cacher: Cacher,
    pub etl: EtlService,
    pub characters: CharacterService,
    pub flights: FlightService,
}

impl SharedServices {
    /// Creates all services from configuration.
    ///
    /// Nothing connects to the shared cache or an upstream yet.
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_client(&FetchTimeouts::from_config(config))
            .context("failed to create HTTP client")?;
        let fetcher = Arc::new(HttpFetcher::new(client));
        let shared_cache = SharedCacheService::new(config.shared_cache.clone())
            .context("failed to create shared cache")?;

        Ok(Self::with_components(config, fetcher, shared_cache))
    }

    /// Creates all services around the given `fetcher` and `shared_cache`.
    pub fn with_components(
        config: &Config,
        fetcher: Arc<dyn Fetch>,
        shared_cache: SharedCacheService,
    ) -> Self {
        tracing::info!(
            shared_cache = shared_cache.backend_name(),
            use_prod = config.upstream.use_prod,
            "Creating services"
        );

        let cacher = Cacher::new(
            new_in_memory_cache(config.caches.in_memory_capacity),
            shared_cache.clone(),
            fetcher,
            config.max_concurrent_fetches,
            config.default_ttl,
        );

        let etl = EtlService::new(
            cacher.clone(),
            config.upstream.clone(),
            config.max_pages,
            config.backup_dir.clone(),
        );
        let characters = CharacterService::new(cacher.clone(), config.upstream.clone());
        let flights = FlightService::new(
            cacher.clone(),
            ODataCache::new(shared_cache),
            config.upstream.odata_base_url.clone(),
            config.default_ttl,
        );

        Self {
            cacher,
            etl,
            characters,
            flights,
        }
    }
}
