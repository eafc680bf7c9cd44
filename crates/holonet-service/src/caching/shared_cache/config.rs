use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The backend to use for the shared cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum SharedCacheBackendConfig {
    /// A Redis server, e.g. `redis://localhost`.
    Redis {
        #[serde(default = "default_redis_url")]
        url: String,
    },
    /// A map inside the current process.
    ///
    /// Nothing is shared with other instances. Used for tests and local development.
    Memory,
}

/// A remote cache that can be shared between holonet instances.
///
/// Any upstream resource not in the in-memory cache is looked up from here before it is
/// fetched from the upstream API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedCacheConfig {
    /// Timeout for establishing a connection to the shared cache.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The backend to use for the shared cache.
    #[serde(flatten)]
    pub backend: SharedCacheBackendConfig,
}

impl Default for SharedCacheConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            backend: SharedCacheBackendConfig::Redis {
                url: default_redis_url(),
            },
        }
    }
}

fn default_redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost".to_owned())
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}
