//! A key-value cache shared between different Holonet instances.
//!
//! Upstream APIs are rate limited, and a fresh instance would otherwise have to re-fetch
//! everything. The shared cache sits between the in-memory layer and the upstream API.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::{CacheKey, FetchError};

pub mod config;

use config::{SharedCacheBackendConfig, SharedCacheConfig};

/// A shared cache living inside the current process.
///
/// This backs the `memory` shared cache backend. Besides storing entries with a time-to-live,
/// it can simulate an unreachable server or failing writes, and it counts reads and writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    unreachable: AtomicBool,
    reject_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    /// Makes every subsequent connection attempt fail.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Relaxed);
    }

    /// Makes every subsequent write fail.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    /// Stores `raw` under `key` without going through a connection.
    pub fn insert_raw(&self, key: &str, raw: &str, ttl: Duration) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), (raw.to_owned(), Instant::now() + ttl));
    }

    /// Returns the live entry under `key` without counting it as a read.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(raw, _)| raw.clone())
    }

    /// The number of reads served through connections.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The number of successful writes through connections.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn read(&self, key: &str) -> Option<String> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.get_raw(key)
    }

    fn write(&self, key: &str, raw: &str, ttl: Duration) -> anyhow::Result<()> {
        if self.reject_writes.load(Ordering::Relaxed) {
            anyhow::bail!("writes are rejected");
        }
        self.insert_raw(key, raw, ttl);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug)]
enum SharedCacheBackend {
    Redis(redis::Client),
    Memory(Arc<MemoryStore>),
}

impl SharedCacheBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
        }
    }
}

/// A shared cache service.
///
/// Every operation opens its own connection through [`connect`](Self::connect).
#[derive(Debug, Clone)]
pub struct SharedCacheService {
    backend: Arc<SharedCacheBackend>,
    connect_timeout: Duration,
}

impl SharedCacheService {
    /// Creates the service from configuration.
    ///
    /// This does not connect yet, it only validates the configuration.
    pub fn new(config: SharedCacheConfig) -> anyhow::Result<Self> {
        let backend = match config.backend {
            SharedCacheBackendConfig::Redis { url } => {
                let client = redis::Client::open(url.as_str())
                    .with_context(|| format!("invalid redis URL `{url}`"))?;
                SharedCacheBackend::Redis(client)
            }
            SharedCacheBackendConfig::Memory => SharedCacheBackend::Memory(MemoryStore::new()),
        };
        Ok(Self {
            backend: Arc::new(backend),
            connect_timeout: config.connect_timeout,
        })
    }

    /// Creates a service backed by the given in-process `store`.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            backend: Arc::new(SharedCacheBackend::Memory(store)),
            connect_timeout: Duration::from_secs(1),
        }
    }

    /// Returns the name of the backend configured.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Opens a connection to the shared cache.
    ///
    /// Failing to connect, including running into the connect timeout, yields
    /// [`FetchError::CacheConnect`].
    pub async fn connect(&self) -> Result<SharedCacheConnection, FetchError> {
        let inner = match self.backend.as_ref() {
            SharedCacheBackend::Redis(client) => {
                let future = client.get_multiplexed_async_connection();
                match tokio::time::timeout(self.connect_timeout, future).await {
                    Ok(Ok(conn)) => Connection::Redis(conn),
                    Ok(Err(err)) => return Err(self.connect_failed(err)),
                    Err(_) => {
                        let reason = format!("timeout after {:?}", self.connect_timeout);
                        return Err(self.connect_failed(reason));
                    }
                }
            }
            SharedCacheBackend::Memory(store) => {
                if store.unreachable.load(Ordering::Relaxed) {
                    return Err(self.connect_failed("store is unreachable"));
                }
                Connection::Memory(Arc::clone(store))
            }
        };

        Ok(SharedCacheConnection {
            backend_name: self.backend_name(),
            inner,
        })
    }

    fn connect_failed(&self, reason: impl fmt::Display) -> FetchError {
        let reason = reason.to_string();
        let backend_name = self.backend_name();
        tracing::error!(%reason, "Failed to connect to {} shared cache", backend_name);
        metric!(
            counter("shared_cache.connect") += 1,
            "backend" => backend_name,
            "status" => "error",
        );
        FetchError::CacheConnect(reason)
    }
}

enum Connection {
    Redis(MultiplexedConnection),
    Memory(Arc<MemoryStore>),
}

/// An open connection to the shared cache.
///
/// Errors are transparently hidden: a read either yields an entry or it does not, and writes
/// are best-effort.
pub struct SharedCacheConnection {
    backend_name: &'static str,
    inner: Connection,
}

impl fmt::Debug for SharedCacheConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCacheConnection")
            .field("backend", &self.backend_name)
            .finish()
    }
}

impl SharedCacheConnection {
    /// Reads the raw entry stored under `key`.
    #[tracing::instrument(name = "fetch_shared_cache", skip_all, fields(key = %key))]
    pub async fn get(&mut self, key: &CacheKey) -> Option<String> {
        let key = key.to_string();
        let res = match &mut self.inner {
            Connection::Redis(conn) => conn
                .get::<_, Option<String>>(&key)
                .await
                .map_err(anyhow::Error::from),
            Connection::Memory(store) => Ok(store.read(&key)),
        };

        match res {
            Ok(entry) => {
                metric!(
                    counter("shared_cache.fetch") += 1,
                    "backend" => self.backend_name,
                    "hit" => if entry.is_some() { "true" } else { "false" },
                    "status" => "ok",
                );
                entry
            }
            Err(err) => {
                let stderr: &dyn std::error::Error = &*err;
                tracing::error!(stderr, "Error fetching from {} shared cache", self.backend_name);
                metric!(
                    counter("shared_cache.fetch") += 1,
                    "backend" => self.backend_name,
                    "status" => "error",
                );
                None
            }
        }
    }

    /// Writes `raw` under `key`, expiring after `ttl`.
    ///
    /// The `ttl` is rounded down to whole seconds, with a minimum of one second.
    #[tracing::instrument(name = "store_shared_cache", skip_all, fields(key = %key))]
    pub async fn set(&mut self, key: &CacheKey, raw: &str, ttl: Duration) {
        let key = key.to_string();
        let res = match &mut self.inner {
            Connection::Redis(conn) => conn
                .set_ex::<_, _, ()>(&key, raw, ttl.as_secs().max(1))
                .await
                .map_err(anyhow::Error::from),
            Connection::Memory(store) => store.write(&key, raw, ttl),
        };

        match res {
            Ok(()) => {
                metric!(
                    counter("shared_cache.store") += 1,
                    "backend" => self.backend_name,
                    "status" => "ok",
                );
            }
            Err(err) => {
                let stderr: &dyn std::error::Error = &*err;
                tracing::warn!(stderr, "Failed to store in {} shared cache", self.backend_name);
                metric!(
                    counter("shared_cache.store") += 1,
                    "backend" => self.backend_name,
                    "status" => "error",
                );
            }
        }
    }
}
