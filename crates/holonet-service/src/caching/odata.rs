//! A single-key cache for OData flight data.
//!
//! Entries are stored in the shared cache together with the time they were written, and are
//! only served while they are younger than the requested time-to-live. This is independent of
//! the expiry of the shared cache entry itself, and bypasses the in-memory cache.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use serde_json::{Value, json};

use super::{CacheKey, FetchError, SharedCacheService};

#[derive(Debug, Deserialize)]
struct TimestampedResponse {
    /// Seconds since the Unix epoch. Entries without one never expire.
    #[serde(default)]
    timestamp: Option<f64>,
    response: Value,
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[derive(Debug, Clone)]
pub struct ODataCache {
    shared_cache: SharedCacheService,
}

impl ODataCache {
    pub fn new(shared_cache: SharedCacheService) -> Self {
        Self { shared_cache }
    }

    /// Stores `response` for `user_id`, stamped with the current time.
    ///
    /// Only failing to connect is an error, write failures are logged.
    pub async fn cache_put(
        &self,
        user_id: &str,
        response: Value,
        ttl: Duration,
    ) -> Result<(), FetchError> {
        let raw = json!({ "timestamp": now(), "response": response }).to_string();

        let mut conn = self.shared_cache.connect().await?;
        conn.set(&CacheKey::odata(user_id), &raw, ttl).await;
        Ok(())
    }

    /// Returns the response stored for `user_id` if it is at most `ttl` old.
    ///
    /// Entries that fail to decode are treated as absent. Entries without a timestamp are
    /// returned regardless of their age.
    pub async fn cache_get(&self, user_id: &str, ttl: Duration) -> Result<Option<Value>, FetchError> {
        let mut conn = self.shared_cache.connect().await?;
        let Some(raw) = conn.get(&CacheKey::odata(user_id)).await else {
            return Ok(None);
        };

        let entry: TimestampedResponse = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                let stderr: &dyn std::error::Error = &err;
                tracing::warn!(stderr, user_id, "Corrupted OData cache entry, ignoring");
                return Ok(None);
            }
        };

        let written = entry.timestamp.filter(|timestamp| *timestamp > 0.0);
        if written.is_some_and(|written| now() - written > ttl.as_secs_f64()) {
            tracing::debug!(user_id, "OData cache entry is stale");
            return Ok(None);
        }
        Ok(Some(entry.response))
    }
}
