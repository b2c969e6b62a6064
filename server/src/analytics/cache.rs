//! Read-through cache for analytics reports.
//!
//! Redis-backed when a client is supplied, with an in-process TTL map
//! otherwise. Cache failures are logged and treated as misses; a cache
//! problem must never fail a read.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use fred::prelude::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Default report TTL.
const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct LocalEntry {
    expires_at: Instant,
    payload: String,
}

/// Key/TTL store for serialized analytics reports.
pub struct AnalyticsCache {
    redis: Option<Client>,
    local: DashMap<String, LocalEntry>,
    ttl: Duration,
}

impl AnalyticsCache {
    /// In-process cache with the default 5-minute TTL.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            redis: None,
            local: DashMap::new(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Redis-backed cache with the default 5-minute TTL.
    #[must_use]
    pub fn redis(client: Client) -> Self {
        Self {
            redis: Some(client),
            local: DashMap::new(),
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Fetch and deserialize a cached report.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = if let Some(redis) = &self.redis {
            match redis.get::<Option<String>, _>(key).await {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(key, error = %e, "Analytics cache read failed");
                    None
                }
            }
        } else {
            self.local.get(key).and_then(|entry| {
                if entry.expires_at > Instant::now() {
                    Some(entry.payload.clone())
                } else {
                    None
                }
            })
        };

        payload.and_then(|payload| match serde_json::from_str(&payload) {
            Ok(report) => {
                debug!(key, "Analytics cache hit");
                Some(report)
            }
            Err(e) => {
                warn!(key, error = %e, "Analytics cache entry unparsable");
                None
            }
        })
    }

    /// Serialize and store a report, best-effort.
    pub async fn put<T: Serialize>(&self, key: &str, report: &T) {
        let Ok(payload) = serde_json::to_string(report) else {
            return;
        };

        if let Some(redis) = &self.redis {
            let expiry = Expiration::EX(self.ttl.as_secs() as i64);
            if let Err(e) = redis
                .set::<(), _, _>(key, payload, Some(expiry), None, false)
                .await
            {
                warn!(key, error = %e, "Analytics cache write failed");
            }
        } else {
            self.local.insert(
                key.to_string(),
                LocalEntry {
                    expires_at: Instant::now() + self.ttl,
                    payload,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_round_trip() {
        let cache = AnalyticsCache::in_memory();
        cache.put("k", &vec![1.0f64, 2.0]).await;

        let hit: Option<Vec<f64>> = cache.get("k").await;
        assert_eq!(hit, Some(vec![1.0, 2.0]));
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = AnalyticsCache::in_memory().with_ttl(Duration::ZERO);
        cache.put("k", &42u32).await;

        let hit: Option<u32> = cache.get("k").await;
        assert_eq!(hit, None);
    }

    #[tokio::test]
    async fn type_mismatch_is_a_miss() {
        let cache = AnalyticsCache::in_memory();
        cache.put("k", &"text").await;

        let hit: Option<Vec<u64>> = cache.get("k").await;
        assert_eq!(hit, None);
    }
}
