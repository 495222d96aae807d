//! Two-tier cache hierarchy composing the L1 and L2 tiers with a
//! write-through policy, matching `CacheHierarchy` in the original.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::CacheConfig;

use super::envelope;
use super::key::CacheKey;
use super::l1::L1Cache;
use super::l2::L2Cache;

/// Error produced by the cache hierarchy.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// L1 construction failed (invalid shard count).
    #[error(transparent)]
    L1(#[from] super::l1::L1CacheError),
    /// Envelope encoding or decoding failed.
    #[error(transparent)]
    Envelope(#[from] envelope::EnvelopeError),
    /// The value being cached could not be serialised to JSON.
    #[error("failed to serialise cached value: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Running counters for cache hierarchy hit/miss behaviour, exposed through
/// [`CacheHierarchy::stats`].
#[derive(Debug, Default)]
pub struct CacheMetrics {
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    total_gets: AtomicU64,
    total_sets: AtomicU64,
}

/// Point-in-time snapshot of [`CacheMetrics`], with derived hit ratios.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Current entry count in the L1 tier.
    pub l1_size: usize,
    /// Current entry count in the L2 tier.
    pub l2_size: usize,
    /// `l1_hits / (l1_hits + l1_misses)`, or `0.0` with no L1 lookups yet.
    pub l1_hit_ratio: f64,
    /// `l2_hits / (l2_hits + l2_misses)`, or `0.0` with no L2 lookups yet.
    pub l2_hit_ratio: f64,
    /// `(l1_hits + l2_hits) / total_gets`, or `0.0` with no lookups yet.
    pub overall_hit_ratio: f64,
    /// Total `get` calls observed.
    pub total_gets: u64,
    /// Total `set` calls observed.
    pub total_sets: u64,
}

#[expect(
    clippy::float_arithmetic,
    reason = "hit-ratio reporting is diagnostic, not control flow; precision loss is immaterial"
)]
fn ratio(hits: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Two-tier cache: a fast in-memory L1 backed by a TTL-bearing L2. Reads
/// check L1 first, promote L2 hits into L1, and writes go through both
/// tiers so neither can observe a value the other doesn't eventually see.
pub struct CacheHierarchy {
    l1: L1Cache,
    l2: L2Cache,
    config: CacheConfig,
    metrics: CacheMetrics,
}

impl CacheHierarchy {
    /// Construct a hierarchy from configuration, sizing and wiring both
    /// tiers and starting the L2 background sweeper.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let l1 = L1Cache::new(config.l1_max_size, config.l1_num_shards)?;
        let l2 = L2Cache::new(config.l2_ttl, config.l2_cleanup_interval);
        Ok(Self {
            l1,
            l2,
            config,
            metrics: CacheMetrics::default(),
        })
    }

    fn prefixed(&self, key: &CacheKey) -> CacheKey {
        match &self.config.key_prefix {
            Some(prefix) => key.with_prefix(prefix),
            None => key.clone(),
        }
    }

    fn wrap(&self, value: &Value) -> Result<Value, CacheError> {
        if self.config.envelope_enabled {
            Ok(envelope::encode(value)?)
        } else {
            Ok(value.clone())
        }
    }

    fn unwrap(&self, value: Value) -> Result<Value, CacheError> {
        if self.config.envelope_enabled && envelope::is_envelope(&value) {
            Ok(envelope::decode(&value)?)
        } else {
            Ok(value)
        }
    }

    /// Fetch a value, trying L1 then L2. An L2 hit is promoted back into
    /// L1 so the next lookup for the same key is served from memory.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        let prefixed = self.prefixed(key);
        self.metrics.total_gets.fetch_add(1, Ordering::Relaxed);

        if let Some(raw) = self.l1.get(prefixed.as_str()).await {
            self.metrics.l1_hits.fetch_add(1, Ordering::Relaxed);
            let value = self.unwrap(raw)?;
            return Ok(serde_json::from_value(value).ok());
        }
        self.metrics.l1_misses.fetch_add(1, Ordering::Relaxed);

        if let Some(raw) = self.l2.get(prefixed.as_str()).await {
            self.metrics.l2_hits.fetch_add(1, Ordering::Relaxed);
            self.l1.set(prefixed.as_str().to_string(), raw.clone()).await;
            let value = self.unwrap(raw)?;
            return Ok(serde_json::from_value(value).ok());
        }
        self.metrics.l2_misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// Write a value through both tiers, applying an optional per-call TTL
    /// override on the L2 tier.
    pub async fn set<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let prefixed = self.prefixed(key);
        self.metrics.total_sets.fetch_add(1, Ordering::Relaxed);

        let json = serde_json::to_value(value).map_err(CacheError::Serialize)?;
        let wrapped = self.wrap(&json)?;

        self.l2
            .set(prefixed.as_str().to_string(), wrapped.clone(), ttl)
            .await;
        self.l1.set(prefixed.as_str().to_string(), wrapped).await;
        Ok(())
    }

    /// Remove a key from both tiers. Returns `true` if it was present in
    /// either.
    pub async fn delete(&self, key: &CacheKey) -> bool {
        let prefixed = self.prefixed(key);
        let l1 = self.l1.delete(prefixed.as_str()).await;
        let l2 = self.l2.delete(prefixed.as_str()).await;
        l1 || l2
    }

    /// Clear both tiers.
    pub async fn clear(&self) {
        self.l1.clear().await;
        self.l2.clear().await;
    }

    /// Stop the L2 background sweeper. Call during graceful shutdown.
    pub async fn stop(&self) {
        self.l2.stop().await;
    }

    /// Snapshot current sizes and derived hit ratios.
    pub async fn stats(&self) -> CacheStats {
        let l1_hits = self.metrics.l1_hits.load(Ordering::Relaxed);
        let l1_misses = self.metrics.l1_misses.load(Ordering::Relaxed);
        let l2_hits = self.metrics.l2_hits.load(Ordering::Relaxed);
        let l2_misses = self.metrics.l2_misses.load(Ordering::Relaxed);
        let total_gets = self.metrics.total_gets.load(Ordering::Relaxed);
        CacheStats {
            l1_size: self.l1.size().await,
            l2_size: self.l2.size().await,
            l1_hit_ratio: ratio(l1_hits, l1_hits + l1_misses),
            l2_hit_ratio: ratio(l2_hits, l2_hits + l2_misses),
            overall_hit_ratio: ratio(l1_hits + l2_hits, total_gets),
            total_gets,
            total_sets: self.metrics.total_sets.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn config(envelope_enabled: bool, prefix: Option<&str>) -> CacheConfig {
        CacheConfig {
            l1_max_size: 10,
            l1_num_shards: 1,
            l2_ttl: Duration::from_secs(60),
            l2_cleanup_interval: Duration::from_secs(300),
            key_prefix: prefix.map(str::to_string),
            envelope_enabled,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips_through_l1() {
        let cache = CacheHierarchy::new(config(false, None)).expect("valid config");
        let key = CacheKey::new("job:1").expect("valid key");
        cache.set(&key, &"value", None).await.expect("set ok");
        let got: Option<String> = cache.get(&key).await.expect("get ok");
        assert_eq!(got, Some("value".to_string()));
        cache.stop().await;
    }

    #[tokio::test]
    async fn l2_hit_is_promoted_into_l1() {
        let cache = CacheHierarchy::new(config(false, None)).expect("valid config");
        let key = CacheKey::new("job:1").expect("valid key");
        cache.set(&key, &42u32, None).await.expect("set ok");
        // Remove from L1 directly to force a pure L2 hit on the next get.
        cache.l1.delete("job:1").await;

        let got: Option<u32> = cache.get(&key).await.expect("get ok");
        assert_eq!(got, Some(42));
        assert!(cache.l1.get("job:1").await.is_some());
        cache.stop().await;
    }

    #[tokio::test]
    async fn envelope_round_trips_when_enabled() {
        let cache = CacheHierarchy::new(config(true, None)).expect("valid config");
        let key = CacheKey::new("job:1").expect("valid key");
        cache.set(&key, &"secret-ish", None).await.expect("set ok");
        let got: Option<String> = cache.get(&key).await.expect("get ok");
        assert_eq!(got, Some("secret-ish".to_string()));
        cache.stop().await;
    }

    #[tokio::test]
    async fn key_prefix_is_applied_unconditionally() {
        let cache = CacheHierarchy::new(config(false, Some("gateway:"))).expect("valid config");
        let key = CacheKey::new("job:1").expect("valid key");
        cache.set(&key, &1u32, None).await.expect("set ok");
        assert!(cache.l1.get("gateway:job:1").await.is_some());
        cache.stop().await;
    }

    #[tokio::test]
    async fn delete_removes_from_both_tiers() {
        let cache = CacheHierarchy::new(config(false, None)).expect("valid config");
        let key = CacheKey::new("job:1").expect("valid key");
        cache.set(&key, &1u32, None).await.expect("set ok");
        assert!(cache.delete(&key).await);
        let got: Option<u32> = cache.get(&key).await.expect("get ok");
        assert_eq!(got, None);
        cache.stop().await;
    }

    #[tokio::test]
    async fn stats_reflect_hits_and_misses() {
        let cache = CacheHierarchy::new(config(false, None)).expect("valid config");
        let key = CacheKey::new("job:1").expect("valid key");
        let _: Option<u32> = cache.get(&key).await.expect("get ok"); // miss
        cache.set(&key, &1u32, None).await.expect("set ok");
        let _: Option<u32> = cache.get(&key).await.expect("get ok"); // l1 hit

        let stats = cache.stats().await;
        assert_eq!(stats.total_gets, 2);
        assert_eq!(stats.total_sets, 1);
        assert!(stats.l1_hit_ratio > 0.0);
        cache.stop().await;
    }
}
