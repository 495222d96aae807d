//! Sharded in-memory LRU cache tier.
//!
//! Mirrors the original `L1Cache`: a fixed number of independently locked
//! shards, each an LRU map, selected by hashing the key. The `lru` crate
//! plays the role `cachetools.LRUCache` played in the original.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use lru::LruCache;
use serde_json::Value;
use tokio::sync::Mutex;

/// Error returned when constructing an [`L1Cache`] with invalid sizing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum L1CacheError {
    /// `num_shards` must be a positive integer.
    #[error("num_shards must be a positive integer")]
    InvalidShardCount,
}

/// Sharded LRU cache. Each shard is guarded by its own lock, so contention
/// on one key never blocks operations on keys that hash to a different
/// shard.
pub struct L1Cache {
    shards: Vec<Mutex<LruCache<String, Value>>>,
    num_shards: usize,
}

impl L1Cache {
    /// Construct a new L1 cache. When `num_shards` would exceed `max_size`,
    /// it is clamped to `1` so eviction stays deterministic for small
    /// caches, matching the original's behaviour. `num_shards` must be
    /// positive.
    pub fn new(max_size: usize, num_shards: usize) -> Result<Self, L1CacheError> {
        if num_shards == 0 {
            return Err(L1CacheError::InvalidShardCount);
        }
        let num_shards = if max_size > 0 && num_shards > max_size {
            1
        } else {
            num_shards
        };
        let per_shard = (max_size / num_shards).max(1);
        let capacity = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);
        let shards = (0..num_shards)
            .map(|_| Mutex::new(LruCache::new(capacity)))
            .collect();
        Ok(Self { shards, num_shards })
    }

    fn shard_index(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "reducing a 64-bit hash to a shard index modulo a small shard count is a uniform truncation, not a precision bug"
        )]
        let index = (hasher.finish() % self.num_shards as u64) as usize;
        index
    }

    #[expect(
        clippy::indexing_slicing,
        reason = "shard_index always returns an index modulo shards.len(), so it is always in range"
    )]
    fn shard(&self, key: &str) -> &Mutex<LruCache<String, Value>> {
        &self.shards[self.shard_index(key)]
    }

    /// Fetch a value, promoting it to most-recently-used on hit.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut shard = self.shard(key).lock().await;
        shard.get(key).cloned()
    }

    /// Insert or overwrite a value, evicting the least-recently-used entry
    /// in the owning shard if it is at capacity.
    pub async fn set(&self, key: String, value: Value) {
        let mut shard = self.shard(&key).lock().await;
        shard.put(key, value);
    }

    /// Remove a key, returning whether it was present.
    pub async fn delete(&self, key: &str) -> bool {
        let mut shard = self.shard(key).lock().await;
        shard.pop(key).is_some()
    }

    /// Clear every shard.
    pub async fn clear(&self) {
        for shard in &self.shards {
            shard.lock().await.clear();
        }
    }

    /// Total number of entries across all shards.
    pub async fn size(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }
}
