//! The two-tier store the repositories talk to.

use super::{CacheBackend, CacheError, CacheResult, LocalCache, RedisCache};
use crate::config::CacheConfig;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Cache-aside store composed of a local tier in front of a remote tier.
///
/// Reads go local → remote; a remote hit repopulates the local tier with
/// `default_ttl`. Writes go to both tiers, remote first. Deletes clear both.
///
/// Every delete bumps a per-key generation. A reader that loaded a value
/// from durable storage populates through [`CacheStore::set_json_if_current`]
/// with the generation it saw before loading, so a delete that raced with the
/// load cannot be overwritten by the older value.
pub struct CacheStore {
    local: Arc<dyn CacheBackend>,
    remote: Arc<dyn CacheBackend>,
    default_ttl: Duration,
    generations: DashMap<String, u64>,
}

impl CacheStore {
    pub fn new(
        local: Arc<dyn CacheBackend>,
        remote: Arc<dyn CacheBackend>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            local,
            remote,
            default_ttl,
            generations: DashMap::new(),
        }
    }

    /// Build the production store: a swept in-process tier in front of Redis.
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let local = LocalCache::with_sweeper(config.default_ttl, config.sweep_interval);
        let remote = RedisCache::connect(&config.redis_url).await?;
        log::info!(
            "cache ready (default ttl {:?}, sweep every {:?})",
            config.default_ttl,
            config.sweep_interval
        );
        Ok(Self::new(
            Arc::new(local),
            Arc::new(remote),
            config.default_ttl,
        ))
    }

    /// Look `key` up, local tier first.
    ///
    /// Returns an owned copy of the stored bytes. Tier faults are logged and
    /// reported as a miss so the caller falls back to durable storage.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.local.get(key).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(err) => {
                log::warn!("{} cache read failed for '{}': {}", self.local.name(), key, err);
            }
        }

        let value = match self.remote.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("{} cache read failed for '{}': {}", self.remote.name(), key, err);
                return None;
            }
        };

        if let Err(err) = self.local.set(key, &value, self.default_ttl).await {
            log::warn!(
                "failed to repopulate {} cache for '{}': {}",
                self.local.name(),
                key,
                err
            );
        }

        Some(value)
    }

    /// Store `value` under `key` in both tiers.
    ///
    /// On a remote fault the local copy of `key` is evicted as well, so no
    /// tier keeps a value the other tier refused.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        if let Err(err) = self.remote.set(key, value, ttl).await {
            if let Err(evict_err) = self.local.delete(key).await {
                log::warn!(
                    "failed to evict '{}' from {} cache: {}",
                    key,
                    self.local.name(),
                    evict_err
                );
            }
            return Err(err);
        }

        self.local.set(key, value, ttl).await
    }

    /// Invalidation generation of `key`; changes on every [`CacheStore::delete`].
    pub fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    /// Remove `key` from both tiers. Absent keys are not an error.
    pub async fn delete(&self, key: &str) -> CacheResult<()> {
        *self.generations.entry(key.to_string()).or_insert(0) += 1;

        // Local first: a remote fault must not leave this process serving
        // the old value.
        let local = self.local.delete(key).await;
        self.remote.delete(key).await?;
        local
    }

    /// Typed read. A value that no longer deserializes is evicted and
    /// reported as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("discarding undecodable cache entry '{}': {}", key, err);
                if let Err(err) = self.delete(key).await {
                    log::warn!("failed to discard cache entry '{}': {}", key, err);
                }
                None
            }
        }
    }

    /// Typed write.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::SerializeError(e.to_string()))?;
        self.set(key, &bytes, ttl).await
    }

    /// Typed population for a value loaded while `key` was at generation
    /// `seen`. If `key` was deleted since, the entry just written is removed
    /// again and `Ok(false)` is returned.
    pub async fn set_json_if_current<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
        seen: u64,
    ) -> CacheResult<bool> {
        if self.generation(key) != seen {
            return Ok(false);
        }

        self.set_json(key, value, ttl).await?;

        if self.generation(key) != seen {
            log::debug!("'{}' was invalidated while loading; dropping populated entry", key);
            self.delete(key).await?;
            return Ok(false);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalCache;
    use crate::test_support::FlakyBackend;
    use serde::Deserialize;

    fn two_local_tiers() -> (Arc<LocalCache>, Arc<LocalCache>, CacheStore) {
        let local = Arc::new(LocalCache::new(Duration::from_secs(300)));
        let remote = Arc::new(LocalCache::new(Duration::from_secs(300)));
        let store = CacheStore::new(local.clone(), remote.clone(), Duration::from_secs(300));
        (local, remote, store)
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        tags: Vec<String>,
    }

    #[tokio::test]
    async fn test_round_trip_then_expiry() {
        let (_, _, store) = two_local_tiers();

        store
            .set("user_7", b"seven", Duration::from_millis(40))
            .await
            .expect("set succeeds");
        assert_eq!(store.get("user_7").await, Some(b"seven".to_vec()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.get("user_7").await, None);
    }

    #[tokio::test]
    async fn test_remote_hit_repopulates_local() {
        let (local, remote, store) = two_local_tiers();
        remote
            .set("team_3", b"shared", Duration::from_secs(60))
            .await
            .expect("seed remote");

        assert_eq!(store.get("team_3").await, Some(b"shared".to_vec()));
        assert_eq!(
            local.get("team_3").await.expect("local get"),
            Some(b"shared".to_vec())
        );
    }

    #[tokio::test]
    async fn test_delete_twice_is_not_an_error() {
        let (local, remote, store) = two_local_tiers();
        store.set("k", b"v", Duration::from_secs(60)).await.expect("set");

        store.delete("k").await.expect("first delete");
        store.delete("k").await.expect("second delete");

        assert!(local.get("k").await.expect("local").is_none());
        assert!(remote.get("k").await.expect("remote").is_none());
    }

    #[tokio::test]
    async fn test_typed_reads_are_independent_values() {
        let (_, _, store) = two_local_tiers();
        let original = Payload {
            name: "core".to_string(),
            tags: vec!["a".to_string()],
        };
        store
            .set_json("team_1", &original, Duration::from_secs(60))
            .await
            .expect("set");

        let mut first: Payload = store.get_json("team_1").await.expect("hit");
        first.tags.push("mutated".to_string());

        let second: Payload = store.get_json("team_1").await.expect("hit");
        assert_eq!(second, original);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_evicted() {
        let (local, _, store) = two_local_tiers();
        store.set("user_1", b"not json", Duration::from_secs(60)).await.expect("set");

        let value: Option<Payload> = store.get_json("user_1").await;
        assert!(value.is_none());
        assert!(local.get("user_1").await.expect("local").is_none());
    }

    #[tokio::test]
    async fn test_remote_set_fault_fails_and_evicts_local() {
        let local = Arc::new(LocalCache::new(Duration::from_secs(300)));
        let remote = Arc::new(FlakyBackend::new());
        let store = CacheStore::new(local.clone(), remote.clone(), Duration::from_secs(300));

        store.set("k", b"old", Duration::from_secs(60)).await.expect("healthy set");
        remote.fail_writes(true);

        assert!(store.set("k", b"new", Duration::from_secs(60)).await.is_err());
        assert!(local.get("k").await.expect("local").is_none());
    }

    #[tokio::test]
    async fn test_remote_delete_fault_is_surfaced_after_local_eviction() {
        let local = Arc::new(LocalCache::new(Duration::from_secs(300)));
        let remote = Arc::new(FlakyBackend::new());
        let store = CacheStore::new(local.clone(), remote.clone(), Duration::from_secs(300));

        store.set("k", b"v", Duration::from_secs(60)).await.expect("set");
        remote.fail_writes(true);

        assert!(store.delete("k").await.is_err());
        assert!(local.get("k").await.expect("local").is_none());
    }

    #[tokio::test]
    async fn test_population_after_concurrent_delete_is_dropped() {
        let (local, remote, store) = two_local_tiers();
        let seen = store.generation("team_9");

        store.delete("team_9").await.expect("writer invalidates");

        let stored = store
            .set_json_if_current("team_9", &"stale", Duration::from_secs(60), seen)
            .await
            .expect("populate");
        assert!(!stored);
        assert!(local.get("team_9").await.expect("local").is_none());
        assert!(remote.get("team_9").await.expect("remote").is_none());

        let seen = store.generation("team_9");
        let stored = store
            .set_json_if_current("team_9", &"fresh", Duration::from_secs(60), seen)
            .await
            .expect("populate");
        assert!(stored);
        assert_eq!(store.get_json::<String>("team_9").await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_remote_read_fault_is_a_miss() {
        let local = Arc::new(LocalCache::new(Duration::from_secs(300)));
        let remote = Arc::new(FlakyBackend::new());
        let store = CacheStore::new(local, remote.clone(), Duration::from_secs(300));

        remote.fail_reads(true);
        assert_eq!(store.get("anything").await, None);
    }
}
