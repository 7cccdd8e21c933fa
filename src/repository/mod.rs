//! Cache-aside repositories.
//!
//! Reads consult the [`CacheStore`] under the canonical key and fall back to
//! durable storage on a miss, populating the cache on the way out. Writes go
//! to durable storage first and then delete every key that may have gone
//! stale. Cached values are never updated in place.

mod teams;
mod users;

pub use teams::TeamRepository;
pub use users::UserRepository;

use crate::cache::CacheStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

/// Cache-aside read: return the cached value under `key`, or load it and
/// populate the cache. A population fault never fails the read. A load that
/// overlapped an invalidation of `key` is returned but not cached.
async fn read_through<T, F, Fut, E>(
    cache: &CacheStore,
    key: &str,
    ttl: Duration,
    load: F,
) -> Result<Option<T>, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    if let Some(value) = cache.get_json::<T>(key).await {
        log::trace!("cache hit for '{}'", key);
        return Ok(Some(value));
    }

    let seen = cache.generation(key);
    let Some(value) = load().await? else {
        return Ok(None);
    };

    if let Err(err) = cache.set_json_if_current(key, &value, ttl, seen).await {
        log::warn!("failed to populate cache for '{}': {}", key, err);
    }

    Ok(Some(value))
}

/// Delete every key in `keys`. Faults are logged; the durable write that
/// preceded the invalidation has already committed.
async fn invalidate(cache: &CacheStore, keys: &[String]) {
    for key in keys {
        if let Err(err) = cache.delete(key).await {
            log::warn!("failed to invalidate cache key '{}': {}", key, err);
        }
    }
}
