//! In-process cache tier.
//!
//! ## Design
//!
//! - Uses DashMap for thread-safe concurrent access from request and import tasks
//! - Every entry carries its own deadline; expired entries are never returned
//! - A background sweep drops expired entries that nobody reads again
//! - Values are raw bytes and are cloned on the way out

use super::{CacheBackend, CacheResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    /// `None` when the deadline overflowed `Instant`, i.e. effectively never.
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// Statistics about cache contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalCacheStats {
    /// Entries currently held, including expired ones not yet swept
    pub entries: usize,
}

/// Per-process cache tier with lazy expiry and a periodic sweep.
pub struct LocalCache {
    entries: Arc<DashMap<String, LocalEntry>>,
    default_ttl: Duration,
    shutdown: CancellationToken,
}

impl LocalCache {
    /// Create a cache without a background sweep. Expired entries are still
    /// hidden from readers and dropped when they are read.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a cache and spawn its sweep task on the current Tokio runtime.
    ///
    /// The sweep stops when the cache is dropped.
    pub fn with_sweeper(default_ttl: Duration, sweep_interval: Duration) -> Self {
        let cache = Self::new(default_ttl);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let entries = Arc::downgrade(&cache.entries);
                let shutdown = cache.shutdown.child_token();
                handle.spawn(sweep_loop(entries, sweep_interval, shutdown));
                log::debug!(
                    "local cache sweeper started (interval {:?}, default ttl {:?})",
                    sweep_interval,
                    default_ttl
                );
            }
            Err(_) => {
                log::warn!("no Tokio runtime available; local cache sweeper not started");
            }
        }

        cache
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            entries: self.entries.len(),
        }
    }

    fn read(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    fn write(&self, key: &str, value: &[u8], ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value: value.to_vec(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
    }
}

impl Drop for LocalCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.read(key))
    }

    /// A zero `ttl` means "use the default lifetime".
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.write(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

fn purge(entries: &DashMap<String, LocalEntry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(entries.len())
}

async fn sweep_loop(
    entries: Weak<DashMap<String, LocalEntry>>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; nothing can have expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(map) = entries.upgrade() else { break };
                let removed = purge(&map);
                if removed > 0 {
                    log::debug!("local cache sweep removed {} expired entries", removed);
                }
            }
        }
    }

    log::debug!("local cache sweeper stopped");
}
