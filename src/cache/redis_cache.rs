//! Shared remote cache tier backed by Redis.

use super::{CacheBackend, CacheError, CacheResult};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Remote tier. Cloning is cheap; every clone multiplexes over the same
/// managed connection, which reconnects on its own after network faults.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    /// Open a managed connection to the Redis instance at `redis_url`.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        log::info!("connected to remote cache at {}", redact_url(redis_url));
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let millis = u64::try_from(ttl.as_millis())
            .map_err(|_| CacheError::SerializeError(format!("ttl {:?} out of range", ttl)))?
            .max(1);
        let mut conn = self.connection.clone();
        conn.pset_ex::<_, _, ()>(key, value, millis).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        // DEL reports how many keys existed; zero is not an error.
        let _removed: u64 = conn.del(key).await?;
        Ok(())
    }
}

/// Strip credentials from a connection string before it reaches the logs.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
