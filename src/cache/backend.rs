//! The contract shared by every cache tier.

use async_trait::async_trait;
use std::time::Duration;

pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializeError(String),

    #[error("Cache tier unavailable: {0}")]
    Unavailable(String),
}

/// A single key-value cache tier.
///
/// Implementations must treat deleting an absent key as success and must
/// return owned bytes from `get`, never a view into their own storage.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}
