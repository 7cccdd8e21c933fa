//! Two-tier cache-aside store for entity reads.
//!
//! ## Architecture
//!
//! ```text
//! get → local tier (DashMap) → remote tier (Redis) → caller falls back to Postgres
//! ```
//!
//! - The local tier is per-process, expires entries lazily on read and sweeps
//!   them in the background.
//! - The remote tier is shared between processes.
//! - Values are stored as serialized bytes, so every read hands back an owned
//!   copy that callers may mutate freely.
//!
//! The cache is only populated on read misses. Writers never update cached
//! values; they delete the keys that a mutation could have made stale.

mod backend;
pub mod keys;
mod local;
mod redis_cache;
mod store;

pub use backend::{CacheBackend, CacheError, CacheResult};
pub use local::{LocalCache, LocalCacheStats};
pub use redis_cache::RedisCache;
pub use store::CacheStore;
