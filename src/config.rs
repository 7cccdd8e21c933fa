//! Process configuration.
//!
//! Everything environment-derived is read once at startup into [`AppConfig`]
//! and handed to component constructors. Nothing below this module touches
//! the process environment.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default lifetime of a local cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default interval between background sweeps of the local cache.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of entity and list entries written by the repositories.
pub const DEFAULT_ENTITY_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must not be empty")]
    Empty { key: &'static str },
    #[error("{key} must be a positive number of seconds, got '{value}'")]
    InvalidSeconds { key: &'static str, value: String },
}

/// Cache tier settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Connection string for the shared remote tier.
    pub redis_url: String,
    /// Lifetime used when the local tier is repopulated from the remote tier.
    pub default_ttl: Duration,
    /// How often the local tier drops expired entries.
    pub sweep_interval: Duration,
    /// Lifetime of entries written by the read path of the repositories.
    pub entity_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            entity_ttl: DEFAULT_ENTITY_TTL,
        }
    }
}

/// Top-level configuration built once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub cache: CacheConfig,
}

impl AppConfig {
    /// Load configuration from the process environment, seeding it from a
    /// `.env` file when one is present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            log::debug!("no .env file loaded: {}", err);
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = CacheConfig::default();

        let redis_url = match lookup("REDIS_URL") {
            Some(value) if value.trim().is_empty() => {
                return Err(ConfigError::Empty { key: "REDIS_URL" });
            }
            Some(value) => value.trim().to_string(),
            None => defaults.redis_url,
        };

        let cache = CacheConfig {
            redis_url,
            default_ttl: lookup_seconds(&lookup, "CACHE_DEFAULT_TTL_SECS", defaults.default_ttl)?,
            sweep_interval: lookup_seconds(
                &lookup,
                "CACHE_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval,
            )?,
            entity_ttl: lookup_seconds(&lookup, "ENTITY_CACHE_TTL_SECS", defaults.entity_ttl)?,
        };

        Ok(Self { cache })
    }
}

fn lookup_seconds<F>(lookup: &F, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
            _ => Err(ConfigError::InvalidSeconds { key, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = AppConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert_eq!(config.cache.sweep_interval, Duration::from_secs(600));
    }

    #[test]
    fn overrides_are_read() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("REDIS_URL", "redis://cache:6379/2"),
            ("CACHE_DEFAULT_TTL_SECS", "30"),
            ("ENTITY_CACHE_TTL_SECS", "45"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.cache.redis_url, "redis://cache:6379/2");
        assert_eq!(config.cache.default_ttl, Duration::from_secs(30));
        assert_eq!(config.cache.entity_ttl, Duration::from_secs(45));
        assert_eq!(config.cache.sweep_interval, DEFAULT_SWEEP_INTERVAL);
    }

    #[test]
    fn zero_or_garbage_seconds_are_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("CACHE_SWEEP_INTERVAL_SECS", "0")]))
            .expect_err("zero interval is invalid");
        assert!(matches!(err, ConfigError::InvalidSeconds { key: "CACHE_SWEEP_INTERVAL_SECS", .. }));

        let err = AppConfig::from_lookup(lookup_from(&[("CACHE_DEFAULT_TTL_SECS", "soon")]))
            .expect_err("non-numeric ttl is invalid");
        assert!(matches!(err, ConfigError::InvalidSeconds { .. }));
    }

    #[test]
    fn blank_redis_url_is_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("REDIS_URL", "  ")]))
            .expect_err("blank url is invalid");
        assert!(matches!(err, ConfigError::Empty { key: "REDIS_URL" }));
    }
}
