use std::time::Duration;

#[cfg(feature = "redis")]
use campfund_engine::RedisCache;
use campfund_engine::{Cache, CacheError, MemoryCache};
use log::*;

use crate::config::ServerConfig;

/// The cache backend chosen at startup.
#[derive(Clone)]
pub enum ServerCache {
    Memory(MemoryCache),
    #[cfg(feature = "redis")]
    Redis(RedisCache),
}

impl ServerCache {
    /// Connects to Redis if a URL is configured and the `redis` feature is enabled. Otherwise, and if Redis is
    /// unreachable, falls back to an in-process cache.
    pub async fn from_config(config: &ServerConfig) -> Self {
        match &config.redis_url {
            #[cfg(feature = "redis")]
            Some(url) => match RedisCache::connect(url).await {
                Ok(cache) => Self::Redis(cache),
                Err(e) => {
                    error!("🧠️ Could not connect to Redis. Falling back to an in-memory cache. {e}");
                    Self::Memory(MemoryCache::new())
                },
            },
            #[cfg(not(feature = "redis"))]
            Some(_) => {
                warn!("🧠️ CFS_REDIS_URL is set, but this server was built without the redis feature. Ignoring it.");
                Self::Memory(MemoryCache::new())
            },
            None => {
                info!("🧠️ Using an in-memory cache. Run a single instance only, or configure CFS_REDIS_URL.");
                Self::Memory(MemoryCache::new())
            },
        }
    }
}

impl Cache for ServerCache {
    async fn claim_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        match self {
            Self::Memory(c) => c.claim_if_absent(key, ttl).await,
            #[cfg(feature = "redis")]
            Self::Redis(c) => c.claim_if_absent(key, ttl).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match self {
            Self::Memory(c) => c.get(key).await,
            #[cfg(feature = "redis")]
            Self::Redis(c) => c.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        match self {
            Self::Memory(c) => c.set(key, value, ttl).await,
            #[cfg(feature = "redis")]
            Self::Redis(c) => c.set(key, value, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        match self {
            Self::Memory(c) => c.delete(key).await,
            #[cfg(feature = "redis")]
            Self::Redis(c) => c.delete(key).await,
        }
    }
}
