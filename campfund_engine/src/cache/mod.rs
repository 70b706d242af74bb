//! [`Cache`](crate::traits::Cache) backends.
//!
//! [`MemoryCache`] keeps entries in the process and is the default. It is only correct when a single server instance
//! receives webhooks. Deployments running several instances should enable the `redis` feature and use
//! `RedisCache`, so that all instances share one fingerprint store.
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryCache;

#[cfg(feature = "redis")]
pub use self::redis::RedisCache;
