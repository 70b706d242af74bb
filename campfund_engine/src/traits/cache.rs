use std::time::Duration;

use thiserror::Error;

/// A shared key-value cache with per-entry expiry.
///
/// The reconciliation engine uses it for webhook fingerprints and the outbox relay for invalidating cached campaign
/// views. Neither treats it as a source of truth, so every caller must tolerate the cache being unavailable.
#[allow(async_fn_in_trait)]
pub trait Cache: Clone {
    /// Atomically stores `key` if, and only if, it is absent. Returns `true` if this call stored the key, and `false`
    /// if the key was already present.
    async fn claim_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("The cache backend is unavailable. {0}")]
    Unavailable(String),
    #[error("The cache backend returned an unexpected response. {0}")]
    UnexpectedResponse(String),
}
