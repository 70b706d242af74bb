use std::time::Duration;

use log::*;

use crate::traits::Cache;

/// Fingerprints outlive any gateway's redelivery window.
pub const DEFAULT_FINGERPRINT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// De-duplicates webhook deliveries before they reach the reconciliation engine.
///
/// The guard is an optimisation, not the line of defence: the ledger's single-writer latch and unique external
/// references make reconciliation idempotent on their own. That is why a cache outage makes the guard fail open.
#[derive(Clone)]
pub struct IdempotencyGuard<C> {
    cache: C,
    ttl: Duration,
}

impl<C> IdempotencyGuard<C>
where C: Cache
{
    pub fn new(cache: C) -> Self {
        Self { cache, ttl: DEFAULT_FINGERPRINT_TTL }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn fingerprint_key(event_id: &str, reference_code: &str) -> String {
        format!("idempotency:{event_id}:{reference_code}")
    }

    /// Returns `true` if this delivery has been seen before, and `false` if it is new (in which case it is now
    /// claimed). Check and claim are a single atomic cache operation.
    pub async fn claim(&self, event_id: &str, reference_code: &str) -> bool {
        let key = Self::fingerprint_key(event_id, reference_code);
        match self.cache.claim_if_absent(&key, self.ttl).await {
            Ok(true) => {
                trace!("🔏️ Claimed fingerprint {key}");
                false
            },
            Ok(false) => {
                debug!("🔏️ Fingerprint {key} already exists. This is a redelivery");
                true
            },
            Err(e) => {
                warn!("🔏️ Could not check fingerprint {key}. Treating the delivery as new. {e}");
                false
            },
        }
    }

    /// Forgets a fingerprint, so that a delivery whose processing failed is accepted again when the gateway retries.
    pub async fn release(&self, event_id: &str, reference_code: &str) {
        let key = Self::fingerprint_key(event_id, reference_code);
        if let Err(e) = self.cache.delete(&key).await {
            warn!("🔏️ Could not release fingerprint {key}. The gateway's retry will be treated as a duplicate. {e}");
        }
    }
}
